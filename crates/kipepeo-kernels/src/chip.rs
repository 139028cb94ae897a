//! Chip identification for the kernel dispatch layer.
//!
//! Detection runs once; the result is cached for the process lifetime. On
//! Linux-like hosts we match vendor part numbers from `/proc/cpuinfo` and, on
//! Android, board identifiers from system properties. On Apple platforms the
//! identity falls back to build-time targets. Detection never fails: an
//! unmatched host reports `Unknown` and dispatch falls through to the generic
//! NEON kernels.

use once_cell::sync::Lazy;

/// The closed set of micro-architectures the kernel library is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipKind {
    MediatekHelioG85,
    MediatekHelioG99,
    MediatekHelioG100,
    SnapdragonSevenSGen2,
    UnisocT606,
    AppleA13,
    AppleA14,
    AppleA15,
    AppleA16,
    AppleA17,
    AppleA18,
    AppleM1,
    AppleM2,
    AppleM3,
    AppleM4,
    Unknown,
}

impl ChipKind {
    /// Human-readable chip name.
    pub fn name(self) -> &'static str {
        match self {
            ChipKind::MediatekHelioG85 => "MediaTek Helio G85",
            ChipKind::MediatekHelioG99 => "MediaTek Helio G99",
            ChipKind::MediatekHelioG100 => "MediaTek Helio G100",
            ChipKind::SnapdragonSevenSGen2 => "Qualcomm Snapdragon 7s Gen 2",
            ChipKind::UnisocT606 => "Unisoc T606",
            ChipKind::AppleA13 => "Apple A13",
            ChipKind::AppleA14 => "Apple A14",
            ChipKind::AppleA15 => "Apple A15",
            ChipKind::AppleA16 => "Apple A16",
            ChipKind::AppleA17 => "Apple A17",
            ChipKind::AppleA18 => "Apple A18",
            ChipKind::AppleM1 => "Apple M1",
            ChipKind::AppleM2 => "Apple M2",
            ChipKind::AppleM3 => "Apple M3",
            ChipKind::AppleM4 => "Apple M4",
            ChipKind::Unknown => "Unknown",
        }
    }

    /// True when this chip family is Apple Silicon.
    pub fn is_apple(self) -> bool {
        matches!(
            self,
            ChipKind::AppleA13
                | ChipKind::AppleA14
                | ChipKind::AppleA15
                | ChipKind::AppleA16
                | ChipKind::AppleA17
                | ChipKind::AppleA18
                | ChipKind::AppleM1
                | ChipKind::AppleM2
                | ChipKind::AppleM3
                | ChipKind::AppleM4
        )
    }

    /// Native FP16 arithmetic support (ARMv8.2 FP16 extension or Apple).
    ///
    /// Cortex-A75-class parts (Helio G85, Unisoc T606) do not advertise it.
    pub fn supports_fp16(self) -> bool {
        match self {
            ChipKind::MediatekHelioG99
            | ChipKind::MediatekHelioG100
            | ChipKind::SnapdragonSevenSGen2 => true,
            c if c.is_apple() => true,
            _ => false,
        }
    }

    /// Suggested FP32 micro-panel (MR, NR) per core class.
    pub fn micro_panel(self, is_big_core: bool) -> (usize, usize) {
        match self {
            // Cortex-A75/A55 class: small caches, stay at 4x4.
            ChipKind::MediatekHelioG85 | ChipKind::UnisocT606 => (4, 4),
            // Cortex-A76/A55: 64KB L1, 256KB L2.
            ChipKind::MediatekHelioG99 | ChipKind::MediatekHelioG100 => {
                if is_big_core {
                    (6, 6)
                } else {
                    (4, 4)
                }
            }
            // Cortex-A78/A55: 512KB L2.
            ChipKind::SnapdragonSevenSGen2 => {
                if is_big_core {
                    (8, 8)
                } else {
                    (4, 4)
                }
            }
            // Apple firestorm/icestorm: large unified caches.
            c if c.is_apple() => {
                if is_big_core {
                    (16, 16)
                } else {
                    (8, 8)
                }
            }
            _ => (4, 4),
        }
    }

    /// Suggested FP16 micro-panel, or None when the FP16 entry should widen
    /// to the FP32 path.
    pub fn fp16_panel(self) -> Option<(usize, usize)> {
        match self {
            ChipKind::MediatekHelioG99 | ChipKind::MediatekHelioG100 => Some((8, 8)),
            ChipKind::SnapdragonSevenSGen2 => Some((12, 12)),
            c if c.is_apple() => Some((16, 16)),
            _ => None,
        }
    }

    /// Whether software prefetch hints pay off on this family (A78 class up).
    pub fn wants_prefetch(self) -> bool {
        matches!(self, ChipKind::SnapdragonSevenSGen2) || self.is_apple()
    }
}

static DETECTED: Lazy<ChipKind> = Lazy::new(|| {
    let chip = detect_uncached();
    log::info!("chip detection: {}", chip.name());
    chip
});

/// Detect the chip once and cache it for the process lifetime.
pub fn detect() -> ChipKind {
    *DETECTED
}

fn detect_uncached() -> ChipKind {
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    return detect_apple();

    #[cfg(target_os = "android")]
    {
        let chip = detect_from_android_props();
        if chip != ChipKind::Unknown {
            return chip;
        }
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        if let Ok(cpuinfo) = std::fs::read_to_string("/proc/cpuinfo") {
            return detect_from_cpuinfo(&cpuinfo);
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    ChipKind::Unknown
}

/// Substring matching against the processor description.
///
/// Board part numbers are checked before Cortex-core-pair inference so that a
/// vendor string wins over a generic core listing.
pub fn detect_from_cpuinfo(cpuinfo: &str) -> ChipKind {
    if cpuinfo.is_empty() {
        return ChipKind::Unknown;
    }

    let has = |needle: &str| cpuinfo.contains(needle);

    // MediaTek part numbers and marketing names.
    if has("MT6769") || has("Helio G85") || has("helio g85") {
        return ChipKind::MediatekHelioG85;
    }
    if has("MT6789") || has("Helio G99") || has("helio g99") {
        return ChipKind::MediatekHelioG99;
    }
    if has("MT6791") || has("Helio G100") || has("helio g100") {
        return ChipKind::MediatekHelioG100;
    }

    // Qualcomm.
    if has("SM7435") || has("Snapdragon 7s Gen 2") || has("snapdragon 7s gen 2") {
        return ChipKind::SnapdragonSevenSGen2;
    }

    // Unisoc.
    if has("T606") || has("unisoc t606") || has("UNISOC T606") {
        return ChipKind::UnisocT606;
    }

    // Core-pair inference when no part number matched.
    if has("Cortex-A76") && has("Cortex-A55") {
        return ChipKind::MediatekHelioG99;
    }
    if has("Cortex-A78") && has("Cortex-A55") {
        return ChipKind::SnapdragonSevenSGen2;
    }
    if has("Cortex-A75") && has("Cortex-A55") {
        return ChipKind::UnisocT606;
    }

    ChipKind::Unknown
}

/// Map an Android board identifier (`ro.board.platform`, `ro.hardware`,
/// `ro.chipname`) to a chip.
pub fn detect_from_board_id(board: &str) -> ChipKind {
    if board.contains("mt6769") {
        return ChipKind::MediatekHelioG85;
    }
    if board.contains("mt6789") {
        return ChipKind::MediatekHelioG99;
    }
    if board.contains("mt6791") {
        return ChipKind::MediatekHelioG100;
    }
    if board.contains("lahaina") || board.contains("taro") {
        return ChipKind::SnapdragonSevenSGen2;
    }
    if board.contains("T606") || board.contains("ums9230") {
        return ChipKind::UnisocT606;
    }
    ChipKind::Unknown
}

#[cfg(target_os = "android")]
fn detect_from_android_props() -> ChipKind {
    for prop in ["ro.board.platform", "ro.hardware", "ro.chipname"] {
        if let Some(value) = android_system_property(prop) {
            let chip = detect_from_board_id(&value);
            if chip != ChipKind::Unknown {
                return chip;
            }
        }
    }
    ChipKind::Unknown
}

#[cfg(target_os = "android")]
fn android_system_property(name: &str) -> Option<String> {
    use std::ffi::CString;

    const PROP_VALUE_MAX: usize = 92;

    extern "C" {
        fn __system_property_get(
            name: *const libc::c_char,
            value: *mut libc::c_char,
        ) -> libc::c_int;
    }

    let c_name = CString::new(name).ok()?;
    let mut buf = [0u8; PROP_VALUE_MAX];
    // SAFETY: buf is PROP_VALUE_MAX bytes, the documented upper bound for
    // property values including the NUL terminator.
    let len = unsafe { __system_property_get(c_name.as_ptr(), buf.as_mut_ptr() as *mut _) };
    if len <= 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Some(String::from_utf8_lossy(&buf[..end]).into_owned())
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn detect_apple() -> ChipKind {
    // No sysctl probing; the build target is enough to pick a blocking class
    // since all Apple Silicon shares the 16x16/8x8 panels.
    if cfg!(target_os = "ios") {
        ChipKind::AppleA15
    } else {
        ChipKind::AppleM1
    }
}
