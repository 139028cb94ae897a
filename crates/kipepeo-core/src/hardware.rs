//! Hardware probe: memory info, CPU description, and derived quantization
//! recommendations.
//!
//! The probe runs once at startup and again only on explicit request. On
//! Linux-like hosts it reads `/proc/meminfo` and `/proc/cpuinfo`; elsewhere it
//! falls back to conservative development defaults.

use serde::{Deserialize, Serialize};

/// One mebibyte, for tier arithmetic.
const MIB: u64 = 1024 * 1024;

/// Hardware capabilities detected at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareCapabilities {
    pub has_neon: bool,
    pub has_fp16: bool,
    /// L1 data cache size in bytes.
    pub l1_cache_size: usize,
    /// L2 cache size in bytes.
    pub l2_cache_size: usize,
    /// L3 cache size in bytes (0 if not present).
    pub l3_cache_size: usize,
    /// Total memory in bytes.
    pub total_memory: u64,
    /// Available memory in bytes.
    pub available_memory: u64,
    /// Number of online CPU cores.
    pub cpu_cores: u32,
    /// Human-readable CPU model string.
    pub cpu_model: String,

    // Derived recommendations.
    /// Recommended quantization block size (64, 128, or 256).
    pub optimal_block_size: u32,
    /// Recommended ternary threshold (0.25-0.40).
    pub optimal_ternary_threshold: f32,
    /// Whether temporary buffers should come from a pool.
    pub use_memory_pool: bool,
    /// Maximum concurrent quantization operations.
    pub max_concurrent_ops: u32,
}

impl Default for HardwareCapabilities {
    fn default() -> Self {
        detect()
    }
}

/// Snapshot of system memory, in MB, as read from `/proc/meminfo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMemoryInfo {
    pub total_ram_mb: u64,
    pub available_ram_mb: u64,
    pub free_ram_mb: u64,
    pub usage_percent: f32,
}

/// Probe hardware capabilities and derive recommended settings.
///
/// Never fails: missing OS sources degrade to conservative defaults.
pub fn detect() -> HardwareCapabilities {
    let mem = memory_info();
    let total_memory = mem.total_ram_mb * MIB;
    let available_memory = mem.available_ram_mb * MIB;

    // Typical values for Cortex-A55/A7x class parts; no L3 on low-end SoCs.
    let l1_cache_size = 32 * 1024;
    let l2_cache_size = 256 * 1024;
    let l3_cache_size = 0;

    let cpu_cores = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(4);

    let (optimal_block_size, use_memory_pool, max_concurrent_ops) =
        recommend_for_available(available_memory);

    let caps = HardwareCapabilities {
        has_neon: cfg!(target_arch = "aarch64"),
        has_fp16: false, // chip detection refines this; conservative here
        l1_cache_size,
        l2_cache_size,
        l3_cache_size,
        total_memory,
        available_memory,
        cpu_cores,
        cpu_model: cpu_model(),
        optimal_block_size,
        optimal_ternary_threshold: 0.33,
        use_memory_pool,
        max_concurrent_ops,
    };

    log::debug!(
        "hardware probe: {} cores, {} MB available, block={} pool={} ops={}",
        caps.cpu_cores,
        mem.available_ram_mb,
        caps.optimal_block_size,
        caps.use_memory_pool,
        caps.max_concurrent_ops
    );

    caps
}

/// Memory tiers: <1 GiB available is very low, <2 GiB is low.
fn recommend_for_available(available: u64) -> (u32, bool, u32) {
    if available < 1024 * MIB {
        (64, true, 1)
    } else if available < 2048 * MIB {
        (128, true, 2)
    } else {
        (256, false, 4)
    }
}

/// Read `/proc/meminfo` on Linux-like hosts; sensible defaults elsewhere.
pub fn memory_info() -> SystemMemoryInfo {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        if let Ok(content) = std::fs::read_to_string("/proc/meminfo") {
            return parse_meminfo(&content);
        }
    }

    // Desktop/development fallback: 8 GB total, 4 GB available.
    SystemMemoryInfo {
        total_ram_mb: 8192,
        available_ram_mb: 4096,
        free_ram_mb: 3072,
        usage_percent: 50.0,
    }
}

/// Parse the key/value lines of a `/proc/meminfo`-style source (values in kB).
fn parse_meminfo(content: &str) -> SystemMemoryInfo {
    let mut total_kb = 0u64;
    let mut free_kb = 0u64;
    let mut available_kb = 0u64;
    let mut buffers_kb = 0u64;
    let mut cached_kb = 0u64;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let key = parts.next().unwrap_or("");
        let value: u64 = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
        match key {
            "MemTotal:" => total_kb = value,
            "MemFree:" => free_kb = value,
            "MemAvailable:" => available_kb = value,
            "Buffers:" => buffers_kb = value,
            "Cached:" => cached_kb = value,
            _ => {}
        }
    }

    // MemAvailable is the best indicator when the kernel reports it.
    let available_kb = if available_kb > 0 {
        available_kb
    } else {
        free_kb + buffers_kb + cached_kb
    };

    let usage_percent = if total_kb > 0 {
        100.0 * (1.0 - available_kb as f32 / total_kb as f32)
    } else {
        0.0
    };

    SystemMemoryInfo {
        total_ram_mb: total_kb / 1024,
        available_ram_mb: available_kb / 1024,
        free_ram_mb: free_kb / 1024,
        usage_percent,
    }
}

/// CPU model string from `/proc/cpuinfo` ("Hardware" or "model name" lines).
pub fn cpu_model() -> String {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        if let Ok(content) = std::fs::read_to_string("/proc/cpuinfo") {
            for line in content.lines() {
                if line.starts_with("Hardware") || line.starts_with("model name") {
                    if let Some(value) = line.split(':').nth(1) {
                        return value.trim().to_string();
                    }
                }
            }
        }
    }
    "Unknown".to_string()
}

/// Recommended block size for a given weight count and available memory.
pub fn optimal_block_size(weight_count: usize, available_memory: u64) -> u32 {
    // Very large models (>10B weights): larger blocks when memory allows.
    if weight_count > 10_000_000_000 {
        if available_memory > 4096 * MIB {
            return 256;
        }
        return 128;
    }
    // Medium models (1B-10B).
    if weight_count > 1_000_000_000 {
        if available_memory > 2048 * MIB {
            return 256;
        }
        return 128;
    }
    // Small models: smaller blocks reduce scale overhead on tight devices.
    if available_memory < 1024 * MIB {
        64
    } else {
        128
    }
}

/// 16-byte alignment check for NEON-accelerated loads.
#[inline]
pub fn is_neon_aligned<T>(ptr: *const T) -> bool {
    (ptr as usize).is_multiple_of(16)
}
