//! Model size switching driven by device RAM.
//!
//! The switcher keeps a registry of size classes and answers three questions
//! with deterministic rules: which model fits right now, when to give up a
//! size (downgrade), and when the next size up becomes safe (upgrade). The
//! up/down pair is hysteretic: downgrade triggers on free-RAM pressure while
//! upgrade requires the larger model to actually fit in usable RAM, so the
//! switcher does not oscillate at a tier boundary.

use std::collections::BTreeMap;

use thiserror::Error;

use kipepeo_core::hardware::{self, SystemMemoryInfo};

/// Registered model size classes, smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelSize {
    B7,
    B13,
    B34,
    B70,
}

impl ModelSize {
    /// Size-class label as used in the registry file.
    pub fn label(self) -> &'static str {
        match self {
            ModelSize::B7 => "7B",
            ModelSize::B13 => "13B",
            ModelSize::B34 => "34B",
            ModelSize::B70 => "70B",
        }
    }

    /// Parse a registry label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "7B" => Some(ModelSize::B7),
            "13B" => Some(ModelSize::B13),
            "34B" => Some(ModelSize::B34),
            "70B" => Some(ModelSize::B70),
            _ => None,
        }
    }

    /// The next size up; 70B is terminal.
    pub fn next_up(self) -> Option<Self> {
        match self {
            ModelSize::B7 => Some(ModelSize::B13),
            ModelSize::B13 => Some(ModelSize::B34),
            ModelSize::B34 => Some(ModelSize::B70),
            ModelSize::B70 => None,
        }
    }
}

/// Registry entry for one model size.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub size: ModelSize,
    pub path: String,
    pub required_ram_mb: u64,
    pub optimal_ram_mb: u64,
    pub is_loaded: bool,
}

/// Errors from switcher operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwitchError {
    /// The requested size class was never registered.
    #[error("model size {} not registered", .0.label())]
    NotRegistered(ModelSize),

    /// A registry entry carried a label outside the known size classes.
    #[error("unknown model size label {0:?}")]
    UnknownLabel(String),
}

/// Source of system memory snapshots, pluggable so the decision rules are
/// testable with fixed values.
pub trait MemorySource {
    fn memory_info(&self) -> SystemMemoryInfo;
}

/// Default source: `/proc/meminfo` through the hardware probe.
#[derive(Debug, Default)]
pub struct ProcMemorySource;

impl MemorySource for ProcMemorySource {
    fn memory_info(&self) -> SystemMemoryInfo {
        hardware::memory_info()
    }
}

/// Fixed memory snapshot, for tests and simulations.
#[derive(Debug, Clone, Copy)]
pub struct StaticMemorySource(pub SystemMemoryInfo);

impl MemorySource for StaticMemorySource {
    fn memory_info(&self) -> SystemMemoryInfo {
        self.0
    }
}

/// The model size switcher.
pub struct ModelSwitcher {
    models: BTreeMap<ModelSize, ModelInfo>,
    auto_switching: bool,
    memory: Box<dyn MemorySource + Send + Sync>,
}

impl Default for ModelSwitcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelSwitcher {
    pub fn new() -> Self {
        Self::with_memory_source(Box::new(ProcMemorySource))
    }

    pub fn with_memory_source(memory: Box<dyn MemorySource + Send + Sync>) -> Self {
        Self {
            models: BTreeMap::new(),
            auto_switching: true,
            memory,
        }
    }

    /// Register (or replace) a model size in the table.
    pub fn register_model(
        &mut self,
        size: ModelSize,
        path: impl Into<String>,
        required_ram_mb: u64,
        optimal_ram_mb: u64,
    ) {
        self.models.insert(
            size,
            ModelInfo {
                size,
                path: path.into(),
                required_ram_mb,
                optimal_ram_mb,
                is_loaded: false,
            },
        );
    }

    /// Register every entry of a runtime model-registry table.
    pub fn register_from_config(
        &mut self,
        entries: &[kipepeo_core::config::ModelRegistryEntry],
    ) -> Result<(), SwitchError> {
        for entry in entries {
            let size = ModelSize::from_label(&entry.size)
                .ok_or_else(|| SwitchError::UnknownLabel(entry.size.clone()))?;
            self.register_model(size, entry.path.clone(), entry.required_ram_mb, entry.optimal_ram_mb);
        }
        Ok(())
    }

    /// Current memory snapshot from the configured source.
    pub fn memory_info(&self) -> SystemMemoryInfo {
        self.memory.memory_info()
    }

    /// Available RAM in GB, for display.
    pub fn available_ram_gb(&self) -> f32 {
        self.memory_info().available_ram_mb as f32 / 1024.0
    }

    /// Largest registered model whose required RAM fits in
    /// available - min_free; the smallest registered model when nothing fits;
    /// None when the registry is empty.
    pub fn select_best_model(&self, min_free_ram_mb: u64) -> Option<ModelSize> {
        let mem = self.memory_info();
        let usable = mem.available_ram_mb.saturating_sub(min_free_ram_mb);

        for info in self.models.values().rev() {
            if info.required_ram_mb <= usable {
                log::debug!(
                    "select_best_model: {} fits ({} MB <= {} MB usable)",
                    info.size.label(),
                    info.required_ram_mb,
                    usable
                );
                return Some(info.size);
            }
        }

        self.models.keys().next().copied()
    }

    /// Whether a memory snapshot is under pressure: free RAM below the floor,
    /// or usage above 90%. On Linux-like hosts `MemAvailable` (reclaimable
    /// cache included) routinely dwarfs `MemFree`, so the free-RAM floor
    /// triggers well before the fit check would.
    fn under_pressure(mem: &SystemMemoryInfo, min_free_ram_mb: u64) -> bool {
        mem.free_ram_mb < min_free_ram_mb || mem.usage_percent > 90.0
    }

    /// True when the current model should be abandoned for a smaller one.
    pub fn should_downgrade(&self, _current: ModelSize, min_free_ram_mb: u64) -> bool {
        if !self.auto_switching {
            return false;
        }
        Self::under_pressure(&self.memory_info(), min_free_ram_mb)
    }

    /// True when the next size up is registered and fits in usable RAM.
    /// 70B is terminal. A snapshot under memory pressure never upgrades,
    /// whatever `MemAvailable` claims: the same state can never signal both
    /// a downgrade and an upgrade.
    pub fn can_upgrade(&self, current: ModelSize, min_free_ram_mb: u64) -> bool {
        if !self.auto_switching {
            return false;
        }
        let Some(next) = current.next_up() else {
            return false;
        };
        let Some(info) = self.models.get(&next) else {
            return false;
        };
        let mem = self.memory_info();
        if Self::under_pressure(&mem, min_free_ram_mb) {
            return false;
        }
        let usable = mem.available_ram_mb.saturating_sub(min_free_ram_mb);
        info.required_ram_mb <= usable
    }

    /// Tiered recommendation from total device RAM, independent of the
    /// registry: >= 16 GiB -> 70B, >= 12 GiB -> 34B, >= 8 GiB -> 13B,
    /// else 7B.
    pub fn recommended_model_for_device(total_ram_mb: u64) -> ModelSize {
        if total_ram_mb >= 16384 {
            ModelSize::B70
        } else if total_ram_mb >= 12288 {
            ModelSize::B34
        } else if total_ram_mb >= 8192 {
            ModelSize::B13
        } else {
            ModelSize::B7
        }
    }

    /// Registry lookup.
    pub fn model_info(&self, size: ModelSize) -> Option<&ModelInfo> {
        self.models.get(&size)
    }

    /// Flip the loaded flag for a registered size.
    pub fn set_loaded(&mut self, size: ModelSize, loaded: bool) -> Result<(), SwitchError> {
        let info = self
            .models
            .get_mut(&size)
            .ok_or(SwitchError::NotRegistered(size))?;
        info.is_loaded = loaded;
        Ok(())
    }

    pub fn set_auto_switching(&mut self, enabled: bool) {
        self.auto_switching = enabled;
    }

    pub fn is_auto_switching(&self) -> bool {
        self.auto_switching
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem(total: u64, available: u64, free: u64) -> SystemMemoryInfo {
        SystemMemoryInfo {
            total_ram_mb: total,
            available_ram_mb: available,
            free_ram_mb: free,
            usage_percent: 100.0 * (1.0 - available as f32 / total as f32),
        }
    }

    fn switcher_with(memory: SystemMemoryInfo) -> ModelSwitcher {
        let mut s = ModelSwitcher::with_memory_source(Box::new(StaticMemorySource(memory)));
        s.register_model(ModelSize::B7, "/models/7b.bin", 6144, 8192);
        s.register_model(ModelSize::B13, "/models/13b.bin", 9216, 12288);
        s.register_model(ModelSize::B34, "/models/34b.bin", 14336, 20480);
        s.register_model(ModelSize::B70, "/models/70b.bin", 20480, 32768);
        s
    }

    #[test]
    fn test_select_best_fits_largest() {
        // 10 GiB available, 1 GiB floor -> 9 GiB usable -> 13B (9216 MB fits).
        let s = switcher_with(mem(16384, 10240, 10240));
        assert_eq!(s.select_best_model(1024), Some(ModelSize::B13));
    }

    #[test]
    fn test_select_best_falls_back_to_smallest() {
        let s = switcher_with(mem(4096, 2048, 2048));
        // Nothing fits in 1 GiB usable; smallest registered wins.
        assert_eq!(s.select_best_model(1024), Some(ModelSize::B7));
    }

    #[test]
    fn test_select_best_empty_registry() {
        let s = ModelSwitcher::with_memory_source(Box::new(StaticMemorySource(mem(
            8192, 4096, 4096,
        ))));
        assert_eq!(s.select_best_model(1024), None);
    }

    #[test]
    fn test_downgrade_on_low_free_ram() {
        let s = switcher_with(mem(16384, 7168, 512));
        assert!(s.should_downgrade(ModelSize::B13, 1024));
    }

    #[test]
    fn test_downgrade_on_memory_pressure() {
        // 95% used but free above the floor.
        let s = switcher_with(mem(16384, 819, 2048));
        assert!(s.should_downgrade(ModelSize::B13, 1024));
    }

    #[test]
    fn test_no_downgrade_when_healthy() {
        let s = switcher_with(mem(16384, 10240, 8192));
        assert!(!s.should_downgrade(ModelSize::B13, 1024));
    }

    #[test]
    fn test_upgrade_requires_fit() {
        let s = switcher_with(mem(32768, 24576, 24576));
        assert!(s.can_upgrade(ModelSize::B34, 1024)); // 70B needs 20 GiB
        let s = switcher_with(mem(16384, 10240, 10240));
        assert!(!s.can_upgrade(ModelSize::B34, 1024));
    }

    #[test]
    fn test_no_upgrade_under_pressure() {
        // MemAvailable far above MemFree, the common Linux shape: plenty of
        // reclaimable cache, almost no free pages. The next tier would fit
        // usable RAM, but the pressured snapshot must refuse the upgrade.
        let s = switcher_with(mem(32768, 20000, 500));
        assert!(s.should_downgrade(ModelSize::B7, 1024));
        assert!(!s.can_upgrade(ModelSize::B7, 1024));
    }

    #[test]
    fn test_70b_is_terminal() {
        let s = switcher_with(mem(65536, 65536, 65536));
        assert!(!s.can_upgrade(ModelSize::B70, 1024));
    }

    #[test]
    fn test_upgrade_requires_registration() {
        let mut s = ModelSwitcher::with_memory_source(Box::new(StaticMemorySource(mem(
            32768, 32768, 32768,
        ))));
        s.register_model(ModelSize::B7, "/models/7b.bin", 6144, 8192);
        // 13B not registered.
        assert!(!s.can_upgrade(ModelSize::B7, 1024));
    }

    #[test]
    fn test_auto_switching_disable_gates_moves() {
        let mut s = switcher_with(mem(16384, 512, 256));
        assert!(s.should_downgrade(ModelSize::B13, 1024));
        s.set_auto_switching(false);
        assert!(!s.should_downgrade(ModelSize::B13, 1024));
        assert!(!s.can_upgrade(ModelSize::B7, 1024));
    }

    #[test]
    fn test_recommended_tiers() {
        assert_eq!(
            ModelSwitcher::recommended_model_for_device(4096),
            ModelSize::B7
        );
        assert_eq!(
            ModelSwitcher::recommended_model_for_device(8192),
            ModelSize::B13
        );
        assert_eq!(
            ModelSwitcher::recommended_model_for_device(12288),
            ModelSize::B34
        );
        assert_eq!(
            ModelSwitcher::recommended_model_for_device(16384),
            ModelSize::B70
        );
    }

    #[test]
    fn test_recommendation_monotonic_at_boundaries() {
        // Non-decreasing across the 8/12/16 GiB tier edges.
        let mut last = ModelSize::B7;
        for mb in [1024u64, 8191, 8192, 12287, 12288, 16383, 16384, 32768] {
            let rec = ModelSwitcher::recommended_model_for_device(mb);
            assert!(rec >= last, "recommendation regressed at {} MB", mb);
            last = rec;
        }
    }

    #[test]
    fn test_set_loaded_unregistered_errors() {
        let mut s = ModelSwitcher::new();
        assert_eq!(
            s.set_loaded(ModelSize::B34, true),
            Err(SwitchError::NotRegistered(ModelSize::B34))
        );
    }

    #[test]
    fn test_register_from_config() {
        use kipepeo_core::config::ModelRegistryEntry;

        let mut s = ModelSwitcher::with_memory_source(Box::new(StaticMemorySource(mem(
            16384, 10240, 10240,
        ))));
        s.register_from_config(&[
            ModelRegistryEntry {
                size: "7B".into(),
                path: "/models/7b.bin".into(),
                required_ram_mb: 6144,
                optimal_ram_mb: 8192,
            },
            ModelRegistryEntry {
                size: "13B".into(),
                path: "/models/13b.bin".into(),
                required_ram_mb: 9216,
                optimal_ram_mb: 12288,
            },
        ])
        .unwrap();
        assert_eq!(s.select_best_model(1024), Some(ModelSize::B13));

        let err = s.register_from_config(&[ModelRegistryEntry {
            size: "3B".into(),
            path: "/models/3b.bin".into(),
            required_ram_mb: 2048,
            optimal_ram_mb: 4096,
        }]);
        assert_eq!(err, Err(SwitchError::UnknownLabel("3B".into())));
    }

    #[test]
    fn test_labels_roundtrip() {
        for size in [ModelSize::B7, ModelSize::B13, ModelSize::B34, ModelSize::B70] {
            assert_eq!(ModelSize::from_label(size.label()), Some(size));
        }
        assert_eq!(ModelSize::from_label("3B"), None);
    }
}
