//! End-to-end switcher scenario and the hysteresis property.

use kipepeo_core::hardware::SystemMemoryInfo;
use kipepeo_llm::{ModelSize, ModelSwitcher, StaticMemorySource};

fn mem(total_mb: u64, available_mb: u64, free_mb: u64) -> SystemMemoryInfo {
    SystemMemoryInfo {
        total_ram_mb: total_mb,
        available_ram_mb: available_mb,
        free_ram_mb: free_mb,
        usage_percent: 100.0 * (1.0 - available_mb as f32 / total_mb as f32),
    }
}

fn registered(memory: SystemMemoryInfo) -> ModelSwitcher {
    let mut s = ModelSwitcher::with_memory_source(Box::new(StaticMemorySource(memory)));
    s.register_model(ModelSize::B7, "/models/7b.bin", 6144, 8192);
    s.register_model(ModelSize::B13, "/models/13b.bin", 9216, 12288);
    s.register_model(ModelSize::B34, "/models/34b.bin", 14336, 20480);
    s.register_model(ModelSize::B70, "/models/70b.bin", 20480, 32768);
    s
}

/// 10 GiB available with a 1 GiB floor selects 13B; when available (and with
/// it free RAM) collapses to 7 GiB the switcher calls for a downgrade and
/// refuses the 7B -> 13B upgrade.
#[test]
fn scenario_select_then_degrade() {
    let s = registered(mem(16384, 10240, 10240));
    assert_eq!(s.select_best_model(1024), Some(ModelSize::B13));

    // Pressure: available at 7 GiB, free squeezed below the 1 GiB floor.
    let s = registered(mem(16384, 7168, 512));
    assert!(s.should_downgrade(ModelSize::B13, 1024));
    assert!(!s.can_upgrade(ModelSize::B7, 1024));
}

/// Hysteresis: a downgrade signal never coexists with an upgrade opportunity
/// in the same memory state. Swept over free values well below available,
/// the normal Linux shape where MemAvailable counts reclaimable cache that
/// MemFree does not.
#[test]
fn property_downgrade_excludes_upgrade() {
    let totals = [4096u64, 8192, 16384, 32768];
    let avail_fractions = [2u64, 5, 8, 20, 50, 61, 95, 100];
    let free_fractions = [0u64, 1, 10, 50, 100];
    let sizes = [ModelSize::B7, ModelSize::B13, ModelSize::B34, ModelSize::B70];

    for &total in &totals {
        for &avail_pct in &avail_fractions {
            let available = total * avail_pct / 100;
            for &free_pct in &free_fractions {
                let free = available * free_pct / 100;
                let s = registered(mem(total, available, free));
                for &current in &sizes {
                    if s.should_downgrade(current, 1024) {
                        assert!(
                            !s.can_upgrade(current, 1024),
                            "state total={} available={} free={} current={:?}",
                            total,
                            available,
                            free,
                            current
                        );
                    }
                }
            }
        }
    }

    // The pathological case spelled out: next tier fits available RAM with
    // room to spare while free pages sit below the floor.
    let s = registered(mem(32768, 20000, 500));
    assert!(s.should_downgrade(ModelSize::B7, 1024));
    assert!(!s.can_upgrade(ModelSize::B7, 1024));
}
