#![no_main]
use fpa_core::Variant;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validate must never panic; neither may resolving a config
    // that passed validation.
    let Ok(cfg) = fpa_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        for variant in [Variant::MassLossRate, Variant::NetHeatFlux] {
            let r = fpa_core::resolve(&cfg, variant);
            assert!(r.bounds.is_valid());
            assert!(r.timing.period_ms >= 1);
        }
    }
});
