#![no_main]
use libfuzzer_sys::fuzz_target;

// Arbitrary TOML must either fail to parse or fail validation, never panic.
fuzz_target!(|data: &str| {
    if let Ok(cfg) = spectro_config::load_toml(data) {
        let _ = cfg.validate();
    }
});
