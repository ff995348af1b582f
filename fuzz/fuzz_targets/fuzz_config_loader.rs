#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validate may reject, never panic.
    if let Ok(cfg) = shutter_config::load_toml(data) {
        let _ = cfg.validate();
    }
});
