#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Config TOML and calibration CSV must reject malformed input without panicking.
    if let Ok(cfg) = toml::from_str::<sprinkler_config::Config>(data) {
        let _ = cfg.validate();
    }
    let _ = sprinkler_config::read_calibration_csv(data.as_bytes());
});
