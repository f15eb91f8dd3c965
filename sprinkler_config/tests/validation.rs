use rstest::rstest;
use sprinkler_config::load_toml;

const PINS: &str = r#"
[pins]
nozzle_pwm_channel = 0
nozzle_dir = 17
valve_pwm_channel = 1
valve_dir = 6
"#;

fn with_pins(extra: &str) -> String {
    format!("{PINS}\n{extra}")
}

#[test]
fn minimal_config_uses_defaults() {
    let cfg = load_toml(PINS).expect("parse TOML");
    cfg.validate().expect("defaults are valid");
    assert_eq!(cfg.bus.i2c_bus, 1);
    assert_eq!(cfg.rotation.epsilon, 3);
    assert_eq!(cfg.rotation.inertia_full_duty, 30);
    assert_eq!(cfg.pressure.epsilon, 10);
    assert_eq!(cfg.pressure.inertia, 50);
    assert_eq!(cfg.pressure.trend_window, 16);
    assert_eq!(cfg.valve.open_timeout_ms, 3000);
    assert_eq!(cfg.valve.close_tight_ms, 200);
    assert!(cfg.valve.close_on_exit);
    assert_eq!(cfg.sensors.stale_ms, 50);
    assert_eq!(cfg.sensors.notify_interval_ms, 2);
    assert_eq!(cfg.overshoot.buckets, 20);
    assert_eq!(cfg.overshoot.max_rate, 1000);
    assert_eq!(cfg.hold.tolerance, 20);
    assert_eq!(cfg.hold.min_samples, 3);
    assert_eq!(cfg.calibration.settle_ms, 300);
    assert!((cfg.pins.pwm_frequency_hz - 10_000.0).abs() < f64::EPSILON);
}

#[test]
fn pins_section_is_required() {
    assert!(load_toml("[bus]\ni2c_bus = 1\n").is_err());
}

#[rstest]
#[case("[rotation]\nepsilon = 0\n", "rotation.epsilon must be >= 1")]
#[case("[rotation]\ndefault_duty = 101\n", "rotation.default_duty")]
#[case("[pressure]\nepsilon = 0\n", "pressure.epsilon must be > 0")]
#[case("[pressure]\ntrend_window = 1\n", "pressure.trend_window must be >= 2")]
#[case("[valve]\nopen_timeout_ms = 0\n", "valve.open_timeout_ms must be >= 1")]
#[case("[sensors]\nstale_ms = 0\n", "sensors.stale_ms must be >= 1")]
#[case("[overshoot]\nmax_rate = 0\n", "overshoot.max_rate must be > 0")]
#[case("[overshoot]\nbuckets = 0\n", "overshoot.buckets must be >= 1")]
#[case("[hold]\ntolerance = -1\n", "hold.tolerance must be >= 0")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation")]
fn rejects_invalid_values(#[case] extra: &str, #[case] needle: &str) {
    let cfg = load_toml(&with_pins(extra)).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(format!("{err}").contains(needle), "got: {err}");
}

#[test]
fn rejects_shared_pwm_channel() {
    let toml = r#"
[pins]
nozzle_pwm_channel = 1
nozzle_dir = 17
valve_pwm_channel = 1
valve_dir = 6
"#;
    let err = load_toml(toml).unwrap().validate().unwrap_err();
    assert!(format!("{err}").contains("must differ"));
}

#[test]
fn unknown_section_values_are_type_checked() {
    let err = load_toml(&with_pins("[valve]\nclose_on_exit = \"yes\"\n")).unwrap_err();
    assert!(err.to_string().contains("close_on_exit"));
}
