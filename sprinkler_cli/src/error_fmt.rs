//! Human-readable error descriptions and structured JSON error formatting.

use sprinkler_core::{BuildError, HwStatus, SprinklerError};

/// The operation status carried anywhere in the report chain.
fn status_of(err: &eyre::Report) -> Option<HwStatus> {
    err.downcast_ref::<SprinklerError>()
        .and_then(SprinklerError::status)
}

fn explain_status(status: HwStatus) -> String {
    match status {
        HwStatus::Timeout => "What happened: No water pressure appeared before the valve timed out.\nLikely causes: Supply off, clogged line, or valve.open_timeout_ms too low.\nHow to fix: Check the upstream supply, then raise valve.open_timeout_ms if the valve is just slow.".to_string(),
        HwStatus::CommFailure => "What happened: A sensor did not answer or reported a bad reading.\nLikely causes: Loose I2C wiring, wrong bus number, or a sensor integrity fault.\nHow to fix: Check SDA/SCL and power, verify bus.i2c_bus, then run `sprinkler self-check`.".to_string(),
        HwStatus::MaxValueReached => "What happened: The valve hit its mechanical limit before the target was reached.\nLikely causes: Target above what the supply delivers, or a stuck valve.\nHow to fix: Lower the target or check the supply pressure.".to_string(),
        HwStatus::UnexpectedValue => "What happened: The pressure moved the wrong way or the target is unreachable.\nLikely causes: Target below ambient, or the valve is already at its closed stop.\nHow to fix: Choose a target above the ambient pressure shown by `sprinkler status`.".to_string(),
        HwStatus::Abort => "What happened: The operation was interrupted before it finished.\nLikely causes: Ctrl-C, or a newer request for the same sensor.\nHow to fix: Re-run the command.".to_string(),
        other => format!(
            "What happened: The operation finished with status {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug for more detail."
        ),
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingBus => "What happened: No I2C bus was provided to the sprinkler head.\nLikely causes: The bus failed to open or was not wired into the builder.\nHow to fix: Check bus.i2c_bus and that /dev/i2c-N exists.".to_string(),
            BuildError::MissingNozzleMotor | BuildError::MissingValveMotor => format!(
                "What happened: {be}.\nLikely causes: Motor pins failed to initialize.\nHow to fix: Check the [pins] section and GPIO/PWM permissions."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            BuildError::Spawn(msg) => format!(
                "What happened: The bus worker thread could not start ({msg}).\nLikely causes: Resource limits.\nHow to fix: Check ulimits and retry."
            ),
        };
    }

    if let Some(status) = status_of(err) {
        return explain_status(status);
    }

    if let Some(se) = err.downcast_ref::<SprinklerError>() {
        return match se {
            SprinklerError::HardwareFault(msg) | SprinklerError::Hardware(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: Wiring, power, or missing permissions on GPIO/PWM/I2C.\nHow to fix: Check the [pins] and [bus] sections and device permissions."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug for more detail."
            ),
        };
    }

    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'curve,x,y'.".to_string();
    }

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path.\nHow to fix: Pass --config <FILE>. Original: {msg}"
        );
    }

    if lower.contains("parse config") || lower.contains("invalid configuration") {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nLikely causes: Missing [pins] or out-of-range values.\nHow to fix: Edit the TOML config and try again. Original: {msg}"
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per operation status; other errors return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match status_of(err) {
        Some(HwStatus::Abort) => 3,
        Some(HwStatus::CommFailure) => 4,
        Some(HwStatus::Timeout) => 5,
        Some(HwStatus::MaxValueReached) => 6,
        Some(HwStatus::UnexpectedValue) => 7,
        Some(HwStatus::Failure) => 8,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    let reason = status_of(err).map_or("error", HwStatus::as_str);
    json!({ "reason": reason, "message": humanize(err) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;
    use rstest::rstest;

    fn status_report(s: HwStatus) -> eyre::Report {
        Err::<(), _>(SprinklerError::Status(s))
            .wrap_err("open valve")
            .unwrap_err()
    }

    #[rstest]
    #[case(HwStatus::Abort, 3)]
    #[case(HwStatus::CommFailure, 4)]
    #[case(HwStatus::Timeout, 5)]
    #[case(HwStatus::MaxValueReached, 6)]
    #[case(HwStatus::UnexpectedValue, 7)]
    #[case(HwStatus::Failure, 8)]
    fn exit_codes_follow_status(#[case] s: HwStatus, #[case] code: i32) {
        assert_eq!(exit_code_for_error(&status_report(s)), code);
    }

    #[test]
    fn plain_errors_exit_with_one() {
        assert_eq!(exit_code_for_error(&eyre::eyre!("boom")), 1);
    }

    #[test]
    fn timeout_explains_supply() {
        assert!(humanize(&status_report(HwStatus::Timeout)).contains("supply"));
    }

    #[test]
    fn json_error_has_reason() {
        let v: serde_json::Value =
            serde_json::from_str(&format_error_json(&status_report(HwStatus::Timeout))).unwrap();
        assert_eq!(v["reason"], "timeout");
        assert!(v["message"].as_str().unwrap().contains("What happened"));
    }
}
