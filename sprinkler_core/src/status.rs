//! Outcome of a bus transaction or a controller operation.

use std::fmt;

use crate::error::SprinklerError;

/// Status values produced by transaction steps and delivered by completions.
///
/// `Next`, `Repeat` and `Completed` steer the scheduler between steps; every
/// other value terminates a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwStatus {
    Success,
    Failure,
    /// Pipeline finished early; maps to `Success` when the transaction ends.
    Completed,
    /// Advance to the next step.
    Next,
    /// Run the same step again after its delay.
    Repeat,
    CommFailure,
    Abort,
    UnexpectedValue,
    MaxValueReached,
    Timeout,
    /// Valve closed without water pressure; position restored by dead reckoning.
    NoWaterPressure,
}

impl HwStatus {
    /// Strict success.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::Completed)
    }

    /// Success, or an outcome that leaves the head in a good state.
    pub fn is_ok(self) -> bool {
        self.is_success() || self == Self::NoWaterPressure
    }

    pub fn into_result(self) -> Result<(), SprinklerError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(SprinklerError::Status(self))
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Completed => "completed",
            Self::Next => "next",
            Self::Repeat => "repeat",
            Self::CommFailure => "comm-failure",
            Self::Abort => "abort",
            Self::UnexpectedValue => "unexpected-value",
            Self::MaxValueReached => "max-value-reached",
            Self::Timeout => "timeout",
            Self::NoWaterPressure => "no-water-pressure",
        }
    }
}

impl fmt::Display for HwStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(HwStatus::Success, true, true)]
    #[case(HwStatus::Completed, true, true)]
    #[case(HwStatus::NoWaterPressure, false, true)]
    #[case(HwStatus::Timeout, false, false)]
    #[case(HwStatus::Abort, false, false)]
    fn success_and_ok(#[case] s: HwStatus, #[case] success: bool, #[case] ok: bool) {
        assert_eq!(s.is_success(), success);
        assert_eq!(s.is_ok(), ok);
        assert_eq!(s.into_result().is_ok(), ok);
    }

    #[test]
    fn failure_status_round_trips_through_error() {
        let err = HwStatus::MaxValueReached.into_result().unwrap_err();
        assert_eq!(err.status(), Some(HwStatus::MaxValueReached));
        assert_eq!(err.to_string(), "operation finished with max-value-reached");
    }
}
