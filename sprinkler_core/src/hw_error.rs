//! Maps `Box<dyn Error>` from trait boundaries to typed `SprinklerError`.
//!
//! The traits in `sprinkler_traits` use `Box<dyn Error + Send + Sync>` so any
//! backend can plug in; this module converts those to our typed error enum,
//! with an optional feature-gated path for `sprinkler_hardware::HwError`.

use crate::error::SprinklerError;

/// Map a trait-boundary error to a typed `SprinklerError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to the error's message.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> SprinklerError {
    #[cfg(feature = "hardware-errors")]
    {
        use sprinkler_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Io(io) => SprinklerError::Io(io.to_string()),
                other => SprinklerError::HardwareFault(other.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        return SprinklerError::Io(io.to_string());
    }
    SprinklerError::Hardware(e.to_string())
}
