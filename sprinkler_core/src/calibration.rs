//! Open-loop duration tables produced by the calibration sweeps.

use crate::interpolator::Interpolator;
use crate::motor::MotorDirection;

/// Lookup tables for duration-based moves.
///
/// Nozzle tables map angular distance (counts) to run time in µs, one per
/// direction. The valve table maps pressure to cumulative opening time in ms
/// measured from the closed position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalibrationTables {
    pub nozzle_right: Interpolator,
    pub nozzle_left: Interpolator,
    pub valve: Interpolator,
}

impl CalibrationTables {
    pub fn nozzle(&self, direction: MotorDirection) -> &Interpolator {
        if direction == MotorDirection::RIGHT {
            &self.nozzle_right
        } else {
            &self.nozzle_left
        }
    }

    pub fn nozzle_mut(&mut self, direction: MotorDirection) -> &mut Interpolator {
        if direction == MotorDirection::RIGHT {
            &mut self.nozzle_right
        } else {
            &mut self.nozzle_left
        }
    }

    pub fn is_nozzle_calibrated(&self) -> bool {
        !self.nozzle_right.is_empty() && !self.nozzle_left.is_empty()
    }

    pub fn is_valve_calibrated(&self) -> bool {
        !self.valve.is_empty()
    }
}
