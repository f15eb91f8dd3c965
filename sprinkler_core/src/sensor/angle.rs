use super::{Publisher, SensorProtocol};
use crate::motor::MotorDirection;
use crate::scheduler::{Step, Transaction};
use crate::status::HwStatus;

/// Counts per full nozzle turn.
pub const ANGLE_RANGE: i32 = 4096;

const ANGLE_REGISTER: u8 = 0x0C;

/// 12-bit magnetic rotary position sensor at 0x36.
#[derive(Debug, Clone, Copy)]
pub struct Angle;

impl SensorProtocol for Angle {
    const NAME: &'static str = "angle";
    const ADDRESS: u16 = 0x36;
    const TRUNCATE_SHIFT: u32 = 0;

    fn measurement(sink: Publisher) -> Transaction {
        Transaction::new(Self::ADDRESS).step(move |bus| match bus.smbus_read_word(ANGLE_REGISTER) {
            Ok(word) => {
                // SMBus words arrive little-endian; the sensor sends MSB first.
                let angle = i32::from(word.swap_bytes()) % ANGLE_RANGE;
                sink.publish(angle);
                Step::completed()
            }
            Err(e) => {
                tracing::warn!(error = %e, "angle read failed");
                Step::fail(HwStatus::CommFailure)
            }
        })
    }
}

/// Distance travelled from `from` to `to` when turning in `direction`,
/// in `[0, ANGLE_RANGE)`.
pub fn forward_distance(from: i32, to: i32, direction: MotorDirection) -> i32 {
    let d = if direction == MotorDirection::RIGHT {
        to - from
    } else {
        from - to
    };
    d.rem_euclid(ANGLE_RANGE)
}

/// Signed shortest rotation from `from` to `to`, in `(-R/2, R/2]`.
pub fn shortest_diff(from: i32, to: i32) -> i32 {
    let d = (to - from).rem_euclid(ANGLE_RANGE);
    if d > ANGLE_RANGE / 2 { d - ANGLE_RANGE } else { d }
}
