use std::time::Duration;

use super::{Publisher, SensorProtocol};
use crate::scheduler::{Step, Transaction};
use crate::status::HwStatus;

const REQUEST: [u8; 3] = [0xAA, 0x00, 0x00];
const BUSY: u8 = 0x20;
const INTEGRITY: u8 = 0x04;
const MATH_SATURATION: u8 = 0x01;

const OUTPUT_MIN: i32 = 0x0019_999A;
const OUTPUT_MAX: i32 = 0x00E6_6666;
const PSI_MAX: f32 = 25.0;

/// Digital gauge pressure sensor at 0x18.
#[derive(Debug, Clone, Copy)]
pub struct Pressure;

impl SensorProtocol for Pressure {
    const NAME: &'static str = "pressure";
    const ADDRESS: u16 = 0x18;
    const TRUNCATE_SHIFT: u32 = 12;

    fn measurement(sink: Publisher) -> Transaction {
        Transaction::new(Self::ADDRESS)
            .step(|bus| match bus.write(&REQUEST) {
                Ok(n) if n == REQUEST.len() => Step::next_after(Duration::from_millis(3)),
                Ok(n) => {
                    tracing::warn!(written = n, "pressure request short write");
                    Step::fail(HwStatus::CommFailure)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "pressure request failed");
                    Step::fail(HwStatus::CommFailure)
                }
            })
            .step(|bus| match bus.smbus_receive_byte() {
                Ok(status) if status & BUSY == 0 || status == 0xFF => Step::next(),
                Ok(_) => Step::repeat_after(Duration::from_millis(1)),
                Err(e) => {
                    tracing::warn!(error = %e, "pressure status poll failed");
                    Step::fail(HwStatus::CommFailure)
                }
            })
            .step(move |bus| {
                let mut frame = [0u8; 4];
                match bus.read(&mut frame) {
                    Ok(4) => {}
                    Ok(n) => {
                        tracing::warn!(read = n, "pressure frame short read");
                        return Step::fail(HwStatus::CommFailure);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "pressure frame read failed");
                        return Step::fail(HwStatus::CommFailure);
                    }
                }
                match decode_frame(frame) {
                    Some(raw) => {
                        sink.publish(raw);
                        Step::completed()
                    }
                    None => {
                        tracing::warn!(status = format_args!("0x{:02x}", frame[0]), "pressure frame rejected");
                        Step::fail(HwStatus::CommFailure)
                    }
                }
            })
    }
}

/// Raw reading from a status + 24-bit big-endian frame, zero offset removed.
/// `None` when the status byte flags a bad conversion.
pub fn decode_frame(frame: [u8; 4]) -> Option<i32> {
    if frame[0] & (INTEGRITY | MATH_SATURATION) != 0 {
        return None;
    }
    let raw = i32::from_be_bytes([0, frame[1], frame[2], frame[3]]);
    Some(raw - OUTPUT_MIN)
}

/// Truncated pressure value to psi.
pub fn psi_from_value(value: i32) -> f32 {
    let raw = i64::from(value) << Pressure::TRUNCATE_SHIFT;
    raw as f32 * PSI_MAX / (OUTPUT_MAX - OUTPUT_MIN) as f32
}

/// Inverse of [`psi_from_value`], truncated like a sensor reading.
pub fn value_from_psi(psi: f32) -> i32 {
    let raw = f64::from(psi) * f64::from(OUTPUT_MAX - OUTPUT_MIN) / f64::from(PSI_MAX);
    ((raw.round() as i64) >> Pressure::TRUNCATE_SHIFT) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorCfg;
    use crate::mocks::ScriptedBus;
    use crate::scheduler::BusScheduler;
    use crate::sensor::PressureSensor;
    use rstest::rstest;
    use sprinkler_traits::MonotonicClock;
    use std::sync::Arc;

    fn sensor(bus: ScriptedBus) -> PressureSensor {
        let sched = Arc::new(BusScheduler::spawn(bus).unwrap());
        PressureSensor::new(sched, Arc::new(MonotonicClock), &SensorCfg::default())
    }

    #[rstest]
    #[case([0x40, 0x19, 0x99, 0x9A], Some(0))]
    #[case([0x40, 0xE6, 0x66, 0x66], Some(OUTPUT_MAX - OUTPUT_MIN))]
    #[case([0x44, 0x80, 0x00, 0x00], None)]
    #[case([0x41, 0x80, 0x00, 0x00], None)]
    fn frames(#[case] frame: [u8; 4], #[case] expected: Option<i32>) {
        assert_eq!(decode_frame(frame), expected);
    }

    #[test]
    fn full_scale_is_25_psi() {
        let value = (OUTPUT_MAX - OUTPUT_MIN) >> Pressure::TRUNCATE_SHIFT;
        assert!((psi_from_value(value) - 25.0).abs() < 0.01);
        assert!(psi_from_value(0).abs() < f32::EPSILON);
        assert_eq!(value_from_psi(25.0), value);
        assert_eq!(value_from_psi(0.0), 0);
    }

    #[test]
    fn polls_busy_status_then_reads() {
        let bus = ScriptedBus::new()
            .status_bytes([0x60, 0x60, 0x40])
            .frame([0x40, 0x1A, 0x99, 0x9A]);
        let s = sensor(bus.clone());
        assert_eq!(s.read_async().wait(), HwStatus::Success);
        assert_eq!(s.last_value(), 0x10_0000 >> 12);
        assert_eq!(bus.writes(), vec![(0x18, REQUEST.to_vec())]);
    }

    #[test]
    fn all_ones_status_counts_as_ready() {
        let bus = ScriptedBus::new()
            .status_bytes([0xFF])
            .frame([0x40, 0x19, 0x99, 0x9A]);
        assert_eq!(sensor(bus).read_async().wait(), HwStatus::Success);
    }

    #[test]
    fn integrity_fault_fails_without_update() {
        let bus = ScriptedBus::new().frame([0x44, 0x80, 0x00, 0x00]);
        let s = sensor(bus);
        assert_eq!(s.read_async().wait(), HwStatus::CommFailure);
        assert_eq!(s.last_value(), 0);
        assert_eq!(s.reader().last_measurement_ms(), None);
        assert!(s.is_stale());
    }
}
