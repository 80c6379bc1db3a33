// Core data models for samples, transmit decisions, and wire records.
// Invariants: odometer is always carried; a resync record carries every optional field.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub speed: f32,
    pub power: f32,
    pub battery: i32,
    pub heading: i32,
    pub odometer: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Decisions {
    pub speed: bool,
    pub power: bool,
    pub battery: bool,
    pub heading: bool,
    pub is_resync: bool,
}

impl Decisions {
    pub fn resync() -> Self {
        Self {
            speed: true,
            power: true,
            battery: true,
            heading: true,
            is_resync: true,
        }
    }

    pub fn any(&self) -> bool {
        self.speed || self.power || self.battery || self.heading
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransmissionRecord {
    pub timestamp: i64,
    pub odometer: f32,
    pub is_resync: bool,
    pub speed: Option<f32>,
    pub power: Option<f32>,
    pub battery: Option<i32>,
    pub heading: Option<i32>,
}

impl TransmissionRecord {
    /// Ground-truth record carrying every field; re-anchors the server predictor.
    pub fn full(sample: &Sample) -> Self {
        Self {
            timestamp: sample.timestamp,
            odometer: sample.odometer,
            is_resync: true,
            speed: Some(sample.speed),
            power: Some(sample.power),
            battery: Some(sample.battery),
            heading: Some(sample.heading),
        }
    }

    /// Record carrying only the fields the predictor flagged for transmission.
    pub fn compressed(sample: &Sample, decisions: &Decisions) -> Self {
        if decisions.is_resync {
            return Self::full(sample);
        }
        Self {
            timestamp: sample.timestamp,
            odometer: sample.odometer,
            is_resync: false,
            speed: decisions.speed.then_some(sample.speed),
            power: decisions.power.then_some(sample.power),
            battery: decisions.battery.then_some(sample.battery),
            heading: decisions.heading.then_some(sample.heading),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Sample {
        Sample {
            timestamp: 1_700_000_000_000,
            speed: 65.0,
            power: 10.0,
            battery: 80,
            heading: 90,
            odometer: 12_345.6,
        }
    }

    #[test]
    fn full_record_carries_every_field() {
        let record = TransmissionRecord::full(&sample());
        assert!(record.is_resync);
        assert_eq!(record.speed, Some(65.0));
        assert_eq!(record.power, Some(10.0));
        assert_eq!(record.battery, Some(80));
        assert_eq!(record.heading, Some(90));
    }

    #[test]
    fn compressed_record_drops_unflagged_fields() {
        let decisions = Decisions {
            speed: true,
            ..Decisions::default()
        };
        let record = TransmissionRecord::compressed(&sample(), &decisions);
        assert!(!record.is_resync);
        assert_eq!(record.speed, Some(65.0));
        assert_eq!(record.power, None);
        assert_eq!(record.battery, None);
        assert_eq!(record.heading, None);
        assert_eq!(record.odometer, 12_345.6);
    }

    #[test]
    fn resync_decision_forces_full_record() {
        let record = TransmissionRecord::compressed(&sample(), &Decisions::resync());
        assert_eq!(record, TransmissionRecord::full(&sample()));
    }
}
