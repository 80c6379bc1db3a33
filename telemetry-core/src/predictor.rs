// Per-field exponential smoothing and transmit decisions.
// Invariants: decisions are computed against the previous prediction before
// the smoothing update runs; state is never reset by link transitions, so the
// server-side mirror stays in sync across outages.

use std::time::{Duration, Instant};

use crate::model::{Decisions, Sample};

#[derive(Clone, Copy, Debug)]
pub struct PredictorConfig {
    pub alpha: f32,
    pub speed_tolerance: f32,
    pub power_tolerance: f32,
    pub battery_tolerance: f32,
    pub heading_tolerance: f32,
    pub resync_interval: Duration,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            speed_tolerance: 2.0,
            power_tolerance: 5.0,
            battery_tolerance: 0.5,
            heading_tolerance: 5.0,
            resync_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct FieldEstimate {
    predicted: f32,
    initialised: bool,
}

impl FieldEstimate {
    fn should_transmit(&self, actual: f32, tolerance: f32) -> bool {
        if !self.initialised {
            return true;
        }
        (actual - self.predicted).abs() > tolerance
    }

    fn update(&mut self, actual: f32, alpha: f32) {
        // Seeding with the actual keeps a single smoothing path; the first
        // result equals the first observation exactly.
        let last = if self.initialised { self.predicted } else { actual };
        self.predicted = alpha * actual + (1.0 - alpha) * last;
        self.initialised = true;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompressionStats {
    pub total: u64,
    pub transmitted: u64,
    pub skipped: u64,
}

impl CompressionStats {
    pub fn compression_ratio(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.skipped as f32 / self.total as f32 * 100.0
    }
}

#[derive(Clone, Debug)]
pub struct Predictor {
    config: PredictorConfig,
    speed: FieldEstimate,
    power: FieldEstimate,
    battery: FieldEstimate,
    heading: FieldEstimate,
    last_resync_at: Instant,
    stats: CompressionStats,
}

impl Predictor {
    pub fn new(config: PredictorConfig, now: Instant) -> Self {
        Self {
            config,
            speed: FieldEstimate::default(),
            power: FieldEstimate::default(),
            battery: FieldEstimate::default(),
            heading: FieldEstimate::default(),
            last_resync_at: now,
            stats: CompressionStats::default(),
        }
    }

    /// Per-sample transmit decision. The caller supplies the monotonic clock,
    /// the same way session state takes `now_ms` from its driver.
    pub fn decide(&mut self, sample: &Sample, now: Instant) -> Decisions {
        self.stats.total += 1;

        let decisions = if now.duration_since(self.last_resync_at) >= self.config.resync_interval {
            self.last_resync_at = now;
            Decisions::resync()
        } else {
            Decisions {
                speed: self
                    .speed
                    .should_transmit(sample.speed, self.config.speed_tolerance),
                power: self
                    .power
                    .should_transmit(sample.power, self.config.power_tolerance),
                battery: self
                    .battery
                    .should_transmit(sample.battery as f32, self.config.battery_tolerance),
                heading: self
                    .heading
                    .should_transmit(sample.heading as f32, self.config.heading_tolerance),
                is_resync: false,
            }
        };

        // One decision per sample, not per field.
        if decisions.any() {
            self.stats.transmitted += 1;
        } else {
            self.stats.skipped += 1;
        }

        self.speed.update(sample.speed, self.config.alpha);
        self.power.update(sample.power, self.config.alpha);
        self.battery.update(sample.battery as f32, self.config.alpha);
        self.heading.update(sample.heading as f32, self.config.alpha);

        decisions
    }

    pub fn stats(&self) -> CompressionStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady_sample() -> Sample {
        Sample {
            timestamp: 0,
            speed: 65.0,
            power: 10.0,
            battery: 80,
            heading: 90,
            odometer: 0.0,
        }
    }

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn first_sample_transmits_every_field() {
        let base = Instant::now();
        let mut predictor = Predictor::new(PredictorConfig::default(), base);
        let decisions = predictor.decide(&steady_sample(), base);
        assert!(decisions.speed && decisions.power && decisions.battery && decisions.heading);
        assert!(!decisions.is_resync);
    }

    #[test]
    fn steady_values_are_skipped_after_first_sample() {
        let base = Instant::now();
        let mut predictor = Predictor::new(PredictorConfig::default(), base);
        predictor.decide(&steady_sample(), base);
        for i in 1..10u64 {
            let decisions = predictor.decide(&steady_sample(), at(base, i * 100));
            assert!(!decisions.any(), "sample {i} should be fully predicted");
        }
        let stats = predictor.stats();
        assert_eq!(stats.total, 10);
        assert_eq!(stats.transmitted, 1);
        assert_eq!(stats.skipped, 9);
    }

    #[test]
    fn deviation_at_tolerance_is_not_transmitted() {
        let base = Instant::now();
        let mut predictor = Predictor::new(PredictorConfig::default(), base);
        predictor.decide(&steady_sample(), base);
        // Prediction settled at 65.0; |67.0 - 65.0| == tolerance, not above it.
        let mut sample = steady_sample();
        sample.speed = 67.0;
        let decisions = predictor.decide(&sample, at(base, 100));
        assert!(!decisions.speed);
    }

    #[test]
    fn threshold_crossing_transmits_and_smooths() {
        let base = Instant::now();
        let mut predictor = Predictor::new(PredictorConfig::default(), base);
        predictor.decide(&steady_sample(), base);

        let mut sample = steady_sample();
        sample.speed = 68.1;
        let decisions = predictor.decide(&sample, at(base, 100));
        assert!(decisions.speed, "|68.1 - 65| = 3.1 > 2.0");
        let expected = 0.3 * 68.1 + 0.7 * 65.0;
        assert!((predictor.speed.predicted - expected).abs() < 1e-4);

        sample.speed = 68.5;
        let decisions = predictor.decide(&sample, at(base, 200));
        assert!(decisions.speed, "|68.5 - 65.93| = 2.57 > 2.0");
    }

    #[test]
    fn resync_fires_after_interval_and_rearms() {
        let base = Instant::now();
        let mut predictor = Predictor::new(PredictorConfig::default(), base);
        for i in 0..300u64 {
            let decisions = predictor.decide(&steady_sample(), at(base, i * 100));
            assert!(!decisions.is_resync, "sample {i} is inside the window");
        }
        let decisions = predictor.decide(&steady_sample(), at(base, 30_000));
        assert!(decisions.is_resync);
        assert!(decisions.speed && decisions.power && decisions.battery && decisions.heading);

        // The clock re-anchored; the next window starts at 30 s.
        let decisions = predictor.decide(&steady_sample(), at(base, 40_000));
        assert!(!decisions.is_resync);
        let decisions = predictor.decide(&steady_sample(), at(base, 60_000));
        assert!(decisions.is_resync);
    }

    #[test]
    fn battery_uses_half_percent_tolerance() {
        let base = Instant::now();
        let mut predictor = Predictor::new(PredictorConfig::default(), base);
        predictor.decide(&steady_sample(), base);
        let mut sample = steady_sample();
        sample.battery = 79;
        let decisions = predictor.decide(&sample, at(base, 100));
        assert!(decisions.battery, "|79 - 80| = 1.0 > 0.5");
    }

    #[test]
    fn identical_inputs_produce_identical_state() {
        let base = Instant::now();
        let mut left = Predictor::new(PredictorConfig::default(), base);
        let mut right = Predictor::new(PredictorConfig::default(), base);
        let inputs = [
            (65.0f32, 10.0f32, 80, 90),
            (68.1, 12.0, 80, 95),
            (68.5, 12.5, 79, 95),
            (0.0, -20.0, 79, 180),
            (30.0, 5.0, 78, 270),
        ];
        for (i, (speed, power, battery, heading)) in inputs.into_iter().enumerate() {
            let sample = Sample {
                timestamp: i as i64,
                speed,
                power,
                battery,
                heading,
                odometer: i as f32,
            };
            let now = at(base, i as u64 * 100);
            assert_eq!(left.decide(&sample, now), right.decide(&sample, now));
            assert!((left.speed.predicted - right.speed.predicted).abs() < f32::EPSILON);
            assert!((left.power.predicted - right.power.predicted).abs() < f32::EPSILON);
        }
        assert_eq!(left.stats(), right.stats());
    }

    #[test]
    fn smoothed_state_survives_gaps_in_transmission() {
        // A value that matches the retained estimate after a long quiet
        // stretch must not be flagged again.
        let base = Instant::now();
        let mut predictor = Predictor::new(PredictorConfig::default(), base);
        for i in 0..20u64 {
            predictor.decide(&steady_sample(), at(base, i * 100));
        }
        let decisions = predictor.decide(&steady_sample(), at(base, 25_000));
        assert!(!decisions.any());
    }

    #[test]
    fn compression_ratio_counts_whole_samples() {
        let mut stats = CompressionStats::default();
        assert_eq!(stats.compression_ratio(), 0.0);
        stats.total = 4;
        stats.transmitted = 1;
        stats.skipped = 3;
        assert!((stats.compression_ratio() - 75.0).abs() < f32::EPSILON);
    }
}
