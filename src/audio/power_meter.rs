//! calculates peak and average power of data frames
//!
//! used by the track nodes and the mixer for metering.  Readings are lossy on
//! purpose: every frame overwrites the last, so a skipped update just means a
//! slightly stale meter, never a stalled callback.
use crate::dsp::{peak_detector::PeakDetector, smoothing_filter::SmoothingFilter};
use crate::utils::{get_frame_power_in_db, to_lin};

/// how the meter reports: raw linear gain or decibels
#[derive(Clone, Copy, PartialEq)]
pub enum MeterMode {
    Linear,
    Decibel,
}

pub struct PowerMeter {
    peak: PeakDetector<f64>,
    avg: SmoothingFilter<f64>,
    mode: MeterMode,
    last_peak: f64,
    last_avg: f64,
}

impl PowerMeter {
    pub fn new(mode: MeterMode) -> PowerMeter {
        PowerMeter {
            peak: PeakDetector::build(0.01, 0.1, 2666.6),
            avg: SmoothingFilter::build(0.01, 2666.6),
            mode,
            last_peak: -60.0,
            last_avg: -60.0,
        }
    }
    pub fn get_peak(&self) -> f64 {
        self.convert(self.last_peak)
    }
    pub fn get_avg(&self) -> f64 {
        self.convert(self.last_avg)
    }
    pub fn add_frame(&mut self, data: &[f32], gain: f64) -> () {
        let p = get_frame_power_in_db(data, gain);
        self.last_peak = self.peak.get(p);
        self.last_avg = self.avg.get(p);
    }
    fn convert(&self, db_val: f64) -> f64 {
        match self.mode {
            MeterMode::Decibel => f64::max(db_val.round(), -60.0),
            MeterMode::Linear => to_lin(db_val as f32) as f64,
        }
    }
}

#[cfg(test)]
mod test_power_meter {
    use super::*;

    #[test]
    fn starts_at_floor() {
        let meter = PowerMeter::new(MeterMode::Decibel);
        assert_eq!(meter.get_avg(), -60.0);
        assert_eq!(meter.get_peak(), -60.0);
    }
    #[test]
    fn last_frame_wins() {
        let mut meter = PowerMeter::new(MeterMode::Decibel);
        let loud = vec![0.9; 128];
        for _ in 0..500 {
            meter.add_frame(&loud, 1.0);
        }
        let after_loud = meter.get_avg();
        assert!(after_loud > -10.0);
        let quiet = vec![0.0; 128];
        for _ in 0..5000 {
            meter.add_frame(&quiet, 1.0);
        }
        assert!(meter.get_avg() < after_loud);
    }
}
