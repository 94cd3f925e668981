//! envelope follower with independent attack and release time constants
use num::{Float, FromPrimitive, Zero};
use std::fmt::{self, Display};

use crate::utils::get_coef;

pub struct PeakDetector<T> {
    attack_coef: T,
    release_coef: T,
    peak: T,
    last_output: T,
}

impl<T: Float + FromPrimitive> PeakDetector<T> {
    pub fn build(attack: T, release: T, sample_rate: T) -> PeakDetector<T> {
        PeakDetector {
            attack_coef: get_coef(attack, sample_rate),
            release_coef: get_coef(release, sample_rate),
            peak: Zero::zero(),
            last_output: Zero::zero(),
        }
    }

    pub fn get(&mut self, input: T) -> T {
        let one = T::from_f64(1.0).unwrap();
        // rising edges track with the attack coefficient, falling with release
        if self.peak < input {
            self.peak = input * self.attack_coef + (one - self.attack_coef) * self.last_output;
        } else {
            self.peak = input * self.release_coef + (one - self.release_coef) * self.last_output;
        }
        self.last_output = self.peak;
        self.peak
    }
}

impl<T: Float + FromPrimitive + Display> Display for PeakDetector<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ attack: {}, release: {}, peak: {} }}",
            self.attack_coef, self.release_coef, self.peak
        )
    }
}

#[cfg(test)]
mod test_peak_detector {
    use super::*;

    #[test]
    fn tracks_a_step() {
        let mut detector: PeakDetector<f64> = PeakDetector::build(0.01, 0.5, 2666.6);
        let mut value = 0.0;
        for _ in 0..200 {
            value = detector.get(1.0);
        }
        // should have charged most of the way up
        assert!(value > 0.9);
        for _ in 0..20 {
            value = detector.get(0.0);
        }
        // release is slow, should still be holding some level
        assert!(value > 0.5);
    }
}
