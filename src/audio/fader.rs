//! Constant power stereo pan applied per frame by the track nodes

use std::fmt;

use crate::utils::clip_float;

pub struct Fader {
    left: f32,
    right: f32,
    val: f32,
}

impl Fader {
    pub fn new() -> Fader {
        let mut f = Fader {
            left: 1.0,
            right: 1.0,
            val: 0.0,
        };
        f.set(0.0);
        f
    }
    /// call this with a value from -1.0 (hard pan left) to +1.0 (hard pan right)
    /// 0.0 means pan center.
    pub fn set(&mut self, v: f32) -> () {
        self.val = clip_float(v);
        self.left = f32::sqrt(1.0 - self.val);
        self.right = f32::sqrt(1.0 + self.val);
    }

    pub fn get(&self) -> f32 {
        self.val
    }

    /// pan one frame, constant power across the sweep
    pub fn apply(&self, left_in: f32, right_in: f32) -> (f32, f32) {
        (left_in * self.left, right_in * self.right)
    }
}

impl fmt::Display for Fader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[ left: {}, right: {} ]", self.left, self.right)
    }
}

#[cfg(test)]
mod test_fader {
    use super::*;

    #[test]
    fn build_and_use() {
        let mut fader = Fader::new();
        assert_eq!(fader.apply(1.0, 1.0), (1.0, 1.0));
        // Hard pan left
        fader.set(-1.0);
        assert_eq!(fader.apply(1.0, 1.0), (f32::sqrt(2.0), 0.0));
        fader.set(1.0);
        assert_eq!(fader.apply(1.0, 1.0), (0.0, f32::sqrt(2.0)));
    }
    #[test]
    fn clips_input() {
        let mut fader = Fader::new();
        fader.set(5.0);
        assert_eq!(fader.get(), 1.0);
    }
    #[test]
    fn center_holds_power() {
        let mut fader = Fader::new();
        fader.set(0.0);
        let (l, r) = fader.apply(0.5, 0.5);
        // both sides at unity through the center
        assert!((l - 0.5).abs() < 1e-6);
        assert!((r - 0.5).abs() < 1e-6);
    }
}
