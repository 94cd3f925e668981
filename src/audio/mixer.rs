//!
//! master stage of the graph: applies master gain and keeps the output meters
//!
//! Solo and mute policy lives here too so the graph has one place that
//! answers "does this track reach the output right now".
use crate::utils::clip_float;

use super::power_meter::{MeterMode, PowerMeter};
use super::samples_buffer::SamplesBuffer;
use std::fmt;

pub struct Mixer {
    master_gain: f32,
    master_level: PowerMeter,
}

impl Mixer {
    pub fn new(meter_mode: MeterMode) -> Mixer {
        Mixer {
            master_gain: 1.0,
            master_level: PowerMeter::new(meter_mode),
        }
    }
    pub fn get_master(&self) -> f32 {
        self.master_gain
    }
    pub fn set_master(&mut self, v: f32) -> () {
        // fader range is -1..1, gain range is 0..2
        self.master_gain = clip_float(v - 1.0) + 1.0;
    }
    pub fn get_master_level_avg(&self) -> f64 {
        self.master_level.get_avg()
    }
    pub fn get_master_level_peak(&self) -> f64 {
        self.master_level.get_peak()
    }
    /// whether a track with these flags contributes to the mix
    pub fn track_is_active(muted: bool, soloed: bool, any_solo: bool) -> bool {
        !muted && (!any_solo || soloed)
    }
    /// final pass over the summed output: master gain then metering
    pub fn finish(&mut self, output: &mut SamplesBuffer) -> () {
        output.apply_gain(self.master_gain);
        self.master_level.add_frame(output.channel(0), 1.0);
    }
}

impl fmt::Display for Mixer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ master: {}, level: {:.1}, peak: {:.1} }}",
            self.master_gain,
            self.get_master_level_avg(),
            self.get_master_level_peak()
        )
    }
}

#[cfg(test)]
mod test_mixer {
    use super::*;

    #[test]
    fn build_mixer() {
        let mut mixer = Mixer::new(MeterMode::Decibel);
        assert_eq!(mixer.get_master(), 1.0);
        mixer.set_master(0.5);
        assert_eq!(mixer.get_master(), 0.5);
        // out of range values clamp instead of blowing the output
        mixer.set_master(11.0);
        assert_eq!(mixer.get_master(), 2.0);
    }
    #[test]
    fn active_policy() {
        // nothing soloed: only mute matters
        assert!(Mixer::track_is_active(false, false, false));
        assert!(!Mixer::track_is_active(true, false, false));
        // something soloed: only soloed tracks play
        assert!(!Mixer::track_is_active(false, false, true));
        assert!(Mixer::track_is_active(false, true, true));
        // mute still wins over solo
        assert!(!Mixer::track_is_active(true, true, true));
    }
    #[test]
    fn master_gain_applied() {
        let mut mixer = Mixer::new(MeterMode::Decibel);
        mixer.set_master(0.5);
        let mut out = SamplesBuffer::with_frames(2, 4);
        out.set(0, 0, 1.0);
        mixer.finish(&mut out);
        assert_eq!(out.get(0, 0), 0.5);
    }
}
