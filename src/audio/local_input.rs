//! local input track: plugin chain plus the usual strip controls
//!
//! One of these sits between the capture buffer and the mixer for every
//! channel the user transmits.  Gain, boost and pan are applied after the
//! plugin chain; stereo inversion swaps left/right last.
use crate::utils::to_lin;

use super::{
    fader::Fader,
    midi::MidiBuffer,
    plugin::{BoxedPlugin, PluginChain},
    power_meter::{MeterMode, PowerMeter},
    samples_buffer::SamplesBuffer,
    AudioNode,
};

pub struct LocalInputNode {
    chain: PluginChain,
    gain: f32,
    boost: f32, // linear, from a dB setting
    fader: Fader,
    muted: bool,
    soloed: bool,
    stereo_inverted: bool,
    meter: PowerMeter,
    scratch: SamplesBuffer,
    post: SamplesBuffer,
}

impl LocalInputNode {
    pub fn new() -> LocalInputNode {
        LocalInputNode {
            chain: PluginChain::new(),
            gain: 1.0,
            boost: 1.0,
            fader: Fader::new(),
            muted: false,
            soloed: false,
            stereo_inverted: false,
            meter: PowerMeter::new(MeterMode::Decibel),
            scratch: SamplesBuffer::new(2),
            post: SamplesBuffer::new(2),
        }
    }
    pub fn set_gain(&mut self, v: f32) -> () {
        self.gain = f32::clamp(v, 0.0, 4.0);
    }
    pub fn get_gain(&self) -> f32 {
        self.gain
    }
    pub fn set_boost(&mut self, db: f32) -> () {
        self.boost = to_lin(db);
    }
    pub fn set_pan(&mut self, v: f32) -> () {
        self.fader.set(v);
    }
    pub fn get_pan(&self) -> f32 {
        self.fader.get()
    }
    pub fn set_mute(&mut self, val: bool) -> () {
        self.muted = val;
    }
    pub fn set_solo(&mut self, val: bool) -> () {
        self.soloed = val;
    }
    pub fn set_stereo_inverted(&mut self, val: bool) -> () {
        self.stereo_inverted = val;
    }
    pub fn is_stereo_inverted(&self) -> bool {
        self.stereo_inverted
    }
    pub fn get_power_avg(&self) -> f64 {
        self.meter.get_avg()
    }
    pub fn get_power_peak(&self) -> f64 {
        self.meter.get_peak()
    }
    pub fn insert_plugin(&mut self, plugin: BoxedPlugin, idx: usize) -> () {
        self.chain.insert_plugin(plugin, idx);
    }
    pub fn delete_plugin(&mut self, idx: usize) -> () {
        self.chain.delete_plugin(idx);
    }
    pub fn chain(&self) -> &PluginChain {
        &self.chain
    }
    pub fn chain_mut(&mut self) -> &mut PluginChain {
        &mut self.chain
    }
    /// the processed (post chain, post strip) audio from the last block.
    /// This is what gets encoded and uploaded for this channel.
    pub fn processed(&self) -> &SamplesBuffer {
        &self.post
    }
}

impl AudioNode for LocalInputNode {
    fn process(&mut self, input: &SamplesBuffer, output: &mut SamplesBuffer, midi: &MidiBuffer) {
        if self.post.frames() != input.frames() {
            self.post.set_frame_length(input.frames());
            self.scratch.set_frame_length(input.frames());
        }
        let _ = self.post.copy_from(input);
        self.chain.process(&mut self.post, &mut self.scratch, midi);
        // strip controls come after the chain
        let strip_gain = self.gain * self.boost;
        for f in 0..self.post.frames() {
            let (l, r) = self.fader.apply(
                self.post.get(0, f) * strip_gain,
                self.post.get(1, f) * strip_gain,
            );
            self.post.set(0, f, l);
            self.post.set(1, f, r);
        }
        if self.stereo_inverted {
            self.post.swap_channels(0, 1);
        }
        self.meter.add_frame(self.post.channel(0), 1.0);
        let _ = output.copy_from(&self.post);
    }
    fn is_muted(&self) -> bool {
        self.muted
    }
    fn is_soloed(&self) -> bool {
        self.soloed
    }
}

#[cfg(test)]
mod test_local_input {
    use super::*;

    fn input_block() -> SamplesBuffer {
        let mut buf = SamplesBuffer::with_frames(2, 8);
        for f in 0..8 {
            buf.set(0, f, 0.5);
            buf.set(1, f, -0.5);
        }
        buf
    }

    #[test]
    fn applies_gain() {
        let mut node = LocalInputNode::new();
        node.set_gain(2.0);
        let input = input_block();
        let mut output = SamplesBuffer::with_frames(2, 8);
        node.process(&input, &mut output, &MidiBuffer::new());
        assert_eq!(output.get(0, 0), 1.0);
        assert_eq!(output.get(1, 0), -1.0);
    }
    #[test]
    fn stereo_inversion_swaps_channels() {
        let mut node = LocalInputNode::new();
        node.set_stereo_inverted(true);
        let input = input_block();
        let mut output = SamplesBuffer::with_frames(2, 8);
        node.process(&input, &mut output, &MidiBuffer::new());
        assert_eq!(output.get(0, 0), -0.5);
        assert_eq!(output.get(1, 0), 0.5);
    }
    #[test]
    fn hard_pan_left_silences_right() {
        let mut node = LocalInputNode::new();
        node.set_pan(-1.0);
        let input = input_block();
        let mut output = SamplesBuffer::with_frames(2, 8);
        node.process(&input, &mut output, &MidiBuffer::new());
        assert_eq!(output.get(1, 0), 0.0);
    }
    #[test]
    fn mute_and_solo_flags() {
        let mut node = LocalInputNode::new();
        assert!(!node.is_muted());
        node.set_mute(true);
        node.set_solo(true);
        assert!(node.is_muted());
        assert!(node.is_soloed());
    }
}
