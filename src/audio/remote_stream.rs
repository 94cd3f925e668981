//! playback node for one remote user channel
//!
//! Decoded interval audio is published to this node as whole buffers (always
//! copies, the decoder runs on the network thread).  The node streams them out
//! block by block.  The queue is bounded: when a slow consumer would overflow
//! it we drop the oldest buffer, the real time side is never pushed back on.
//! Underruns play silence.
use std::collections::VecDeque;
use std::fmt;

use crate::utils::to_lin;

use super::{
    fader::Fader,
    midi::MidiBuffer,
    power_meter::{MeterMode, PowerMeter},
    samples_buffer::SamplesBuffer,
    AudioNode,
};

// enough for a couple of seconds of decoded intervals at typical block rates
const MAX_QUEUED_BUFFERS: usize = 32;

pub struct RemoteStreamNode {
    queue: VecDeque<SamplesBuffer>,
    // read position inside the front buffer
    offset: usize,
    gain: f32,
    fader: Fader,
    muted: bool,
    soloed: bool,
    meter: PowerMeter,
    underruns: usize,
    drops: usize,
}

impl RemoteStreamNode {
    pub fn new() -> RemoteStreamNode {
        RemoteStreamNode {
            queue: VecDeque::new(),
            offset: 0,
            gain: 1.0,
            fader: Fader::new(),
            muted: false,
            soloed: false,
            meter: PowerMeter::new(MeterMode::Decibel),
            underruns: 0,
            drops: 0,
        }
    }
    pub fn set_gain(&mut self, db: f32) -> () {
        self.gain = to_lin(db);
    }
    pub fn set_pan(&mut self, v: f32) -> () {
        self.fader.set(v);
    }
    pub fn set_mute(&mut self, val: bool) -> () {
        self.muted = val;
    }
    pub fn set_solo(&mut self, val: bool) -> () {
        self.soloed = val;
    }
    pub fn get_power_avg(&self) -> f64 {
        self.meter.get_avg()
    }
    pub fn get_underruns(&self) -> usize {
        self.underruns
    }
    pub fn get_drops(&self) -> usize {
        self.drops
    }
    pub fn queued_buffers(&self) -> usize {
        self.queue.len()
    }
    /// hand a decoded buffer to the node.  Called from the graph when it
    /// drains the decode channel at the top of a callback.
    pub fn push_decoded(&mut self, buffer: SamplesBuffer) -> () {
        if self.queue.len() >= MAX_QUEUED_BUFFERS {
            self.queue.pop_front();
            self.offset = 0;
            self.drops += 1;
        }
        self.queue.push_back(buffer);
    }
    pub fn flush(&mut self) -> () {
        self.queue.clear();
        self.offset = 0;
    }

    fn next_frame(&mut self) -> Option<(f32, f32)> {
        loop {
            let front = self.queue.front()?;
            if self.offset < front.frames() {
                let l = front.get(0, self.offset);
                let r = if front.channels() > 1 {
                    front.get(1, self.offset)
                } else {
                    l
                };
                self.offset += 1;
                return Some((l, r));
            }
            self.queue.pop_front();
            self.offset = 0;
        }
    }
}

impl AudioNode for RemoteStreamNode {
    fn process(&mut self, _input: &SamplesBuffer, output: &mut SamplesBuffer, _midi: &MidiBuffer) {
        let mut ran_dry = false;
        for f in 0..output.frames() {
            match self.next_frame() {
                Some((l, r)) => {
                    let (l, r) = self.fader.apply(l * self.gain, r * self.gain);
                    output.set(0, f, l);
                    output.set(1, f, r);
                }
                None => {
                    output.set(0, f, 0.0);
                    output.set(1, f, 0.0);
                    ran_dry = true;
                }
            }
        }
        if ran_dry {
            self.underruns += 1;
        }
        self.meter.add_frame(output.channel(0), 1.0);
    }
    fn is_muted(&self) -> bool {
        self.muted
    }
    fn is_soloed(&self) -> bool {
        self.soloed
    }
}

impl fmt::Display for RemoteStreamNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ queued: {}, underruns: {}, drops: {} }}",
            self.queue.len(),
            self.underruns,
            self.drops
        )
    }
}
