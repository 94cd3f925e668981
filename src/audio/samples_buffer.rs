//! multichannel float buffer, the unit of audio handed between graph stages
//!
//! Channel count is fixed at construction.  Frame length can be changed but
//! the contents do not survive a resize, callers get zeros.  A buffer is
//! owned by exactly one stage for the duration of a processing call; it is
//! never shared across threads, copies cross thread boundaries instead.
use simple_error::bail;
use std::fmt;

use crate::common::box_error::BoxError;

pub struct SamplesBuffer {
    channels: usize,
    frames: usize,
    data: Vec<f32>, // contiguous, channel major
}

impl SamplesBuffer {
    pub fn new(channels: usize) -> SamplesBuffer {
        SamplesBuffer {
            channels,
            frames: 0,
            data: vec![],
        }
    }
    pub fn with_frames(channels: usize, frames: usize) -> SamplesBuffer {
        SamplesBuffer {
            channels,
            frames,
            data: vec![0.0; channels * frames],
        }
    }
    pub fn channels(&self) -> usize {
        self.channels
    }
    pub fn frames(&self) -> usize {
        self.frames
    }
    /// resize every channel to n frames.  Contents are zeroed, history is
    /// not preserved across a resize.
    pub fn set_frame_length(&mut self, n: usize) -> () {
        self.frames = n;
        self.data.clear();
        self.data.resize(self.channels * n, 0.0);
    }
    pub fn zero(&mut self) -> () {
        for v in &mut self.data {
            *v = 0.0;
        }
    }
    pub fn get(&self, channel: usize, frame: usize) -> f32 {
        debug_assert!(channel < self.channels && frame < self.frames);
        if channel >= self.channels || frame >= self.frames {
            return 0.0;
        }
        self.data[channel * self.frames + frame]
    }
    pub fn set(&mut self, channel: usize, frame: usize, value: f32) -> () {
        debug_assert!(channel < self.channels && frame < self.frames);
        if channel >= self.channels || frame >= self.frames {
            return;
        }
        self.data[channel * self.frames + frame] = value;
    }
    pub fn channel(&self, channel: usize) -> &[f32] {
        debug_assert!(channel < self.channels);
        &self.data[channel * self.frames..(channel + 1) * self.frames]
    }
    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        debug_assert!(channel < self.channels);
        &mut self.data[channel * self.frames..(channel + 1) * self.frames]
    }
    /// sample-wise sum of other into self.  Shape mismatch is a graph wiring
    /// bug, reported rather than panicking.
    pub fn add(&mut self, other: &SamplesBuffer) -> Result<(), BoxError> {
        if self.channels != other.channels || self.frames != other.frames {
            bail!(
                "buffer shape mismatch: {}x{} vs {}x{}",
                self.channels,
                self.frames,
                other.channels,
                other.frames
            );
        }
        for (dst, src) in self.data.iter_mut().zip(other.data.iter()) {
            *dst += *src;
        }
        Ok(())
    }
    pub fn copy_from(&mut self, other: &SamplesBuffer) -> Result<(), BoxError> {
        if self.channels != other.channels || self.frames != other.frames {
            bail!("buffer shape mismatch on copy");
        }
        self.data.copy_from_slice(&other.data);
        Ok(())
    }
    pub fn apply_gain(&mut self, gain: f32) -> () {
        for v in &mut self.data {
            *v *= gain;
        }
    }
    /// largest absolute sample in the buffer
    pub fn peak(&self) -> f32 {
        let mut peak: f32 = 0.0;
        for v in &self.data {
            if v.abs() > peak {
                peak = v.abs();
            }
        }
        peak
    }
    /// swap two channels in place (stereo inversion is swap(0, 1))
    pub fn swap_channels(&mut self, a: usize, b: usize) -> () {
        debug_assert!(a < self.channels && b < self.channels);
        if a >= self.channels || b >= self.channels || a == b {
            return;
        }
        for f in 0..self.frames {
            self.data.swap(a * self.frames + f, b * self.frames + f);
        }
    }
    /// load frames from per-channel driver arrays.  Missing channels zero fill.
    pub fn fill_from(&mut self, inputs: &[&[f32]]) -> () {
        for c in 0..self.channels {
            let dst = c * self.frames;
            match inputs.get(c) {
                Some(src) => {
                    let n = usize::min(src.len(), self.frames);
                    self.data[dst..dst + n].copy_from_slice(&src[..n]);
                    for f in n..self.frames {
                        self.data[dst + f] = 0.0;
                    }
                }
                None => {
                    for f in 0..self.frames {
                        self.data[dst + f] = 0.0;
                    }
                }
            }
        }
    }
}

impl Clone for SamplesBuffer {
    fn clone(&self) -> SamplesBuffer {
        SamplesBuffer {
            channels: self.channels,
            frames: self.frames,
            data: self.data.clone(),
        }
    }
}

impl fmt::Display for SamplesBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ channels: {}, frames: {}, peak: {:.3} }}",
            self.channels,
            self.frames,
            self.peak()
        )
    }
}
