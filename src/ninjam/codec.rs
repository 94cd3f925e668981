//! encoder/decoder capability surface plus the built in PCM codec
//!
//! The protocol does not care what bytes fill an interval, only the FourCC
//! tag that tells the far side how to decode them.  Fancy codecs (vorbis in
//! stock NINJAM) are collaborator provided; the offset-u16 PCM codec here is
//! enough to run a session end to end and keeps the tests honest.
use byteorder::{ByteOrder, LittleEndian};
use simple_error::bail;

use crate::audio::samples_buffer::SamplesBuffer;
use crate::common::box_error::BoxError;

pub type FourCc = [u8; 4];

pub trait AudioEncoder: Send {
    fn four_cc(&self) -> FourCc;
    /// encode one block, returning whatever bytes are ready to ship.  An
    /// empty vec just means the codec is buffering.
    fn encode(&mut self, buffer: &SamplesBuffer) -> Result<Vec<u8>, BoxError>;
    /// flush any buffered tail at an interval boundary
    fn finish(&mut self) -> Result<Vec<u8>, BoxError> {
        Ok(vec![])
    }
    /// rough wire size of a whole interval, used in the upload begin message
    fn estimate_encoded_size(&self, _frames: u64) -> u32 {
        0
    }
}

pub trait AudioDecoder: Send {
    fn decode(&mut self, data: &[u8]) -> Result<SamplesBuffer, BoxError>;
}

pub const PCM16_FOUR_CC: FourCc = *b"PC16";

/// stereo 16 bit offset PCM: 0 maps to -1.0, 65535 maps to +1.0.
/// Layout per block is all of channel 0 then all of channel 1.
pub struct Pcm16Codec {}

impl Pcm16Codec {
    pub fn new() -> Pcm16Codec {
        Pcm16Codec {}
    }
    fn convert_to_u16(v: f32) -> u16 {
        let mut sample = v + 1.0;
        // Prevent clipping
        if sample > 2.0 {
            sample = 2.0;
        }
        if sample < 0.0 {
            sample = 0.0;
        }
        (sample * 32766.0) as u16
    }
    fn convert_to_f32(n: u16) -> f32 {
        (1.0 / 32768.0 * n as f32) - 1.0
    }
}

impl AudioEncoder for Pcm16Codec {
    fn four_cc(&self) -> FourCc {
        PCM16_FOUR_CC
    }
    fn encode(&mut self, buffer: &SamplesBuffer) -> Result<Vec<u8>, BoxError> {
        if buffer.channels() < 2 {
            bail!("pcm16 codec needs a stereo buffer");
        }
        let frames = buffer.frames();
        let mut out = vec![0u8; frames * 4];
        let mut idx = 0;
        for c in 0..2 {
            for f in 0..frames {
                LittleEndian::write_u16(&mut out[idx..idx + 2], Self::convert_to_u16(buffer.get(c, f)));
                idx += 2;
            }
        }
        Ok(out)
    }
    fn estimate_encoded_size(&self, frames: u64) -> u32 {
        (frames * 4) as u32
    }
}

impl AudioDecoder for Pcm16Codec {
    fn decode(&mut self, data: &[u8]) -> Result<SamplesBuffer, BoxError> {
        if data.len() % 4 != 0 {
            bail!("pcm16 data length {} is not frame aligned", data.len());
        }
        let frames = data.len() / 4;
        let mut buffer = SamplesBuffer::with_frames(2, frames);
        let mut off_0 = 0;
        let mut off_1 = frames * 2;
        for f in 0..frames {
            buffer.set(0, f, Self::convert_to_f32(LittleEndian::read_u16(&data[off_0..off_0 + 2])));
            buffer.set(1, f, Self::convert_to_f32(LittleEndian::read_u16(&data[off_1..off_1 + 2])));
            off_0 += 2;
            off_1 += 2;
        }
        Ok(buffer)
    }
}
