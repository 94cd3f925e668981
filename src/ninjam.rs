//! NINJAM protocol engine: wire codec, interval upload/download and the
//! session controller
//!
//! The protocol side runs on the network thread.  Everything it exchanges
//! with the audio callback goes through the bounded channels declared here:
//! encoded chunks flow audio to network, decoded interval buffers flow
//! network to audio.  Neither direction ever blocks the callback.

use num_derive::{FromPrimitive, ToPrimitive};

use crate::audio::samples_buffer::SamplesBuffer;

/// one byte message type tags shared by both directions of the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum MessageType {
    ServerAuthChallenge = 0x00,
    ServerAuthReply = 0x01,
    ServerConfigChangeNotify = 0x02,
    ServerUserInfoChangeNotify = 0x03,
    ServerDownloadIntervalBegin = 0x04,
    ServerDownloadIntervalWrite = 0x05,
    ClientAuthUser = 0x80,
    ClientSetUserMask = 0x81,
    ClientSetChannelInfo = 0x82,
    ClientUploadIntervalBegin = 0x83,
    ClientUploadIntervalWrite = 0x84,
    ChatMessage = 0xc0,
    KeepAlive = 0xfd,
}

/// identifies one remote user channel across the whole session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub username: String,
    pub channel_index: u8,
}

impl StreamKey {
    pub fn new(username: &str, channel_index: u8) -> StreamKey {
        StreamKey {
            username: String::from(username),
            channel_index,
        }
    }
}

/// encoded audio handed from the callback to the network thread.
/// `end_of_interval` marks the final bytes of the current interval.
pub struct AudioChunk {
    pub channel_index: u8,
    pub data: Vec<u8>,
    pub end_of_interval: bool,
}

/// a decoded remote interval published to the graph (always a fresh copy,
/// the callback never sees partial decodes)
pub struct DecodedBlock {
    pub key: StreamKey,
    pub buffer: SamplesBuffer,
}

pub mod client;
pub mod client_message;
pub mod codec;
pub mod controller;
pub mod download;
pub mod engine;
pub mod interval;
pub mod interval_clock;
pub mod server_message;
pub mod session_socket;
pub mod upload;
