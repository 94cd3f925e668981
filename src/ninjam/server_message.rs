//! server to client wire messages and the stream deframer
//!
//! Parsing rules here match the session controller's fault taxonomy.  A
//! message type we do not know is skippable, `parse` logs it and returns
//! Ok(None).  A frame we cannot deframe, or a known type whose payload is
//! malformed, is an error and the session goes down.
use byteorder::{ByteOrder, LittleEndian};
use log::warn;
use std::fmt;

use crate::common::box_error::BoxError;

use super::client_message::{PayloadReader, MAX_PAYLOAD_SIZE};
use super::codec::FourCc;
use super::interval::IntervalGuid;
use super::MessageType;

/// auth challenge capability bit: a license agreement string follows
pub const CAPS_LICENSE_AGREEMENT: u32 = 0x01;
/// auth reply flag bit: authentication succeeded
pub const AUTH_REPLY_FLAG_OK: u8 = 0x01;

#[derive(Debug, Clone, PartialEq)]
pub struct UserChannelNotify {
    pub active: bool,
    pub channel_index: u8,
    pub volume: u16,
    pub pan: u8,
    pub flags: u8,
    pub username: String,
    pub channel_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    AuthChallenge {
        challenge: [u8; 8],
        server_caps: u32,
        protocol_version: u32,
        license: Option<String>,
    },
    AuthReply {
        flags: u8,
        message: String,
        max_channels: u8,
    },
    ConfigChangeNotify {
        bpm: u16,
        bpi: u16,
    },
    UserInfoChangeNotify {
        entries: Vec<UserChannelNotify>,
    },
    DownloadIntervalBegin {
        guid: IntervalGuid,
        estimated_size: u32,
        four_cc: FourCc,
        channel_index: u8,
        username: String,
    },
    DownloadIntervalWrite {
        guid: IntervalGuid,
        data: Vec<u8>,
        is_last_part: bool,
    },
    Chat {
        command: String,
        args: Vec<String>,
    },
    KeepAlive,
}

impl ServerMessage {
    /// parse one deframed message.  Unknown types come back as Ok(None).
    pub fn parse(msg_type: u8, payload: &[u8]) -> Result<Option<ServerMessage>, BoxError> {
        let mut r = PayloadReader::new(payload);
        match num::FromPrimitive::from_u8(msg_type) {
            Some(MessageType::ServerAuthChallenge) => {
                let mut challenge = [0u8; 8];
                challenge.copy_from_slice(r.read_bytes(8)?);
                let server_caps = r.read_u32()?;
                let protocol_version = r.read_u32()?;
                let license = if server_caps & CAPS_LICENSE_AGREEMENT != 0 && r.remaining() > 0 {
                    Some(r.read_cstring()?)
                } else {
                    None
                };
                Ok(Some(ServerMessage::AuthChallenge {
                    challenge,
                    server_caps,
                    protocol_version,
                    license,
                }))
            }
            Some(MessageType::ServerAuthReply) => {
                let flags = r.read_u8()?;
                let message = if r.remaining() > 0 { r.read_cstring()? } else { String::new() };
                let max_channels = if r.remaining() > 0 { r.read_u8()? } else { 0 };
                Ok(Some(ServerMessage::AuthReply {
                    flags,
                    message,
                    max_channels,
                }))
            }
            Some(MessageType::ServerConfigChangeNotify) => {
                let bpm = r.read_u16()?;
                let bpi = r.read_u16()?;
                Ok(Some(ServerMessage::ConfigChangeNotify { bpm, bpi }))
            }
            Some(MessageType::ServerUserInfoChangeNotify) => {
                let mut entries = vec![];
                while r.remaining() > 0 {
                    let active = r.read_u8()? != 0;
                    let channel_index = r.read_u8()?;
                    let volume = r.read_u16()?;
                    let pan = r.read_u8()?;
                    let flags = r.read_u8()?;
                    let username = r.read_cstring()?;
                    let channel_name = r.read_cstring()?;
                    entries.push(UserChannelNotify {
                        active,
                        channel_index,
                        volume,
                        pan,
                        flags,
                        username,
                        channel_name,
                    });
                }
                Ok(Some(ServerMessage::UserInfoChangeNotify { entries }))
            }
            Some(MessageType::ServerDownloadIntervalBegin) => {
                let guid = r.read_guid()?;
                let estimated_size = r.read_u32()?;
                let cc = r.read_bytes(4)?;
                let four_cc = [cc[0], cc[1], cc[2], cc[3]];
                let channel_index = r.read_u8()?;
                let username = r.read_cstring()?;
                Ok(Some(ServerMessage::DownloadIntervalBegin {
                    guid,
                    estimated_size,
                    four_cc,
                    channel_index,
                    username,
                }))
            }
            Some(MessageType::ServerDownloadIntervalWrite) => {
                let guid = r.read_guid()?;
                let flags = r.read_u8()?;
                let data = r.read_rest().to_vec();
                Ok(Some(ServerMessage::DownloadIntervalWrite {
                    guid,
                    data,
                    is_last_part: flags & 0x01 != 0,
                }))
            }
            Some(MessageType::ChatMessage) => {
                let command = r.read_cstring()?;
                let mut args = vec![];
                while r.remaining() > 0 {
                    args.push(r.read_cstring()?);
                }
                Ok(Some(ServerMessage::Chat { command, args }))
            }
            Some(MessageType::KeepAlive) => Ok(Some(ServerMessage::KeepAlive)),
            _ => {
                warn!("skipping unknown server message type 0x{:02x} ({} bytes)", msg_type, payload.len());
                Ok(None)
            }
        }
    }

    /// keepalive period the server asked for, encoded in the challenge caps
    pub fn keepalive_seconds(server_caps: u32) -> u32 {
        (server_caps >> 8) & 0xff
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServerMessage::AuthChallenge { server_caps, protocol_version, .. } => {
                write!(f, "AuthChallenge {{ caps: 0x{:08x}, proto: 0x{:08x} }}", server_caps, protocol_version)
            }
            ServerMessage::AuthReply { flags, message, max_channels } => {
                write!(f, "AuthReply {{ flags: 0x{:02x}, msg: {}, maxchan: {} }}", flags, message, max_channels)
            }
            ServerMessage::ConfigChangeNotify { bpm, bpi } => {
                write!(f, "ConfigChangeNotify {{ bpm: {}, bpi: {} }}", bpm, bpi)
            }
            ServerMessage::UserInfoChangeNotify { entries } => {
                write!(f, "UserInfoChangeNotify {{ count: {} }}", entries.len())
            }
            ServerMessage::DownloadIntervalBegin { guid, username, channel_index, .. } => {
                write!(f, "DownloadIntervalBegin {{ guid: {}, user: {}, chan: {} }}", guid, username, channel_index)
            }
            ServerMessage::DownloadIntervalWrite { guid, data, is_last_part } => {
                write!(f, "DownloadIntervalWrite {{ guid: {}, nbytes: {}, last: {} }}", guid, data.len(), is_last_part)
            }
            ServerMessage::Chat { command, args } => {
                write!(f, "Chat {{ cmd: {}, args: {} }}", command, args.len())
            }
            ServerMessage::KeepAlive => write!(f, "KeepAlive"),
        }
    }
}

/// incremental deframer over the TCP byte stream.  Feed it whatever the
/// socket read, then pull complete frames until it returns None.
///
/// A frame with a payload over [`MAX_PAYLOAD_SIZE`] is a protocol violation,
/// not a transport fault: the framing is still intact, so the oversized
/// payload is discarded byte by byte and the stream carries on.
pub struct FrameReader {
    buffer: Vec<u8>,
    skip_remaining: usize,
}

impl FrameReader {
    pub fn new() -> FrameReader {
        FrameReader {
            buffer: vec![],
            skip_remaining: 0,
        }
    }
    pub fn feed(&mut self, data: &[u8]) -> () {
        if self.skip_remaining > 0 {
            let n = usize::min(self.skip_remaining, data.len());
            self.skip_remaining -= n;
            self.buffer.extend_from_slice(&data[n..]);
        } else {
            self.buffer.extend_from_slice(data);
        }
    }
    /// next complete (type, payload) frame, None if more bytes are needed
    pub fn next_frame(&mut self) -> Result<Option<(u8, Vec<u8>)>, BoxError> {
        loop {
            if self.skip_remaining > 0 || self.buffer.len() < 5 {
                return Ok(None);
            }
            let msg_type = self.buffer[0];
            let payload_len = LittleEndian::read_u32(&self.buffer[1..5]) as usize;
            if payload_len > MAX_PAYLOAD_SIZE {
                warn!(
                    "dropping oversized frame type 0x{:02x} ({} byte payload)",
                    msg_type, payload_len
                );
                let buffered = self.buffer.len() - 5;
                let n = usize::min(payload_len, buffered);
                self.buffer.drain(0..5 + n);
                self.skip_remaining = payload_len - n;
                continue;
            }
            if self.buffer.len() < 5 + payload_len {
                return Ok(None);
            }
            let payload = self.buffer[5..5 + payload_len].to_vec();
            self.buffer.drain(0..5 + payload_len);
            return Ok(Some((msg_type, payload)));
        }
    }
}

#[cfg(test)]
mod test_server_message {
    use super::*;

    fn frame(msg_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut wire = vec![msg_type];
        let mut len = [0u8; 4];
        LittleEndian::write_u32(&mut len, payload.len() as u32);
        wire.extend_from_slice(&len);
        wire.extend_from_slice(payload);
        wire
    }

    #[test]
    fn deframe_across_partial_feeds() {
        let wire = frame(0x02, &[120, 0, 8, 0]);
        let mut reader = FrameReader::new();
        // drip the bytes in one at a time
        for b in &wire[..wire.len() - 1] {
            reader.feed(&[*b]);
            assert!(reader.next_frame().unwrap().is_none());
        }
        reader.feed(&[wire[wire.len() - 1]]);
        let (msg_type, payload) = reader.next_frame().unwrap().unwrap();
        assert_eq!(msg_type, 0x02);
        assert_eq!(payload, vec![120, 0, 8, 0]);
        assert!(reader.next_frame().unwrap().is_none());
    }
    #[test]
    fn deframe_two_frames_in_one_feed() {
        let mut wire = frame(0xfd, &[]);
        wire.extend_from_slice(&frame(0x02, &[90, 0, 4, 0]));
        let mut reader = FrameReader::new();
        reader.feed(&wire);
        assert_eq!(reader.next_frame().unwrap().unwrap().0, 0xfd);
        assert_eq!(reader.next_frame().unwrap().unwrap().0, 0x02);
        assert!(reader.next_frame().unwrap().is_none());
    }
    #[test]
    fn oversized_frame_is_skipped_not_fatal() {
        let mut reader = FrameReader::new();
        // claim a payload just over the cap, then stream that many junk
        // bytes followed by a legitimate frame
        let oversized = (MAX_PAYLOAD_SIZE + 8) as u32;
        let mut header = vec![0x7eu8];
        let mut len = [0u8; 4];
        LittleEndian::write_u32(&mut len, oversized);
        header.extend_from_slice(&len);
        reader.feed(&header);
        assert!(reader.next_frame().unwrap().is_none());
        let mut junk = vec![0u8; oversized as usize];
        junk.extend_from_slice(&frame(0x02, &[100, 0, 8, 0]));
        reader.feed(&junk);
        let (msg_type, payload) = reader.next_frame().unwrap().unwrap();
        assert_eq!(msg_type, 0x02);
        assert_eq!(payload, vec![100, 0, 8, 0]);
    }
    #[test]
    fn parse_auth_challenge_with_license() {
        let mut payload = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let mut caps = [0u8; 4];
        // license bit set, keepalive of 10 seconds in the second byte
        LittleEndian::write_u32(&mut caps, 0x01 | (10 << 8));
        payload.extend_from_slice(&caps);
        let mut proto = [0u8; 4];
        LittleEndian::write_u32(&mut proto, 0x0002_0000);
        payload.extend_from_slice(&proto);
        payload.extend_from_slice(b"be nice\0");
        match ServerMessage::parse(0x00, &payload).unwrap().unwrap() {
            ServerMessage::AuthChallenge { challenge, server_caps, protocol_version, license } => {
                assert_eq!(challenge, [1, 2, 3, 4, 5, 6, 7, 8]);
                assert_eq!(protocol_version, 0x0002_0000);
                assert_eq!(license.unwrap(), "be nice");
                assert_eq!(ServerMessage::keepalive_seconds(server_caps), 10);
            }
            other => panic!("wrong message: {}", other),
        }
    }
    #[test]
    fn parse_config_change() {
        match ServerMessage::parse(0x02, &[120, 0, 16, 0]).unwrap().unwrap() {
            ServerMessage::ConfigChangeNotify { bpm, bpi } => {
                assert_eq!(bpm, 120);
                assert_eq!(bpi, 16);
            }
            other => panic!("wrong message: {}", other),
        }
    }
    #[test]
    fn parse_user_info_change() {
        let mut payload = vec![];
        for (user, chan, name) in [("alice", 0u8, "gtr"), ("alice", 1u8, "vox")] {
            payload.push(1);
            payload.push(chan);
            payload.extend_from_slice(&[0, 0]);
            payload.push(64);
            payload.push(0);
            payload.extend_from_slice(user.as_bytes());
            payload.push(0);
            payload.extend_from_slice(name.as_bytes());
            payload.push(0);
        }
        match ServerMessage::parse(0x03, &payload).unwrap().unwrap() {
            ServerMessage::UserInfoChangeNotify { entries } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].username, "alice");
                assert_eq!(entries[1].channel_name, "vox");
                assert!(entries[0].active);
            }
            other => panic!("wrong message: {}", other),
        }
    }
    #[test]
    fn parse_download_write() {
        let mut payload = vec![9u8; 16];
        payload.push(0x01);
        payload.extend_from_slice(&[10, 20, 30]);
        match ServerMessage::parse(0x05, &payload).unwrap().unwrap() {
            ServerMessage::DownloadIntervalWrite { guid, data, is_last_part } => {
                assert_eq!(guid, IntervalGuid::from_bytes([9u8; 16]));
                assert_eq!(data, vec![10, 20, 30]);
                assert!(is_last_part);
            }
            other => panic!("wrong message: {}", other),
        }
    }
    #[test]
    fn unknown_type_is_skippable() {
        assert!(ServerMessage::parse(0x7f, &[1, 2, 3]).unwrap().is_none());
    }
    #[test]
    fn truncated_known_type_is_an_error() {
        // config change needs four bytes
        assert!(ServerMessage::parse(0x02, &[120]).is_err());
    }
}
