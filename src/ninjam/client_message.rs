//! client to server wire messages
//!
//! Every message frames the same way: a one byte type tag, a four byte little
//! endian payload length, then the payload.  The payload layouts here have to
//! stay bit exact, the server parses them positionally.  Anything that would
//! overflow a length field (or smuggle a NUL into a string field) is rejected
//! when the message is constructed, never silently truncated.
//!
//! `from_frame` is the server side view of the same layouts.  It exists so a
//! broadcast component can parse these, and so the tests can prove every
//! serialized message round trips back to identical fields.
use byteorder::{ByteOrder, LittleEndian};
use openssl::sha::Sha1;
use simple_error::bail;
use std::fmt;

use crate::common::box_error::BoxError;

use super::codec::FourCc;
use super::interval::IntervalGuid;
use super::MessageType;

/// protocol version sent during auth (2.0, same as stock NINJAM clients)
pub const PROTOCOL_VERSION: u32 = 0x0002_0000;
/// refuse to build or accept any frame with a payload beyond this.
/// Upload chunks are a few KB, so a megabyte means something is broken.
pub const MAX_PAYLOAD_SIZE: usize = 1 << 20;
/// longest chat text we will put on the wire
pub const MAX_CHAT_TEXT: usize = 1024;

/// flag bit on an interval write marking the final chunk
pub const INTERVAL_WRITE_FLAG_LAST: u8 = 0x01;

/// sha1(sha1(user:pass) + challenge), the NINJAM challenge response
pub fn challenge_response(username: &str, password: &str, challenge: &[u8]) -> Vec<u8> {
    let mut inner = Sha1::new();
    inner.update(username.as_bytes());
    inner.update(b":");
    inner.update(password.as_bytes());
    let first = inner.finish();
    let mut outer = Sha1::new();
    outer.update(&first);
    outer.update(challenge);
    outer.finish().to_vec()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatType {
    Public,
    Private,
    Topic,
    Admin,
}

impl ChatType {
    pub fn command(&self) -> &'static str {
        match self {
            ChatType::Public => "MSG",
            ChatType::Private => "PRIVMSG",
            ChatType::Topic => "TOPIC",
            ChatType::Admin => "ADMIN",
        }
    }
    pub fn from_command(cmd: &str) -> Option<ChatType> {
        match cmd {
            "MSG" => Some(ChatType::Public),
            "PRIVMSG" => Some(ChatType::Private),
            "TOPIC" => Some(ChatType::Topic),
            "ADMIN" => Some(ChatType::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub name: String,
    pub volume: u16,
    pub pan: u8,
    pub flags: u8,
}

impl ChannelInfo {
    pub fn new(name: &str) -> ChannelInfo {
        ChannelInfo {
            name: String::from(name),
            volume: 0,
            pan: 0,
            flags: 0,
        }
    }
    /// a bare name with zeroed parameters tells the server to drop the channel
    pub fn removal(name: &str) -> ChannelInfo {
        Self::new(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    AuthUser {
        password_hash: Vec<u8>,
        username: String,
        protocol_version: u32,
        client_caps: u32,
        challenge: Vec<u8>,
    },
    SetChannels {
        channels: Vec<ChannelInfo>,
    },
    KeepAlive,
    SetUserMask {
        username: String,
        channel_mask: u32,
    },
    Chat {
        chat_type: ChatType,
        text: String,
    },
    UploadIntervalBegin {
        guid: IntervalGuid,
        estimated_size: u32,
        four_cc: FourCc,
        channel_index: u8,
        username: String,
    },
    IntervalUploadWrite {
        guid: IntervalGuid,
        data: Vec<u8>,
        is_last_part: bool,
    },
}

fn check_no_nul(what: &str, s: &str) -> Result<(), BoxError> {
    if s.bytes().any(|b| b == 0) {
        bail!("{} must not contain NUL bytes", what);
    }
    Ok(())
}

// control characters would let chat text forge protocol command sequences
fn sanitize_chat(text: &str) -> String {
    text.chars().filter(|c| !c.is_control()).collect()
}

impl ClientMessage {
    pub fn auth_user(
        username: &str,
        password: &str,
        challenge: &[u8],
        client_caps: u32,
    ) -> Result<ClientMessage, BoxError> {
        check_no_nul("username", username)?;
        Ok(ClientMessage::AuthUser {
            password_hash: challenge_response(username, password, challenge),
            username: String::from(username),
            protocol_version: PROTOCOL_VERSION,
            client_caps,
            challenge: challenge.to_vec(),
        })
    }
    pub fn set_channels(channels: Vec<ChannelInfo>) -> Result<ClientMessage, BoxError> {
        for chan in &channels {
            check_no_nul("channel name", &chan.name)?;
        }
        Ok(ClientMessage::SetChannels { channels })
    }
    pub fn set_user_mask(username: &str, channel_mask: u32) -> Result<ClientMessage, BoxError> {
        check_no_nul("username", username)?;
        Ok(ClientMessage::SetUserMask {
            username: String::from(username),
            channel_mask,
        })
    }
    pub fn chat(chat_type: ChatType, text: &str) -> Result<ClientMessage, BoxError> {
        let clean = sanitize_chat(text);
        if clean.len() > MAX_CHAT_TEXT {
            bail!("chat text of {} bytes exceeds the wire limit", clean.len());
        }
        Ok(ClientMessage::Chat {
            chat_type,
            text: clean,
        })
    }
    pub fn upload_interval_begin(
        guid: IntervalGuid,
        estimated_size: u32,
        four_cc: FourCc,
        channel_index: u8,
        username: &str,
    ) -> Result<ClientMessage, BoxError> {
        check_no_nul("username", username)?;
        Ok(ClientMessage::UploadIntervalBegin {
            guid,
            estimated_size,
            four_cc,
            channel_index,
            username: String::from(username),
        })
    }
    pub fn interval_upload_write(
        guid: IntervalGuid,
        data: Vec<u8>,
        is_last_part: bool,
    ) -> Result<ClientMessage, BoxError> {
        if 16 + 1 + data.len() > MAX_PAYLOAD_SIZE {
            bail!("interval chunk of {} bytes exceeds the payload limit", data.len());
        }
        Ok(ClientMessage::IntervalUploadWrite {
            guid,
            data,
            is_last_part,
        })
    }

    pub fn msg_type(&self) -> MessageType {
        match self {
            ClientMessage::AuthUser { .. } => MessageType::ClientAuthUser,
            ClientMessage::SetChannels { .. } => MessageType::ClientSetChannelInfo,
            ClientMessage::KeepAlive => MessageType::KeepAlive,
            ClientMessage::SetUserMask { .. } => MessageType::ClientSetUserMask,
            ClientMessage::Chat { .. } => MessageType::ChatMessage,
            ClientMessage::UploadIntervalBegin { .. } => MessageType::ClientUploadIntervalBegin,
            ClientMessage::IntervalUploadWrite { .. } => MessageType::ClientUploadIntervalWrite,
        }
    }

    /// append the framed message to `out`
    pub fn serialize_to(&self, out: &mut Vec<u8>) -> Result<(), BoxError> {
        let payload = self.build_payload()?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            bail!("payload of {} bytes exceeds the protocol limit", payload.len());
        }
        out.push(self.msg_type() as u8);
        let mut len_field = [0u8; 4];
        LittleEndian::write_u32(&mut len_field, payload.len() as u32);
        out.extend_from_slice(&len_field);
        out.extend_from_slice(&payload);
        Ok(())
    }

    fn build_payload(&self) -> Result<Vec<u8>, BoxError> {
        let mut p: Vec<u8> = vec![];
        match self {
            ClientMessage::AuthUser {
                password_hash,
                username,
                protocol_version,
                client_caps,
                challenge,
            } => {
                write_prefixed_bytes(&mut p, password_hash);
                write_prefixed_string(&mut p, username);
                write_u32(&mut p, *protocol_version);
                write_u32(&mut p, *client_caps);
                p.extend_from_slice(challenge);
            }
            ClientMessage::SetChannels { channels } => {
                for chan in channels {
                    write_prefixed_string(&mut p, &chan.name);
                    let mut v = [0u8; 2];
                    LittleEndian::write_u16(&mut v, chan.volume);
                    p.extend_from_slice(&v);
                    p.push(chan.pan);
                    p.push(chan.flags);
                }
            }
            ClientMessage::KeepAlive => {}
            ClientMessage::SetUserMask {
                username,
                channel_mask,
            } => {
                write_prefixed_string(&mut p, username);
                write_u32(&mut p, *channel_mask);
            }
            ClientMessage::Chat { chat_type, text } => {
                p.extend_from_slice(chat_type.command().as_bytes());
                p.push(0);
                p.extend_from_slice(text.as_bytes());
                p.push(0);
            }
            ClientMessage::UploadIntervalBegin {
                guid,
                estimated_size,
                four_cc,
                channel_index,
                username,
            } => {
                // bit exact: GUID, estimated size, FourCC, channel, NUL
                // terminated username.  The server indexes into this.
                p.extend_from_slice(guid.as_bytes());
                write_u32(&mut p, *estimated_size);
                p.extend_from_slice(four_cc);
                p.push(*channel_index);
                p.extend_from_slice(username.as_bytes());
                p.push(0);
            }
            ClientMessage::IntervalUploadWrite {
                guid,
                data,
                is_last_part,
            } => {
                p.extend_from_slice(guid.as_bytes());
                p.push(if *is_last_part { INTERVAL_WRITE_FLAG_LAST } else { 0 });
                p.extend_from_slice(data);
            }
        }
        Ok(p)
    }

    /// parse a client frame back into structured fields (the server's view)
    pub fn from_frame(msg_type: u8, payload: &[u8]) -> Result<ClientMessage, BoxError> {
        let mut r = PayloadReader::new(payload);
        match num::FromPrimitive::from_u8(msg_type) {
            Some(MessageType::ClientAuthUser) => {
                let password_hash = r.read_prefixed_bytes()?.to_vec();
                let username = r.read_prefixed_string()?;
                let protocol_version = r.read_u32()?;
                let client_caps = r.read_u32()?;
                let challenge = r.read_rest().to_vec();
                Ok(ClientMessage::AuthUser {
                    password_hash,
                    username,
                    protocol_version,
                    client_caps,
                    challenge,
                })
            }
            Some(MessageType::ClientSetChannelInfo) => {
                let mut channels = vec![];
                while r.remaining() > 0 {
                    let name = r.read_prefixed_string()?;
                    let volume = r.read_u16()?;
                    let pan = r.read_u8()?;
                    let flags = r.read_u8()?;
                    channels.push(ChannelInfo {
                        name,
                        volume,
                        pan,
                        flags,
                    });
                }
                Ok(ClientMessage::SetChannels { channels })
            }
            Some(MessageType::KeepAlive) => Ok(ClientMessage::KeepAlive),
            Some(MessageType::ClientSetUserMask) => {
                let username = r.read_prefixed_string()?;
                let channel_mask = r.read_u32()?;
                Ok(ClientMessage::SetUserMask {
                    username,
                    channel_mask,
                })
            }
            Some(MessageType::ChatMessage) => {
                let command = r.read_cstring()?;
                let text = r.read_cstring()?;
                match ChatType::from_command(&command) {
                    Some(chat_type) => Ok(ClientMessage::Chat { chat_type, text }),
                    None => bail!("unknown chat command '{}'", command),
                }
            }
            Some(MessageType::ClientUploadIntervalBegin) => {
                let guid = r.read_guid()?;
                let estimated_size = r.read_u32()?;
                let cc = r.read_bytes(4)?;
                let four_cc = [cc[0], cc[1], cc[2], cc[3]];
                let channel_index = r.read_u8()?;
                let username = r.read_cstring()?;
                Ok(ClientMessage::UploadIntervalBegin {
                    guid,
                    estimated_size,
                    four_cc,
                    channel_index,
                    username,
                })
            }
            Some(MessageType::ClientUploadIntervalWrite) => {
                let guid = r.read_guid()?;
                let flags = r.read_u8()?;
                let data = r.read_rest().to_vec();
                Ok(ClientMessage::IntervalUploadWrite {
                    guid,
                    data,
                    is_last_part: flags & INTERVAL_WRITE_FLAG_LAST != 0,
                })
            }
            _ => bail!("not a client message type: 0x{:02x}", msg_type),
        }
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClientMessage::AuthUser { username, protocol_version, .. } => {
                write!(f, "AuthUser {{ user: {}, proto: 0x{:08x} }}", username, protocol_version)
            }
            ClientMessage::SetChannels { channels } => {
                write!(f, "SetChannels {{ count: {} }}", channels.len())
            }
            ClientMessage::KeepAlive => write!(f, "KeepAlive"),
            ClientMessage::SetUserMask { username, channel_mask } => {
                write!(f, "SetUserMask {{ user: {}, mask: 0x{:08x} }}", username, channel_mask)
            }
            ClientMessage::Chat { chat_type, text } => {
                write!(f, "Chat {{ cmd: {}, text: {} }}", chat_type.command(), text)
            }
            ClientMessage::UploadIntervalBegin { guid, channel_index, estimated_size, .. } => {
                write!(
                    f,
                    "UploadIntervalBegin {{ guid: {}, chan: {}, est: {} }}",
                    guid, channel_index, estimated_size
                )
            }
            ClientMessage::IntervalUploadWrite { guid, data, is_last_part } => {
                write!(
                    f,
                    "IntervalUploadWrite {{ guid: {}, nbytes: {}, last: {} }}",
                    guid,
                    data.len(),
                    is_last_part
                )
            }
        }
    }
}

fn write_u32(out: &mut Vec<u8>, v: u32) -> () {
    let mut b = [0u8; 4];
    LittleEndian::write_u32(&mut b, v);
    out.extend_from_slice(&b);
}

fn write_prefixed_string(out: &mut Vec<u8>, s: &str) -> () {
    write_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn write_prefixed_bytes(out: &mut Vec<u8>, data: &[u8]) -> () {
    write_u32(out, data.len() as u32);
    out.extend_from_slice(data);
}

/// cursor over one message payload.  Every read reports truncation instead
/// of panicking, a short frame is a protocol violation not a crash.
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> PayloadReader<'a> {
        PayloadReader { data, pos: 0 }
    }
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], BoxError> {
        if self.remaining() < n {
            bail!("truncated payload: wanted {} bytes, had {}", n, self.remaining());
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
    pub fn read_u8(&mut self) -> Result<u8, BoxError> {
        Ok(self.read_bytes(1)?[0])
    }
    pub fn read_u16(&mut self) -> Result<u16, BoxError> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }
    pub fn read_u32(&mut self) -> Result<u32, BoxError> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }
    pub fn read_guid(&mut self) -> Result<IntervalGuid, BoxError> {
        let bytes = self.read_bytes(16)?;
        match IntervalGuid::from_slice(bytes) {
            Some(guid) => Ok(guid),
            None => bail!("bad guid"),
        }
    }
    pub fn read_prefixed_bytes(&mut self) -> Result<&'a [u8], BoxError> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }
    pub fn read_prefixed_string(&mut self) -> Result<String, BoxError> {
        let bytes = self.read_prefixed_bytes()?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }
    /// read up to (and consume) the next NUL
    pub fn read_cstring(&mut self) -> Result<String, BoxError> {
        match self.data[self.pos..].iter().position(|b| *b == 0) {
            Some(idx) => {
                let bytes = &self.data[self.pos..self.pos + idx];
                self.pos += idx + 1;
                Ok(String::from_utf8(bytes.to_vec())?)
            }
            None => bail!("unterminated string in payload"),
        }
    }
    pub fn read_rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }
}
