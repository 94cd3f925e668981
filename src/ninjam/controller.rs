//! session controller: the protocol state machine on the network thread
//!
//! The controller is deliberately free of socket code.  It consumes parsed
//! [`ServerMessage`]s and encoded [`AudioChunk`]s, and produces
//! [`ClientMessage`]s to transmit plus commands and decoded audio for the
//! engine.  The client run loop owns the socket and pumps everything through
//! here, and the tests drive a whole session the same way without a server.
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::mpsc;

use simple_error::bail;

use crate::common::box_error::BoxError;
use crate::common::stream_time_stat::MicroTimer;

use super::client_message::{ChannelInfo, ClientMessage};
use super::codec::{AudioDecoder, AudioEncoder, FourCc};
use super::download::DownloadManager;
use super::engine::EngineCommand;
use super::server_message::{ServerMessage, AUTH_REPLY_FLAG_OK};
use super::upload::UploadManager;
use super::{AudioChunk, DecodedBlock, StreamKey};

const KEEPALIVE_DEFAULT_SECS: u32 = 3;
/// subscribe to every channel a user publishes
const SUBSCRIBE_ALL: u32 = 0xffff_ffff;
/// client caps bit 0 acknowledges the server license
const CLIENT_CAPS_LICENSE_OK: u32 = 0x01;

pub type DecoderFactory = Box<dyn Fn(FourCc) -> Option<Box<dyn AudioDecoder>> + Send>;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Disconnected,
    Authenticating,
    Synced { bpm: u16, bpi: u16 },
}

/// what the UI layer hears about
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    License(String),
    Chat { command: String, args: Vec<String> },
    RemoteChannelAdded { key: StreamKey, channel_name: String },
    RemoteChannelRemoved { key: StreamKey },
}

pub struct NinjamController {
    username: String,
    password: String,
    channel_names: Vec<String>,
    sample_rate: u32,
    // prototype codec, used for the FourCC tag and the upload size estimate
    codec: Box<dyn AudioEncoder>,
    decoder_factory: DecoderFactory,
    state: SessionState,
    uploads: UploadManager,
    downloads: DownloadManager,
    decoders: HashMap<StreamKey, (FourCc, Box<dyn AudioDecoder>)>,
    known_remotes: HashMap<StreamKey, String>,
    subscribed_users: HashSet<String>,
    blocked_users: HashSet<String>,
    command_tx: mpsc::Sender<EngineCommand>,
    decoded_tx: mpsc::SyncSender<DecodedBlock>,
    event_tx: mpsc::Sender<SessionEvent>,
    keepalive: MicroTimer,
    dropped_blocks: usize,
}

impl NinjamController {
    pub fn build(
        username: &str,
        password: &str,
        channel_names: Vec<String>,
        sample_rate: u32,
        codec: Box<dyn AudioEncoder>,
        decoder_factory: DecoderFactory,
        command_tx: mpsc::Sender<EngineCommand>,
        decoded_tx: mpsc::SyncSender<DecodedBlock>,
        event_tx: mpsc::Sender<SessionEvent>,
        now: u128,
    ) -> NinjamController {
        NinjamController {
            username: String::from(username),
            password: String::from(password),
            channel_names,
            sample_rate,
            codec,
            decoder_factory,
            state: SessionState::Disconnected,
            uploads: UploadManager::new(username),
            downloads: DownloadManager::new(),
            decoders: HashMap::new(),
            known_remotes: HashMap::new(),
            subscribed_users: HashSet::new(),
            blocked_users: HashSet::new(),
            command_tx,
            decoded_tx,
            event_tx,
            keepalive: MicroTimer::build(now, KEEPALIVE_DEFAULT_SECS as u128 * 1_000_000),
            dropped_blocks: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }
    pub fn username(&self) -> &str {
        &self.username
    }

    fn set_state(&mut self, state: SessionState) -> () {
        if self.state != state {
            info!("session state: {:?}", state);
            self.state = state.clone();
            let _ = self.event_tx.send(SessionEvent::StateChanged(state));
        }
    }

    /// react to one server message, queueing any replies on `out`
    pub fn handle_message(
        &mut self,
        msg: ServerMessage,
        out: &mut Vec<ClientMessage>,
    ) -> Result<(), BoxError> {
        match msg {
            ServerMessage::AuthChallenge {
                challenge,
                server_caps,
                license,
                ..
            } => {
                let secs = ServerMessage::keepalive_seconds(server_caps);
                let secs = if secs > 0 { secs } else { KEEPALIVE_DEFAULT_SECS };
                self.keepalive.set_interval(secs as u128 * 1_000_000);
                if let Some(text) = license {
                    let _ = self.event_tx.send(SessionEvent::License(text));
                }
                out.push(ClientMessage::auth_user(
                    &self.username,
                    &self.password,
                    &challenge,
                    CLIENT_CAPS_LICENSE_OK,
                )?);
                self.set_state(SessionState::Authenticating);
            }
            ServerMessage::AuthReply {
                flags,
                message,
                max_channels,
            } => {
                if flags & AUTH_REPLY_FLAG_OK == 0 {
                    bail!("authentication rejected: {}", message);
                }
                // the server may hand back a decorated username
                if !message.is_empty() && message != self.username {
                    info!("server assigned username {}", message);
                    self.username = message;
                    self.uploads = UploadManager::new(&self.username);
                }
                if self.channel_names.len() > max_channels as usize && max_channels > 0 {
                    warn!(
                        "server allows {} channels, announcing the first {} only",
                        max_channels, max_channels
                    );
                    self.channel_names.truncate(max_channels as usize);
                }
                let channels: Vec<ChannelInfo> = self
                    .channel_names
                    .iter()
                    .map(|n| ChannelInfo::new(n))
                    .collect();
                out.push(ClientMessage::set_channels(channels)?);
            }
            ServerMessage::ConfigChangeNotify { bpm, bpi } => {
                let _ = self.command_tx.send(EngineCommand::SetTempo { bpm, bpi });
                let fpi = self.sample_rate as u64 * 60 / bpm.max(1) as u64 * bpi.max(1) as u64;
                self.uploads.set_estimated_size(self.codec.estimate_encoded_size(fpi));
                self.set_state(SessionState::Synced { bpm, bpi });
            }
            ServerMessage::UserInfoChangeNotify { entries } => {
                for entry in entries {
                    let key = StreamKey::new(&entry.username, entry.channel_index);
                    if entry.active {
                        if self.subscribed_users.insert(entry.username.clone()) {
                            let mask = if self.blocked_users.contains(&entry.username) {
                                0
                            } else {
                                SUBSCRIBE_ALL
                            };
                            out.push(ClientMessage::set_user_mask(&entry.username, mask)?);
                        }
                        self.known_remotes.insert(key.clone(), entry.channel_name.clone());
                        let _ = self.event_tx.send(SessionEvent::RemoteChannelAdded {
                            key,
                            channel_name: entry.channel_name,
                        });
                    } else {
                        self.known_remotes.remove(&key);
                        self.decoders.remove(&key);
                        let _ = self.command_tx.send(EngineCommand::RemoveRemote { key: key.clone() });
                        let _ = self.event_tx.send(SessionEvent::RemoteChannelRemoved { key });
                        if !self.known_remotes.keys().any(|k| k.username == entry.username) {
                            self.subscribed_users.remove(&entry.username);
                            self.downloads.drop_user(&entry.username);
                        }
                    }
                }
            }
            ServerMessage::DownloadIntervalBegin {
                guid,
                four_cc,
                channel_index,
                username,
                ..
            } => {
                if self.blocked_users.contains(&username) {
                    return Ok(());
                }
                self.downloads.handle_begin(guid, four_cc, &username, channel_index);
            }
            ServerMessage::DownloadIntervalWrite {
                guid,
                data,
                is_last_part,
            } => {
                if let Some(done) = self.downloads.handle_write(guid, &data, is_last_part) {
                    self.decode_interval(done.key, done.four_cc, &done.data);
                }
            }
            ServerMessage::Chat { command, args } => {
                // args[0] carries the sender for regular messages
                if let Some(sender) = args.first() {
                    if self.blocked_users.contains(sender) {
                        return Ok(());
                    }
                }
                let _ = self.event_tx.send(SessionEvent::Chat { command, args });
            }
            ServerMessage::KeepAlive => {}
        }
        Ok(())
    }

    fn decode_interval(&mut self, key: StreamKey, four_cc: FourCc, data: &[u8]) -> () {
        let needs_new = match self.decoders.get(&key) {
            Some((cc, _)) => *cc != four_cc,
            None => true,
        };
        if needs_new {
            match (self.decoder_factory)(four_cc) {
                Some(dec) => {
                    self.decoders.insert(key.clone(), (four_cc, dec));
                }
                None => {
                    warn!(
                        "no decoder for {:?} from {}, dropping interval",
                        four_cc, key.username
                    );
                    return;
                }
            }
        }
        if let Some((_, decoder)) = self.decoders.get_mut(&key) {
            match decoder.decode(data) {
                Ok(buffer) => {
                    if self.decoded_tx.try_send(DecodedBlock { key, buffer }).is_err() {
                        self.dropped_blocks += 1;
                    }
                }
                Err(e) => {
                    // one bad interval does not take the session down
                    warn!("decode failed for {}: {}", key.username, e);
                }
            }
        }
    }

    /// feed one encoded chunk from the engine into the upload side
    pub fn handle_chunk(
        &mut self,
        chunk: &AudioChunk,
        out: &mut Vec<ClientMessage>,
    ) -> Result<(), BoxError> {
        let four_cc = self.codec.four_cc();
        self.uploads.handle_chunk(four_cc, chunk, out)
    }

    /// periodic work: emit a keepalive when the server's window is due
    pub fn pump(&mut self, now: u128, out: &mut Vec<ClientMessage>) -> () {
        if self.keepalive.expired(now) {
            self.keepalive.reset(now);
            out.push(ClientMessage::KeepAlive);
        }
    }

    /// any traffic proves the link is alive, push the keepalive out
    pub fn note_traffic(&mut self, now: u128) -> () {
        self.keepalive.reset(now);
    }

    pub fn block_user(&mut self, username: &str, out: &mut Vec<ClientMessage>) -> Result<(), BoxError> {
        if self.blocked_users.insert(String::from(username)) {
            self.downloads.drop_user(username);
            if self.subscribed_users.contains(username) {
                out.push(ClientMessage::set_user_mask(username, 0)?);
            }
        }
        Ok(())
    }

    pub fn unblock_user(&mut self, username: &str, out: &mut Vec<ClientMessage>) -> Result<(), BoxError> {
        if self.blocked_users.remove(username) && self.subscribed_users.contains(username) {
            out.push(ClientMessage::set_user_mask(username, SUBSCRIBE_ALL)?);
        }
        Ok(())
    }

    /// orderly teardown: close open uploads and flush the audio side
    pub fn disconnect(&mut self, out: &mut Vec<ClientMessage>) -> Result<(), BoxError> {
        self.uploads.finish_all(out)?;
        self.downloads.clear();
        self.decoders.clear();
        self.known_remotes.clear();
        self.subscribed_users.clear();
        let _ = self.command_tx.send(EngineCommand::FlushRemotes);
        self.set_state(SessionState::Disconnected);
        Ok(())
    }
}

#[cfg(test)]
mod test_controller {
    use super::*;
    use crate::ninjam::client_message::challenge_response;
    use crate::ninjam::codec::{Pcm16Codec, PCM16_FOUR_CC};
    use crate::ninjam::interval::IntervalGuid;

    struct Harness {
        ctl: NinjamController,
        command_rx: mpsc::Receiver<EngineCommand>,
        decoded_rx: mpsc::Receiver<DecodedBlock>,
        event_rx: mpsc::Receiver<SessionEvent>,
    }

    fn build_harness() -> Harness {
        let (command_tx, command_rx) = mpsc::channel();
        let (decoded_tx, decoded_rx) = mpsc::sync_channel(16);
        let (event_tx, event_rx) = mpsc::channel();
        let factory: DecoderFactory = Box::new(|cc| {
            if cc == PCM16_FOUR_CC {
                Some(Box::new(Pcm16Codec::new()))
            } else {
                None
            }
        });
        let ctl = NinjamController::build(
            "alice",
            "sekrit",
            vec![String::from("guitar")],
            44100,
            Box::new(Pcm16Codec::new()),
            factory,
            command_tx,
            decoded_tx,
            event_tx,
            0,
        );
        Harness {
            ctl,
            command_rx,
            decoded_rx,
            event_rx,
        }
    }

    fn challenge_msg() -> ServerMessage {
        ServerMessage::AuthChallenge {
            challenge: [1, 2, 3, 4, 5, 6, 7, 8],
            server_caps: 5 << 8,
            protocol_version: 0x0002_0000,
            license: None,
        }
    }

    #[test]
    fn auth_handshake() {
        let mut h = build_harness();
        let mut out = vec![];
        h.ctl.handle_message(challenge_msg(), &mut out).unwrap();
        assert_eq!(*h.ctl.state(), SessionState::Authenticating);
        match &out[0] {
            ClientMessage::AuthUser { password_hash, username, .. } => {
                assert_eq!(username, "alice");
                assert_eq!(
                    *password_hash,
                    challenge_response("alice", "sekrit", &[1, 2, 3, 4, 5, 6, 7, 8])
                );
            }
            other => panic!("unexpected reply: {}", other),
        }
        // accept, then the channel announcement goes out
        out.clear();
        h.ctl
            .handle_message(
                ServerMessage::AuthReply {
                    flags: AUTH_REPLY_FLAG_OK,
                    message: String::from("alice"),
                    max_channels: 4,
                },
                &mut out,
            )
            .unwrap();
        match &out[0] {
            ClientMessage::SetChannels { channels } => {
                assert_eq!(channels[0].name, "guitar");
            }
            other => panic!("unexpected reply: {}", other),
        }
        // tempo sync completes the handshake
        out.clear();
        h.ctl
            .handle_message(ServerMessage::ConfigChangeNotify { bpm: 120, bpi: 8 }, &mut out)
            .unwrap();
        assert_eq!(*h.ctl.state(), SessionState::Synced { bpm: 120, bpi: 8 });
        match h.command_rx.try_recv().unwrap() {
            EngineCommand::SetTempo { bpm, bpi } => {
                assert_eq!(bpm, 120);
                assert_eq!(bpi, 8);
            }
            _ => panic!("expected a tempo command"),
        }
    }
    #[test]
    fn auth_rejection_is_fatal() {
        let mut h = build_harness();
        let mut out = vec![];
        let res = h.ctl.handle_message(
            ServerMessage::AuthReply {
                flags: 0,
                message: String::from("bad password"),
                max_channels: 0,
            },
            &mut out,
        );
        assert!(res.is_err());
    }
    #[test]
    fn subscribes_to_new_users() {
        let mut h = build_harness();
        let mut out = vec![];
        h.ctl
            .handle_message(
                ServerMessage::UserInfoChangeNotify {
                    entries: vec![crate::ninjam::server_message::UserChannelNotify {
                        active: true,
                        channel_index: 0,
                        volume: 0,
                        pan: 0,
                        flags: 0,
                        username: String::from("bob"),
                        channel_name: String::from("bass"),
                    }],
                },
                &mut out,
            )
            .unwrap();
        match &out[0] {
            ClientMessage::SetUserMask { username, channel_mask } => {
                assert_eq!(username, "bob");
                assert_eq!(*channel_mask, SUBSCRIBE_ALL);
            }
            other => panic!("unexpected reply: {}", other),
        }
        match h.event_rx.try_recv().unwrap() {
            SessionEvent::RemoteChannelAdded { key, channel_name } => {
                assert_eq!(key, StreamKey::new("bob", 0));
                assert_eq!(channel_name, "bass");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
    #[test]
    fn download_decodes_to_the_engine() {
        let mut h = build_harness();
        let mut out = vec![];
        // make bob known first
        h.ctl
            .handle_message(
                ServerMessage::UserInfoChangeNotify {
                    entries: vec![crate::ninjam::server_message::UserChannelNotify {
                        active: true,
                        channel_index: 0,
                        volume: 0,
                        pan: 0,
                        flags: 0,
                        username: String::from("bob"),
                        channel_name: String::from("bass"),
                    }],
                },
                &mut out,
            )
            .unwrap();
        // encode a little interval and stream it in two writes
        let mut codec = Pcm16Codec::new();
        let mut buf = crate::audio::samples_buffer::SamplesBuffer::with_frames(2, 32);
        for f in 0..32 {
            buf.set(0, f, 0.5);
            buf.set(1, f, 0.5);
        }
        let bytes = codec.encode(&buf).unwrap();
        let guid = IntervalGuid::new_random();
        h.ctl
            .handle_message(
                ServerMessage::DownloadIntervalBegin {
                    guid,
                    estimated_size: bytes.len() as u32,
                    four_cc: PCM16_FOUR_CC,
                    channel_index: 0,
                    username: String::from("bob"),
                },
                &mut out,
            )
            .unwrap();
        let (first, rest) = bytes.split_at(bytes.len() / 2);
        h.ctl
            .handle_message(
                ServerMessage::DownloadIntervalWrite {
                    guid,
                    data: first.to_vec(),
                    is_last_part: false,
                },
                &mut out,
            )
            .unwrap();
        assert!(h.decoded_rx.try_recv().is_err());
        h.ctl
            .handle_message(
                ServerMessage::DownloadIntervalWrite {
                    guid,
                    data: rest.to_vec(),
                    is_last_part: true,
                },
                &mut out,
            )
            .unwrap();
        let block = h.decoded_rx.try_recv().unwrap();
        assert_eq!(block.key, StreamKey::new("bob", 0));
        assert_eq!(block.buffer.frames(), 32);
        assert!((block.buffer.get(0, 5) - 0.5).abs() < 0.001);
    }
    #[test]
    fn blocked_user_is_muted_everywhere() {
        let mut h = build_harness();
        let mut out = vec![];
        h.ctl.block_user("troll", &mut out).unwrap();
        // downloads from the blocked user never start
        h.ctl
            .handle_message(
                ServerMessage::DownloadIntervalBegin {
                    guid: IntervalGuid::new_random(),
                    estimated_size: 0,
                    four_cc: PCM16_FOUR_CC,
                    channel_index: 0,
                    username: String::from("troll"),
                },
                &mut out,
            )
            .unwrap();
        // chat from them is swallowed
        h.ctl
            .handle_message(
                ServerMessage::Chat {
                    command: String::from("MSG"),
                    args: vec![String::from("troll"), String::from("buy my mixtape")],
                },
                &mut out,
            )
            .unwrap();
        assert!(h.event_rx.try_recv().is_err());
    }
    #[test]
    fn keepalive_pump() {
        let mut h = build_harness();
        let mut out = vec![];
        // challenge asked for 5 second keepalives
        h.ctl.handle_message(challenge_msg(), &mut out).unwrap();
        out.clear();
        h.ctl.pump(4_000_000, &mut out);
        assert!(out.is_empty());
        h.ctl.pump(5_000_001, &mut out);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], ClientMessage::KeepAlive));
    }
    #[test]
    fn chunks_flow_to_upload_messages() {
        let mut h = build_harness();
        let mut out = vec![];
        let chunk = AudioChunk {
            channel_index: 0,
            data: vec![1, 2, 3],
            end_of_interval: true,
        };
        h.ctl.handle_chunk(&chunk, &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], ClientMessage::UploadIntervalBegin { .. }));
        assert!(matches!(
            out[1],
            ClientMessage::IntervalUploadWrite { is_last_part: true, .. }
        ));
    }
    #[test]
    fn disconnect_flushes_everything() {
        let mut h = build_harness();
        let mut out = vec![];
        let chunk = AudioChunk {
            channel_index: 0,
            data: vec![1, 2, 3],
            end_of_interval: false,
        };
        h.ctl.handle_chunk(&chunk, &mut out).unwrap();
        out.clear();
        h.ctl.disconnect(&mut out).unwrap();
        // the open interval was closed with a final write
        assert_eq!(out.len(), 1);
        assert!(matches!(
            out[0],
            ClientMessage::IntervalUploadWrite { is_last_part: true, .. }
        ));
        assert!(matches!(
            h.command_rx.try_recv().unwrap(),
            EngineCommand::FlushRemotes
        ));
        assert_eq!(*h.ctl.state(), SessionState::Disconnected);
    }
    #[test]
    fn disconnect_after_an_error_still_closes_uploads() {
        let mut h = build_harness();
        let mut out = vec![];
        let chunk = AudioChunk {
            channel_index: 0,
            data: vec![1, 2, 3],
            end_of_interval: false,
        };
        h.ctl.handle_chunk(&chunk, &mut out).unwrap();
        // a fatal message errors the run loop mid-session
        let res = h.ctl.handle_message(
            ServerMessage::AuthReply {
                flags: 0,
                message: String::from("kicked"),
                max_channels: 0,
            },
            &mut out,
        );
        assert!(res.is_err());
        // the teardown that follows still flushes the open interval
        out.clear();
        h.ctl.disconnect(&mut out).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(
            out[0],
            ClientMessage::IntervalUploadWrite { is_last_part: true, .. }
        ));
        // and a second teardown has nothing left to say
        out.clear();
        h.ctl.disconnect(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
