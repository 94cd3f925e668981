//! the audio side of the session
//!
//! [`NinjamEngine`] is the [`AudioCallback`] the driver clocks.  Everything
//! it shares with the rest of the program moves over channels drained at the
//! top of each block: control commands, decoded remote intervals in, encoded
//! chunks out.  The callback never locks and never blocks on a channel; when
//! the network side falls behind, encoded chunks are dropped and counted.
use log::warn;
use serde_json::json;
use std::collections::HashMap;
use std::sync::mpsc;

use crate::audio::{
    graph::{AudioGraph, NodeId, TrackNode},
    local_input::LocalInputNode,
    midi::MidiBuffer,
    plugin::BoxedPlugin,
    power_meter::MeterMode,
    remote_stream::RemoteStreamNode,
    samples_buffer::SamplesBuffer,
    AudioCallback,
};
use crate::common::box_error::BoxError;
use crate::common::get_micro_time;
use crate::common::stream_time_stat::{MicroTimer, StreamTimeStat};

use super::codec::AudioEncoder;
use super::interval_clock::IntervalClock;
use super::{AudioChunk, DecodedBlock, StreamKey};

const LEVEL_EVENT_INTERVAL_US: u128 = 150_000;

/// control surface of the engine.  Commands are applied between blocks, so
/// a block never sees a half applied change.
pub enum EngineCommand {
    SetTempo { bpm: u16, bpi: u16 },
    SetTransmit { channel_index: u8, enabled: bool },
    SetMasterGain(f32),
    SetLocalGain { channel_index: u8, gain: f32 },
    SetLocalBoost { channel_index: u8, db: f32 },
    SetLocalPan { channel_index: u8, pan: f32 },
    SetLocalMute { channel_index: u8, muted: bool },
    SetLocalSolo { channel_index: u8, soloed: bool },
    SetLocalStereoInvert { channel_index: u8, inverted: bool },
    InsertPlugin { channel_index: u8, plugin: BoxedPlugin, idx: usize },
    DeletePlugin { channel_index: u8, idx: usize },
    BypassPlugin { channel_index: u8, idx: usize, bypass: bool },
    SetRemoteGain { key: StreamKey, db: f32 },
    SetRemotePan { key: StreamKey, pan: f32 },
    SetRemoteMute { key: StreamKey, muted: bool },
    SetRemoteSolo { key: StreamKey, soloed: bool },
    RemoveRemote { key: StreamKey },
    FlushRemotes,
}

struct LocalChannel {
    node: NodeId,
    encoder: Box<dyn AudioEncoder>,
    transmit: bool,
}

pub struct NinjamEngine {
    graph: AudioGraph,
    clock: IntervalClock,
    command_rx: mpsc::Receiver<EngineCommand>,
    decoded_rx: mpsc::Receiver<DecodedBlock>,
    chunk_tx: mpsc::SyncSender<AudioChunk>,
    status_tx: mpsc::Sender<serde_json::Value>,
    locals: Vec<LocalChannel>,
    remotes: HashMap<StreamKey, NodeId>,
    midi: MidiBuffer,
    timing: StreamTimeStat,
    last_now: u128,
    level_timer: MicroTimer,
    dropped_chunks: usize,
}

impl NinjamEngine {
    pub fn build(
        sample_rate: u32,
        command_rx: mpsc::Receiver<EngineCommand>,
        decoded_rx: mpsc::Receiver<DecodedBlock>,
        chunk_tx: mpsc::SyncSender<AudioChunk>,
        status_tx: mpsc::Sender<serde_json::Value>,
    ) -> NinjamEngine {
        let now = get_micro_time();
        NinjamEngine {
            graph: AudioGraph::new(MeterMode::Decibel),
            clock: IntervalClock::new(sample_rate),
            command_rx,
            decoded_rx,
            chunk_tx,
            status_tx,
            locals: vec![],
            remotes: HashMap::new(),
            midi: MidiBuffer::new(),
            timing: StreamTimeStat::build(100),
            last_now: now,
            level_timer: MicroTimer::build(now, LEVEL_EVENT_INTERVAL_US),
            dropped_chunks: 0,
        }
    }

    /// add a local input channel, returning its wire channel index.
    /// Channels start muted on the wire (transmit off).
    pub fn add_local_channel(&mut self, encoder: Box<dyn AudioEncoder>) -> u8 {
        let node = self.graph.add_node(TrackNode::Local(LocalInputNode::new()));
        self.locals.push(LocalChannel {
            node,
            encoder,
            transmit: false,
        });
        (self.locals.len() - 1) as u8
    }

    pub fn frames_per_interval(&self) -> u64 {
        self.clock.frames_per_interval()
    }
    pub fn dropped_chunks(&self) -> usize {
        self.dropped_chunks
    }

    fn close_open_intervals(&mut self) -> () {
        for (idx, ch) in self.locals.iter_mut().enumerate() {
            if ch.transmit {
                let tail = ch.encoder.finish().unwrap_or_default();
                send_chunk(
                    &self.chunk_tx,
                    &mut self.dropped_chunks,
                    AudioChunk {
                        channel_index: idx as u8,
                        data: tail,
                        end_of_interval: true,
                    },
                );
            }
        }
    }

    fn apply_command(&mut self, cmd: EngineCommand) -> () {
        match cmd {
            EngineCommand::SetTempo { bpm, bpi } => {
                // the interval restarts, close whatever was uploading
                self.close_open_intervals();
                self.clock.set_tempo(bpm, bpi);
            }
            EngineCommand::SetTransmit { channel_index, enabled } => {
                if let Some(ch) = self.locals.get_mut(channel_index as usize) {
                    if ch.transmit && !enabled {
                        let tail = ch.encoder.finish().unwrap_or_default();
                        send_chunk(
                            &self.chunk_tx,
                            &mut self.dropped_chunks,
                            AudioChunk {
                                channel_index,
                                data: tail,
                                end_of_interval: true,
                            },
                        );
                    }
                    ch.transmit = enabled;
                }
            }
            EngineCommand::SetMasterGain(v) => self.graph.mixer_mut().set_master(v),
            EngineCommand::SetLocalGain { channel_index, gain } => {
                if let Some(n) = self.local_node(channel_index) {
                    n.set_gain(gain);
                }
            }
            EngineCommand::SetLocalBoost { channel_index, db } => {
                if let Some(n) = self.local_node(channel_index) {
                    n.set_boost(db);
                }
            }
            EngineCommand::SetLocalPan { channel_index, pan } => {
                if let Some(n) = self.local_node(channel_index) {
                    n.set_pan(pan);
                }
            }
            EngineCommand::SetLocalMute { channel_index, muted } => {
                if let Some(n) = self.local_node(channel_index) {
                    n.set_mute(muted);
                }
            }
            EngineCommand::SetLocalSolo { channel_index, soloed } => {
                if let Some(n) = self.local_node(channel_index) {
                    n.set_solo(soloed);
                }
            }
            EngineCommand::SetLocalStereoInvert { channel_index, inverted } => {
                if let Some(n) = self.local_node(channel_index) {
                    n.set_stereo_inverted(inverted);
                }
            }
            EngineCommand::InsertPlugin { channel_index, plugin, idx } => {
                if let Some(n) = self.local_node(channel_index) {
                    n.insert_plugin(plugin, idx);
                }
            }
            EngineCommand::DeletePlugin { channel_index, idx } => {
                if let Some(n) = self.local_node(channel_index) {
                    n.delete_plugin(idx);
                }
            }
            EngineCommand::BypassPlugin { channel_index, idx, bypass } => {
                if let Some(n) = self.local_node(channel_index) {
                    n.chain_mut().set_bypass(idx, bypass);
                }
            }
            EngineCommand::SetRemoteGain { key, db } => {
                if let Some(n) = self.remote_node(&key) {
                    n.set_gain(db);
                }
            }
            EngineCommand::SetRemotePan { key, pan } => {
                if let Some(n) = self.remote_node(&key) {
                    n.set_pan(pan);
                }
            }
            EngineCommand::SetRemoteMute { key, muted } => {
                if let Some(n) = self.remote_node(&key) {
                    n.set_mute(muted);
                }
            }
            EngineCommand::SetRemoteSolo { key, soloed } => {
                if let Some(n) = self.remote_node(&key) {
                    n.set_solo(soloed);
                }
            }
            EngineCommand::RemoveRemote { key } => {
                if let Some(id) = self.remotes.remove(&key) {
                    self.graph.remove_node(id);
                }
            }
            EngineCommand::FlushRemotes => {
                self.graph.flush_remotes();
                self.clock.reset();
            }
        }
    }

    fn local_node(&mut self, channel_index: u8) -> Option<&mut LocalInputNode> {
        let id = self.locals.get(channel_index as usize)?.node;
        self.graph.local_mut(id)
    }
    fn remote_node(&mut self, key: &StreamKey) -> Option<&mut RemoteStreamNode> {
        let id = *self.remotes.get(key)?;
        self.graph.remote_mut(id)
    }

    fn route_decoded(&mut self, block: DecodedBlock) -> () {
        let id = match self.remotes.get(&block.key) {
            Some(id) => *id,
            None => {
                let id = self.graph.add_node(TrackNode::Remote(RemoteStreamNode::new()));
                self.remotes.insert(block.key.clone(), id);
                id
            }
        };
        if let Some(node) = self.graph.remote_mut(id) {
            node.push_decoded(block.buffer);
        }
    }

    fn build_level_event(&mut self) -> serde_json::Value {
        let mut players = vec![];
        for (idx, ch) in self.locals.iter().enumerate() {
            if let Some(node) = self.graph.local_mut(ch.node) {
                players.push(json!({
                    "kind": "local",
                    "channel": idx,
                    "level": node.get_power_avg(),
                    "peak": node.get_power_peak(),
                    "transmit": ch.transmit,
                }));
            }
        }
        let keys: Vec<StreamKey> = self.remotes.keys().cloned().collect();
        for key in keys {
            if let Some(node) = self.remote_node(&key) {
                players.push(json!({
                    "kind": "remote",
                    "user": key.username,
                    "channel": key.channel_index,
                    "level": node.get_power_avg(),
                    "underruns": node.get_underruns(),
                }));
            }
        }
        json!({
            "levelEvent": {
                "masterLevel": self.graph.mixer().get_master_level_avg(),
                "masterPeak": self.graph.mixer().get_master_level_peak(),
                "inputLevel": self.graph.capture().get_power_avg(),
                "callbackMean": self.timing.get_mean(),
                "droppedChunks": self.dropped_chunks,
                "players": players,
            }
        })
    }
}

fn send_chunk(tx: &mpsc::SyncSender<AudioChunk>, dropped: &mut usize, chunk: AudioChunk) -> () {
    if tx.try_send(chunk).is_err() {
        // network side is wedged or gone, the callback must not wait on it
        *dropped += 1;
        if *dropped % 100 == 1 {
            warn!("encoded chunk dropped ({} so far)", dropped);
        }
    }
}

fn encode_segment(
    encoder: &mut dyn AudioEncoder,
    post: &SamplesBuffer,
    start: usize,
    end: usize,
) -> Result<Vec<u8>, BoxError> {
    if start == end {
        return Ok(vec![]);
    }
    let mut seg = SamplesBuffer::with_frames(2, end - start);
    seg.fill_from(&[&post.channel(0)[start..end], &post.channel(1)[start..end]]);
    encoder.encode(&seg)
}

impl AudioCallback for NinjamEngine {
    fn process_callback(
        &mut self,
        input: &SamplesBuffer,
        output: &mut SamplesBuffer,
    ) -> Result<(), BoxError> {
        let now = get_micro_time();
        self.timing.add_sample((now - self.last_now) as f64 / 1000.0);
        self.last_now = now;

        while let Ok(cmd) = self.command_rx.try_recv() {
            self.apply_command(cmd);
        }
        while let Ok(block) = self.decoded_rx.try_recv() {
            self.route_decoded(block);
        }

        self.graph.process(input, output, &self.midi);
        self.midi.clear();

        let boundary = self.clock.advance(output.frames());
        let graph = &mut self.graph;
        let chunk_tx = &self.chunk_tx;
        let dropped = &mut self.dropped_chunks;
        for (idx, ch) in self.locals.iter_mut().enumerate() {
            if !ch.transmit {
                continue;
            }
            let node = match graph.local_mut(ch.node) {
                Some(n) => n,
                None => continue,
            };
            let post = node.processed();
            match boundary {
                None => {
                    let data = ch.encoder.encode(post)?;
                    send_chunk(
                        chunk_tx,
                        dropped,
                        AudioChunk {
                            channel_index: idx as u8,
                            data,
                            end_of_interval: false,
                        },
                    );
                }
                Some(offset) => {
                    // split the block at the boundary so the interval ends on
                    // the exact frame
                    let mut data = encode_segment(ch.encoder.as_mut(), post, 0, offset)?;
                    data.extend(ch.encoder.finish()?);
                    send_chunk(
                        chunk_tx,
                        dropped,
                        AudioChunk {
                            channel_index: idx as u8,
                            data,
                            end_of_interval: true,
                        },
                    );
                    let tail = encode_segment(ch.encoder.as_mut(), post, offset, post.frames())?;
                    if !tail.is_empty() {
                        send_chunk(
                            chunk_tx,
                            dropped,
                            AudioChunk {
                                channel_index: idx as u8,
                                data: tail,
                                end_of_interval: false,
                            },
                        );
                    }
                }
            }
        }

        if self.level_timer.expired(now) {
            self.level_timer.reset(now);
            let event = self.build_level_event();
            let _ = self.status_tx.send(event);
        }
        Ok(())
    }
}
