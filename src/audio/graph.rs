//! the node graph: capture feeding local input tracks and remote playback
//! tracks, all summed by the mixer
//!
//! Nodes live in an arena and are addressed by stable [`NodeId`] handles, so
//! nothing in the graph holds a direct pointer to anything else.  The graph
//! is owned by the engine and only ever touched from the audio callback
//! thread; membership changes arrive as commands the engine applies between
//! blocks, so a callback always sees a consistent node list.
use std::fmt;

use super::{
    local_input::LocalInputNode,
    midi::MidiBuffer,
    mixer::Mixer,
    power_meter::{MeterMode, PowerMeter},
    remote_stream::RemoteStreamNode,
    samples_buffer::SamplesBuffer,
    AudioNode,
};

/// stable handle to a node in the arena.  Ids are never reused while the
/// node is alive; a removed node's slot can be recycled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// the node variants the graph can host
pub enum TrackNode {
    Local(LocalInputNode),
    Remote(RemoteStreamNode),
}

impl TrackNode {
    fn as_node_mut(&mut self) -> &mut dyn AudioNode {
        match self {
            TrackNode::Local(n) => n,
            TrackNode::Remote(n) => n,
        }
    }
    fn as_node(&self) -> &dyn AudioNode {
        match self {
            TrackNode::Local(n) => n,
            TrackNode::Remote(n) => n,
        }
    }
}

/// source stage: forwards the driver capture buffer and meters the raw input
pub struct CaptureNode {
    meter: PowerMeter,
}

impl CaptureNode {
    fn new() -> CaptureNode {
        CaptureNode {
            meter: PowerMeter::new(MeterMode::Decibel),
        }
    }
    pub fn get_power_avg(&self) -> f64 {
        self.meter.get_avg()
    }
    pub fn get_power_peak(&self) -> f64 {
        self.meter.get_peak()
    }
}

impl AudioNode for CaptureNode {
    fn process(&mut self, input: &SamplesBuffer, output: &mut SamplesBuffer, _midi: &MidiBuffer) {
        let _ = output.copy_from(input);
        self.meter.add_frame(output.channel(0), 1.0);
    }
}

pub struct AudioGraph {
    capture: CaptureNode,
    nodes: Vec<Option<TrackNode>>,
    mixer: Mixer,
    capture_buf: SamplesBuffer,
    node_out: SamplesBuffer,
}

impl AudioGraph {
    pub fn new(meter_mode: MeterMode) -> AudioGraph {
        AudioGraph {
            capture: CaptureNode::new(),
            nodes: vec![],
            mixer: Mixer::new(meter_mode),
            capture_buf: SamplesBuffer::new(2),
            node_out: SamplesBuffer::new(2),
        }
    }
    pub fn add_node(&mut self, node: TrackNode) -> NodeId {
        match self.nodes.iter().position(|n| n.is_none()) {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                NodeId(idx as u32)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId((self.nodes.len() - 1) as u32)
            }
        }
    }
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        match self.nodes.get_mut(id.index()) {
            Some(slot) => slot.take().is_some(),
            None => false,
        }
    }
    pub fn num_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }
    pub fn local_mut(&mut self, id: NodeId) -> Option<&mut LocalInputNode> {
        match self.nodes.get_mut(id.index()) {
            Some(Some(TrackNode::Local(n))) => Some(n),
            _ => None,
        }
    }
    pub fn remote_mut(&mut self, id: NodeId) -> Option<&mut RemoteStreamNode> {
        match self.nodes.get_mut(id.index()) {
            Some(Some(TrackNode::Remote(n))) => Some(n),
            _ => None,
        }
    }
    pub fn capture(&self) -> &CaptureNode {
        &self.capture
    }
    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }
    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }
    /// drop all queued remote audio, used on disconnect and host resync
    pub fn flush_remotes(&mut self) -> () {
        for slot in &mut self.nodes {
            if let Some(TrackNode::Remote(n)) = slot {
                n.flush();
            }
        }
    }

    /// run one block through the whole graph
    pub fn process(&mut self, input: &SamplesBuffer, output: &mut SamplesBuffer, midi: &MidiBuffer) -> () {
        if self.capture_buf.frames() != output.frames() {
            self.capture_buf.set_frame_length(output.frames());
            self.node_out.set_frame_length(output.frames());
        }
        output.zero();
        self.capture.process(input, &mut self.capture_buf, midi);
        let any_solo = self
            .nodes
            .iter()
            .flatten()
            .any(|n| n.as_node().is_soloed());
        for slot in &mut self.nodes {
            if let Some(track) = slot {
                let node = track.as_node_mut();
                // always run the node so plugin and queue state keeps moving,
                // only sum it when the solo/mute policy says so
                node.process(&self.capture_buf, &mut self.node_out, midi);
                if Mixer::track_is_active(node.is_muted(), node.is_soloed(), any_solo) {
                    let _ = output.add(&self.node_out);
                }
            }
        }
        self.mixer.finish(output);
    }
}
