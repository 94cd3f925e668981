//! the real time audio graph: capture, local input processing, remote
//! playback and the mixer
//!
//! Everything in here runs inside the driver callback, so nothing in this
//! module is allowed to block or allocate unboundedly once the graph is up.

use crate::common::box_error::BoxError;

use self::{midi::MidiBuffer, samples_buffer::SamplesBuffer};

/// a processing unit in the graph
///
/// Nodes receive the capture buffer and write their contribution into `output`.
/// The graph guarantees `output` is sized to the current block before the call.
pub trait AudioNode: Send {
    fn process(&mut self, input: &SamplesBuffer, output: &mut SamplesBuffer, midi: &MidiBuffer);
    fn is_muted(&self) -> bool {
        false
    }
    fn is_soloed(&self) -> bool {
        false
    }
}

/// contract between the driver adapter and the engine
///
/// The driver invokes this once per fixed size block on its real time thread.
pub trait AudioCallback: Send {
    fn process_callback(
        &mut self,
        input: &SamplesBuffer,
        output: &mut SamplesBuffer,
    ) -> Result<(), BoxError>;
}

pub mod driver;
pub mod fader;
pub mod graph;
pub mod local_input;
pub mod midi;
pub mod mixer;
pub mod plugin;
pub mod power_meter;
pub mod remote_stream;
pub mod samples_buffer;
