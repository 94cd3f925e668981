//! opaque effect capability hosted inside a local input node
//!
//! Plugins are provided by the embedding application (VST hosts and friends).
//! This module only defines the capability surface plus [`PluginChain`], the
//! ordered slot list a track runs its audio through.  A plugin that panics
//! during `process` is isolated at the chain boundary: the slot passes audio
//! through for that block and is flagged for bypass, so one bad effect cannot
//! take the mixer down with it.
use log::warn;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::{midi::MidiBuffer, samples_buffer::SamplesBuffer};

pub trait Plugin {
    fn name(&self) -> &str;
    fn bypass(&self) -> bool {
        false
    }
    fn set_bypass(&mut self, val: bool) -> ();
    /// render `input` into `output`.  Both buffers are sized to the current
    /// block before the call.  A bypassed plugin never gets here.
    fn process(&mut self, input: &SamplesBuffer, output: &mut SamplesBuffer, midi: &MidiBuffer);
    /// opaque state blob for session persistence
    fn serialize(&self) -> Vec<u8> {
        vec![]
    }
    fn restore(&mut self, _data: &[u8]) -> () {}
}

pub type BoxedPlugin = Box<dyn Plugin + Send>;

struct PluginSlot {
    plugin: BoxedPlugin,
    // set when the plugin panicked during process; the slot stays passthrough
    // until somebody clears or replaces it
    faulted: bool,
}

pub struct PluginChain {
    slots: Vec<PluginSlot>,
}

impl PluginChain {
    pub fn new() -> PluginChain {
        PluginChain { slots: vec![] }
    }
    pub fn num_plugins(&self) -> usize {
        self.slots.len()
    }
    pub fn insert_plugin(&mut self, plugin: BoxedPlugin, idx: usize) -> () {
        let slot = PluginSlot {
            plugin,
            faulted: false,
        };
        if idx > self.slots.len() {
            self.slots.push(slot);
        } else {
            self.slots.insert(idx, slot);
        }
    }
    pub fn delete_plugin(&mut self, idx: usize) -> () {
        if idx < self.slots.len() {
            self.slots.remove(idx);
        }
    }
    pub fn move_plugin(&mut self, from_idx: usize, to_idx: usize) -> () {
        if from_idx < self.slots.len() && to_idx < self.slots.len() {
            let slot = self.slots.remove(from_idx);
            self.slots.insert(to_idx, slot);
        }
    }
    pub fn set_bypass(&mut self, idx: usize, val: bool) -> () {
        if idx < self.slots.len() {
            self.slots[idx].plugin.set_bypass(val);
        }
    }
    pub fn is_faulted(&self, idx: usize) -> bool {
        idx < self.slots.len() && self.slots[idx].faulted
    }
    pub fn plugin_names(&self) -> Vec<String> {
        self.slots.iter().map(|s| String::from(s.plugin.name())).collect()
    }

    /// run the chain in slot order.  `buffer` holds the cumulative signal,
    /// `scratch` must have the same shape and is clobbered.
    pub fn process(&mut self, buffer: &mut SamplesBuffer, scratch: &mut SamplesBuffer, midi: &MidiBuffer) -> () {
        for slot in &mut self.slots {
            if slot.faulted || slot.plugin.bypass() {
                // passthrough, the cumulative signal stays in buffer
                continue;
            }
            scratch.zero();
            let plugin = &mut slot.plugin;
            let res = catch_unwind(AssertUnwindSafe(|| {
                plugin.process(buffer, scratch, midi);
            }));
            match res {
                Ok(()) => {
                    std::mem::swap(buffer, scratch);
                }
                Err(_) => {
                    // input is still intact in buffer, treat as passthrough
                    warn!("plugin '{}' panicked in process, bypassing", slot.plugin.name());
                    slot.faulted = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod test_plugin_chain {
    use super::*;

    // doubles every sample
    struct DoublerPlugin {
        bypassed: bool,
    }
    impl Plugin for DoublerPlugin {
        fn name(&self) -> &str {
            "Doubler"
        }
        fn bypass(&self) -> bool {
            self.bypassed
        }
        fn set_bypass(&mut self, val: bool) -> () {
            self.bypassed = val;
        }
        fn process(&mut self, input: &SamplesBuffer, output: &mut SamplesBuffer, _midi: &MidiBuffer) {
            for c in 0..input.channels() {
                for f in 0..input.frames() {
                    output.set(c, f, input.get(c, f) * 2.0);
                }
            }
        }
    }

    struct PanicPlugin;
    impl Plugin for PanicPlugin {
        fn name(&self) -> &str {
            "Panic"
        }
        fn set_bypass(&mut self, _val: bool) -> () {}
        fn process(&mut self, _input: &SamplesBuffer, _output: &mut SamplesBuffer, _midi: &MidiBuffer) {
            panic!("plugin blew up");
        }
    }

    fn test_buffer() -> SamplesBuffer {
        let mut buf = SamplesBuffer::with_frames(2, 8);
        buf.set(0, 0, 0.25);
        buf.set(1, 7, -0.25);
        buf
    }

    #[test]
    fn runs_in_slot_order() {
        let mut chain = PluginChain::new();
        chain.insert_plugin(Box::new(DoublerPlugin { bypassed: false }), 0);
        chain.insert_plugin(Box::new(DoublerPlugin { bypassed: false }), 1);
        let mut buffer = test_buffer();
        let mut scratch = SamplesBuffer::with_frames(2, 8);
        let midi = MidiBuffer::new();
        chain.process(&mut buffer, &mut scratch, &midi);
        // two doublers in series is x4
        assert_eq!(buffer.get(0, 0), 1.0);
        assert_eq!(buffer.get(1, 7), -1.0);
    }
    #[test]
    fn bypassed_slot_passes_through() {
        let mut chain = PluginChain::new();
        chain.insert_plugin(Box::new(DoublerPlugin { bypassed: true }), 0);
        let mut buffer = test_buffer();
        let mut scratch = SamplesBuffer::with_frames(2, 8);
        chain.process(&mut buffer, &mut scratch, &MidiBuffer::new());
        assert_eq!(buffer.get(0, 0), 0.25);
    }
    #[test]
    fn panicking_plugin_is_isolated() {
        let mut chain = PluginChain::new();
        chain.insert_plugin(Box::new(PanicPlugin), 0);
        chain.insert_plugin(Box::new(DoublerPlugin { bypassed: false }), 1);
        let mut buffer = test_buffer();
        let mut scratch = SamplesBuffer::with_frames(2, 8);
        chain.process(&mut buffer, &mut scratch, &MidiBuffer::new());
        // panicking slot acted as passthrough, the doubler still ran
        assert_eq!(buffer.get(0, 0), 0.5);
        assert!(chain.is_faulted(0));
        // and the next block processes without re-running the bad plugin
        let mut buffer = test_buffer();
        chain.process(&mut buffer, &mut scratch, &MidiBuffer::new());
        assert_eq!(buffer.get(0, 0), 0.5);
    }
    #[test]
    fn slot_management() {
        let mut chain = PluginChain::new();
        chain.insert_plugin(Box::new(DoublerPlugin { bypassed: false }), 0);
        chain.insert_plugin(Box::new(PanicPlugin), 0);
        assert_eq!(chain.num_plugins(), 2);
        assert_eq!(chain.plugin_names(), vec!["Panic", "Doubler"]);
        chain.move_plugin(0, 1);
        assert_eq!(chain.plugin_names(), vec!["Doubler", "Panic"]);
        chain.delete_plugin(1);
        assert_eq!(chain.num_plugins(), 1);
    }
}
