//! block scoped midi event list handed through the plugin chain
use std::fmt;

#[derive(Clone)]
pub struct MidiEvent {
    /// frame offset inside the current block
    pub frame: u32,
    pub data: Vec<u8>,
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{ frame: {}, bytes: {:02x?} }}", self.frame, self.data)
    }
}

#[derive(Clone)]
pub struct MidiBuffer {
    events: Vec<MidiEvent>,
}

impl MidiBuffer {
    pub fn new() -> MidiBuffer {
        MidiBuffer { events: vec![] }
    }
    pub fn push(&mut self, frame: u32, data: &[u8]) -> () {
        self.events.push(MidiEvent {
            frame,
            data: data.to_vec(),
        });
    }
    pub fn clear(&mut self) -> () {
        self.events.clear();
    }
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
    pub fn iter(&self) -> std::slice::Iter<MidiEvent> {
        self.events.iter()
    }
}
