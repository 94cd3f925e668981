//! interval identity: the 16 byte GUID that ties all chunks of one upload
//! or download together
use rand::RngCore;
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntervalGuid {
    bytes: [u8; 16],
}

impl IntervalGuid {
    pub fn new_random() -> IntervalGuid {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        IntervalGuid { bytes }
    }
    pub fn from_bytes(bytes: [u8; 16]) -> IntervalGuid {
        IntervalGuid { bytes }
    }
    pub fn from_slice(data: &[u8]) -> Option<IntervalGuid> {
        if data.len() != 16 {
            return None;
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(data);
        Some(IntervalGuid { bytes })
    }
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.bytes
    }
}

impl fmt::Display for IntervalGuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in &self.bytes {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for IntervalGuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
