//! interval download reassembly
//!
//! The server streams each remote interval as a Begin followed by Writes
//! carrying opaque encoded bytes, tied together by GUID.  Chunks accumulate
//! here until the last part flag closes the interval, then the whole byte
//! string goes back to the controller for decode.  Writes against a GUID we
//! never saw a Begin for are logged and dropped, not a session fault.
use log::warn;
use std::collections::HashMap;

use super::codec::FourCc;
use super::interval::IntervalGuid;
use super::StreamKey;

/// runaway guard, no sane interval gets near this
const MAX_INTERVAL_BYTES: usize = 16 * 1024 * 1024;

pub struct CompletedInterval {
    pub key: StreamKey,
    pub four_cc: FourCc,
    pub data: Vec<u8>,
}

struct PendingInterval {
    key: StreamKey,
    four_cc: FourCc,
    data: Vec<u8>,
}

pub struct DownloadManager {
    pending: HashMap<IntervalGuid, PendingInterval>,
}

impl DownloadManager {
    pub fn new() -> DownloadManager {
        DownloadManager {
            pending: HashMap::new(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn handle_begin(
        &mut self,
        guid: IntervalGuid,
        four_cc: FourCc,
        username: &str,
        channel_index: u8,
    ) -> () {
        if self.pending.contains_key(&guid) {
            warn!("duplicate download begin for {}", guid);
            return;
        }
        self.pending.insert(
            guid,
            PendingInterval {
                key: StreamKey::new(username, channel_index),
                four_cc,
                data: vec![],
            },
        );
    }

    /// append a chunk, returning the full interval when the last part lands
    pub fn handle_write(
        &mut self,
        guid: IntervalGuid,
        chunk: &[u8],
        is_last_part: bool,
    ) -> Option<CompletedInterval> {
        let interval = match self.pending.get_mut(&guid) {
            Some(p) => p,
            None => {
                warn!("download write for unknown guid {}, dropping {} bytes", guid, chunk.len());
                return None;
            }
        };
        if interval.data.len() + chunk.len() > MAX_INTERVAL_BYTES {
            warn!("download {} exceeded the interval size limit, dropping it", guid);
            self.pending.remove(&guid);
            return None;
        }
        interval.data.extend_from_slice(chunk);
        if !is_last_part {
            return None;
        }
        self.pending.remove(&guid).map(|done| CompletedInterval {
            key: done.key,
            four_cc: done.four_cc,
            data: done.data,
        })
    }

    /// forget any half downloaded intervals from a user that left or that we
    /// unsubscribed from
    pub fn drop_user(&mut self, username: &str) -> () {
        self.pending.retain(|_, p| p.key.username != username);
    }

    pub fn clear(&mut self) -> () {
        self.pending.clear();
    }
}

#[cfg(test)]
mod test_download {
    use super::*;
    use crate::ninjam::codec::PCM16_FOUR_CC;

    #[test]
    fn reassembles_chunks_in_order() {
        let mut mgr = DownloadManager::new();
        let guid = IntervalGuid::new_random();
        mgr.handle_begin(guid, PCM16_FOUR_CC, "alice", 0);
        assert!(mgr.handle_write(guid, &[1, 2, 3], false).is_none());
        assert!(mgr.handle_write(guid, &[4, 5], false).is_none());
        let done = mgr.handle_write(guid, &[6], true).unwrap();
        assert_eq!(done.data, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(done.key, StreamKey::new("alice", 0));
        assert_eq!(done.four_cc, PCM16_FOUR_CC);
        assert_eq!(mgr.pending_count(), 0);
    }
    #[test]
    fn unknown_guid_is_dropped() {
        let mut mgr = DownloadManager::new();
        assert!(mgr.handle_write(IntervalGuid::new_random(), &[1], true).is_none());
    }
    #[test]
    fn empty_interval_completes() {
        let mut mgr = DownloadManager::new();
        let guid = IntervalGuid::new_random();
        mgr.handle_begin(guid, PCM16_FOUR_CC, "bob", 2);
        let done = mgr.handle_write(guid, &[], true).unwrap();
        assert!(done.data.is_empty());
    }
    #[test]
    fn interleaved_guids_stay_separate() {
        let mut mgr = DownloadManager::new();
        let a = IntervalGuid::new_random();
        let b = IntervalGuid::new_random();
        mgr.handle_begin(a, PCM16_FOUR_CC, "alice", 0);
        mgr.handle_begin(b, PCM16_FOUR_CC, "bob", 1);
        assert!(mgr.handle_write(a, &[1], false).is_none());
        assert!(mgr.handle_write(b, &[9], false).is_none());
        let done_a = mgr.handle_write(a, &[2], true).unwrap();
        assert_eq!(done_a.data, vec![1, 2]);
        let done_b = mgr.handle_write(b, &[8], true).unwrap();
        assert_eq!(done_b.data, vec![9, 8]);
    }
    #[test]
    fn drop_user_discards_partials() {
        let mut mgr = DownloadManager::new();
        let guid = IntervalGuid::new_random();
        mgr.handle_begin(guid, PCM16_FOUR_CC, "carol", 0);
        mgr.handle_write(guid, &[1, 2], false);
        mgr.drop_user("carol");
        assert!(mgr.handle_write(guid, &[3], true).is_none());
    }
}
