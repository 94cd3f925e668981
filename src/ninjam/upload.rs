//! interval upload state machine
//!
//! One uploader per transmitting local channel.  Encoded bytes stream out in
//! fixed size chunks as they are produced, nothing waits for the interval to
//! finish.  The first bytes of a fresh interval mint a new GUID and emit the
//! UploadIntervalBegin header, the interval boundary flushes whatever is
//! pending with the last part flag set even when that chunk is empty, the
//! server needs the flag to close the interval.
//!
//! All uploaders are driven from the single network thread in channel order,
//! which is what keeps messages of different intervals from interleaving
//! between a Begin and its final Write.
use log::debug;
use std::collections::HashMap;

use crate::common::box_error::BoxError;

use super::client_message::ClientMessage;
use super::codec::FourCc;
use super::interval::IntervalGuid;
use super::AudioChunk;

pub const UPLOAD_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadState {
    /// nothing sent for the current interval yet
    Idle,
    /// Begin is on the wire, less than one chunk buffered
    IntervalOpen,
    /// at least one chunk of the interval is on the wire
    Streaming,
}

pub struct IntervalUploader {
    channel_index: u8,
    four_cc: FourCc,
    username: String,
    state: UploadState,
    guid: IntervalGuid,
    pending: Vec<u8>,
    estimated_size: u32,
}

impl IntervalUploader {
    pub fn new(channel_index: u8, four_cc: FourCc, username: &str) -> IntervalUploader {
        IntervalUploader {
            channel_index,
            four_cc,
            username: String::from(username),
            state: UploadState::Idle,
            guid: IntervalGuid::new_random(),
            pending: vec![],
            estimated_size: 0,
        }
    }

    pub fn set_estimated_size(&mut self, estimated_size: u32) -> () {
        self.estimated_size = estimated_size;
    }

    pub fn is_idle(&self) -> bool {
        self.state == UploadState::Idle
    }

    /// stream more encoded bytes, emitting Begin and any full chunks
    pub fn write(&mut self, bytes: &[u8], out: &mut Vec<ClientMessage>) -> Result<(), BoxError> {
        if self.state == UploadState::Idle {
            self.guid = IntervalGuid::new_random();
            out.push(ClientMessage::upload_interval_begin(
                self.guid,
                self.estimated_size,
                self.four_cc,
                self.channel_index,
                &self.username,
            )?);
            self.state = UploadState::IntervalOpen;
            debug!("chan {} opened interval {}", self.channel_index, self.guid);
        }
        self.pending.extend_from_slice(bytes);
        while self.pending.len() >= UPLOAD_CHUNK_SIZE {
            let chunk: Vec<u8> = self.pending.drain(0..UPLOAD_CHUNK_SIZE).collect();
            out.push(ClientMessage::interval_upload_write(self.guid, chunk, false)?);
            self.state = UploadState::Streaming;
        }
        Ok(())
    }

    /// close the current interval.  No-op if nothing was ever written.
    pub fn end_interval(&mut self, out: &mut Vec<ClientMessage>) -> Result<(), BoxError> {
        if self.state == UploadState::Idle {
            return Ok(());
        }
        let tail: Vec<u8> = self.pending.drain(..).collect();
        out.push(ClientMessage::interval_upload_write(self.guid, tail, true)?);
        self.state = UploadState::Idle;
        Ok(())
    }
}

/// upload side of the session, one uploader per local channel index
pub struct UploadManager {
    username: String,
    estimated_size: u32,
    uploaders: HashMap<u8, IntervalUploader>,
}

impl UploadManager {
    pub fn new(username: &str) -> UploadManager {
        UploadManager {
            username: String::from(username),
            estimated_size: 0,
            uploaders: HashMap::new(),
        }
    }

    /// tell every channel how big a full interval will be on the wire.
    /// Uploaders spring up lazily on their first chunk, so the estimate is
    /// kept here and seeds them at creation too.
    pub fn set_estimated_size(&mut self, estimated_size: u32) -> () {
        self.estimated_size = estimated_size;
        for up in self.uploaders.values_mut() {
            up.set_estimated_size(estimated_size);
        }
    }

    /// feed one encoded chunk from the audio side
    pub fn handle_chunk(
        &mut self,
        four_cc: FourCc,
        chunk: &AudioChunk,
        out: &mut Vec<ClientMessage>,
    ) -> Result<(), BoxError> {
        let username = self.username.clone();
        let estimated_size = self.estimated_size;
        let up = self
            .uploaders
            .entry(chunk.channel_index)
            .or_insert_with(|| {
                let mut up = IntervalUploader::new(chunk.channel_index, four_cc, &username);
                up.set_estimated_size(estimated_size);
                up
            });
        if !chunk.data.is_empty() {
            up.write(&chunk.data, out)?;
        }
        if chunk.end_of_interval {
            up.end_interval(out)?;
        }
        Ok(())
    }

    /// close any open intervals, used when a channel stops transmitting or
    /// the session is going down
    pub fn finish_all(&mut self, out: &mut Vec<ClientMessage>) -> Result<(), BoxError> {
        for up in self.uploaders.values_mut() {
            up.end_interval(out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test_upload {
    use super::*;
    use crate::ninjam::codec::PCM16_FOUR_CC;

    fn guid_of(msg: &ClientMessage) -> IntervalGuid {
        match msg {
            ClientMessage::UploadIntervalBegin { guid, .. } => *guid,
            ClientMessage::IntervalUploadWrite { guid, .. } => *guid,
            other => panic!("unexpected message: {}", other),
        }
    }

    #[test]
    fn three_chunks_one_begin_then_new_guid() {
        let mut up = IntervalUploader::new(0, PCM16_FOUR_CC, "alice");
        let mut out = vec![];
        // three exact chunks of data
        for _ in 0..3 {
            up.write(&vec![7u8; UPLOAD_CHUNK_SIZE], &mut out).unwrap();
        }
        up.end_interval(&mut out).unwrap();
        // one Begin, three full Writes, one empty last Write
        assert_eq!(out.len(), 5);
        assert!(matches!(out[0], ClientMessage::UploadIntervalBegin { .. }));
        let guid = guid_of(&out[0]);
        for msg in &out[1..] {
            assert_eq!(guid_of(msg), guid);
        }
        match &out[4] {
            ClientMessage::IntervalUploadWrite { data, is_last_part, .. } => {
                assert!(data.is_empty());
                assert!(*is_last_part);
            }
            other => panic!("unexpected message: {}", other),
        }
        // the next interval gets a fresh guid
        let mut out2 = vec![];
        up.write(&[1, 2, 3], &mut out2).unwrap();
        assert_ne!(guid_of(&out2[0]), guid);
    }
    #[test]
    fn partial_bytes_buffer_until_chunk_full() {
        let mut up = IntervalUploader::new(1, PCM16_FOUR_CC, "bob");
        let mut out = vec![];
        up.write(&vec![0u8; UPLOAD_CHUNK_SIZE - 1], &mut out).unwrap();
        // just the Begin so far
        assert_eq!(out.len(), 1);
        up.write(&[0u8; 2], &mut out).unwrap();
        assert_eq!(out.len(), 2);
        up.end_interval(&mut out).unwrap();
        match &out[2] {
            ClientMessage::IntervalUploadWrite { data, is_last_part, .. } => {
                assert_eq!(data.len(), 1);
                assert!(*is_last_part);
            }
            other => panic!("unexpected message: {}", other),
        }
    }
    #[test]
    fn silent_interval_emits_nothing() {
        let mut up = IntervalUploader::new(0, PCM16_FOUR_CC, "carol");
        let mut out = vec![];
        up.end_interval(&mut out).unwrap();
        assert!(out.is_empty());
    }
    #[test]
    fn manager_routes_by_channel() {
        let mut mgr = UploadManager::new("dave");
        mgr.set_estimated_size(705600);
        let mut out = vec![];
        let chunk0 = AudioChunk {
            channel_index: 0,
            data: vec![1u8; 10],
            end_of_interval: false,
        };
        let chunk1 = AudioChunk {
            channel_index: 1,
            data: vec![2u8; 10],
            end_of_interval: true,
        };
        mgr.handle_chunk(PCM16_FOUR_CC, &chunk0, &mut out).unwrap();
        mgr.handle_chunk(PCM16_FOUR_CC, &chunk1, &mut out).unwrap();
        // chan 0: Begin.  chan 1: Begin plus its closing write.
        assert_eq!(out.len(), 3);
        assert_ne!(guid_of(&out[0]), guid_of(&out[1]));
        // the estimate was set before any uploader existed and still lands
        // on every Begin
        for msg in &out[0..2] {
            match msg {
                ClientMessage::UploadIntervalBegin { estimated_size, .. } => {
                    assert_eq!(*estimated_size, 705600);
                }
                other => panic!("unexpected message: {}", other),
            }
        }
        mgr.finish_all(&mut out).unwrap();
        // chan 0 still had an interval open
        assert_eq!(out.len(), 4);
    }
}
