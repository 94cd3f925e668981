//! sample accurate interval timing
//!
//! Interval length is pure integer math off the server tempo, so a thousand
//! intervals end exactly where the arithmetic says they do.  The clock never
//! rounds per block, it carries the elapsed frame count forward and reports
//! the in-block offset where a boundary falls so the engine can split the
//! block there.
use std::fmt;

#[derive(Debug, Clone)]
pub struct IntervalClock {
    sample_rate: u32,
    bpm: u16,
    bpi: u16,
    frames_per_interval: u64,
    elapsed: u64,
}

impl IntervalClock {
    pub fn new(sample_rate: u32) -> IntervalClock {
        let mut clock = IntervalClock {
            sample_rate,
            bpm: 120,
            bpi: 8,
            frames_per_interval: 0,
            elapsed: 0,
        };
        clock.set_tempo(120, 8);
        clock
    }

    /// apply a server tempo change.  Takes effect immediately and restarts
    /// the interval from zero, matching how the server counts.
    pub fn set_tempo(&mut self, bpm: u16, bpi: u16) -> () {
        let bpm = bpm.max(1);
        let bpi = bpi.max(1);
        self.bpm = bpm;
        self.bpi = bpi;
        self.frames_per_interval = self.sample_rate as u64 * 60 / bpm as u64 * bpi as u64;
        self.elapsed = 0;
    }

    pub fn bpm(&self) -> u16 {
        self.bpm
    }
    pub fn bpi(&self) -> u16 {
        self.bpi
    }
    pub fn frames_per_interval(&self) -> u64 {
        self.frames_per_interval
    }
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    /// account for one block of `frames`.  When the interval boundary falls
    /// inside the block, return its offset (a boundary exactly at the end of
    /// the block reports offset == frames).  At sane tempos a block is much
    /// shorter than an interval; a server tempo short enough to fit several
    /// intervals in one block still reports a single boundary, the extras
    /// collapse into it.
    pub fn advance(&mut self, frames: usize) -> Option<usize> {
        let before = self.elapsed;
        self.elapsed += frames as u64;
        if self.elapsed < self.frames_per_interval {
            return None;
        }
        // modulo keeps elapsed below one interval, so `before` is always
        // below it too and the offset never wraps or exceeds `frames`
        self.elapsed %= self.frames_per_interval;
        Some((self.frames_per_interval - before) as usize)
    }

    pub fn reset(&mut self) -> () {
        self.elapsed = 0;
    }
}

impl fmt::Display for IntervalClock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ bpm: {}, bpi: {}, fpi: {}, elapsed: {} }}",
            self.bpm, self.bpi, self.frames_per_interval, self.elapsed
        )
    }
}

/// snapshot of a host transport, for drivers embedded in a DAW
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostPosition {
    pub playing: bool,
    pub position_frames: u64,
}

/// watches the host transport and decides when the clock must restart.
/// Stopping playback, starting fresh, or seeking backwards all resync; the
/// clock free runs while the host rolls forward.
pub struct HostTransportTracker {
    last: Option<HostPosition>,
}

impl HostTransportTracker {
    pub fn new() -> HostTransportTracker {
        HostTransportTracker { last: None }
    }

    pub fn update(&mut self, pos: HostPosition, clock: &mut IntervalClock) -> bool {
        let resync = match self.last {
            None => pos.playing,
            Some(prev) => {
                (pos.playing && !prev.playing) || (pos.playing && pos.position_frames < prev.position_frames)
            }
        };
        self.last = Some(pos);
        if resync {
            clock.reset();
        }
        resync
    }
}

#[cfg(test)]
mod test_interval_clock {
    use super::*;

    #[test]
    fn frames_per_interval_math() {
        let mut clock = IntervalClock::new(44100);
        clock.set_tempo(120, 8);
        // 44100 * 60 / 120 * 8
        assert_eq!(clock.frames_per_interval(), 176400);
        clock.set_tempo(90, 16);
        assert_eq!(clock.frames_per_interval(), 44100 * 60 / 90 * 16);
    }
    #[test]
    fn boundary_offset_splits_the_block() {
        let mut clock = IntervalClock::new(48000);
        clock.set_tempo(60, 1);
        // interval is exactly 48000 frames
        for _ in 0..93 {
            assert!(clock.advance(512).is_none());
        }
        // 93 * 512 = 47616, boundary falls 384 frames into the next block
        assert_eq!(clock.advance(512), Some(384));
        assert_eq!(clock.elapsed(), 128);
    }
    #[test]
    fn boundary_at_exact_block_end() {
        let mut clock = IntervalClock::new(51200);
        clock.set_tempo(60, 1);
        for _ in 0..99 {
            assert!(clock.advance(512).is_none());
        }
        assert_eq!(clock.advance(512), Some(512));
        assert_eq!(clock.elapsed(), 0);
    }
    #[test]
    fn no_drift_over_a_thousand_intervals() {
        let mut clock = IntervalClock::new(44100);
        clock.set_tempo(120, 8);
        let fpi = clock.frames_per_interval();
        let block = 512usize;
        let mut boundaries = 0u64;
        let mut frames: u64 = 0;
        let mut last_boundary_frame = 0u64;
        while boundaries < 1000 {
            let start = frames;
            frames += block as u64;
            if let Some(offset) = clock.advance(block) {
                boundaries += 1;
                let boundary_frame = start + offset as u64;
                // every boundary lands exactly one interval after the last
                assert_eq!(boundary_frame - last_boundary_frame, fpi);
                last_boundary_frame = boundary_frame;
            }
        }
        assert_eq!(last_boundary_frame, 1000 * fpi);
    }
    #[test]
    fn tempo_change_restarts_the_interval() {
        let mut clock = IntervalClock::new(44100);
        clock.set_tempo(120, 8);
        clock.advance(100000);
        clock.set_tempo(100, 8);
        assert_eq!(clock.elapsed(), 0);
    }
    #[test]
    fn interval_shorter_than_a_block_never_wraps() {
        let mut clock = IntervalClock::new(44100);
        // wire max tempo, 40 frame interval, far below the block size
        clock.set_tempo(65535, 1);
        let fpi = clock.frames_per_interval();
        assert!(fpi < 512);
        for _ in 0..100 {
            if let Some(offset) = clock.advance(512) {
                assert!(offset <= 512);
            }
            assert!(clock.elapsed() < fpi);
        }
    }
    #[test]
    fn zero_tempo_is_pinned() {
        let mut clock = IntervalClock::new(44100);
        clock.set_tempo(0, 0);
        assert!(clock.frames_per_interval() > 0);
    }
    #[test]
    fn host_rewind_resyncs() {
        let mut clock = IntervalClock::new(44100);
        let mut tracker = HostTransportTracker::new();
        // fresh start resyncs
        assert!(tracker.update(HostPosition { playing: true, position_frames: 0 }, &mut clock));
        clock.advance(1000);
        // rolling forward does not
        assert!(!tracker.update(HostPosition { playing: true, position_frames: 512 }, &mut clock));
        assert_eq!(clock.elapsed(), 1000);
        // seeking backwards does
        assert!(tracker.update(HostPosition { playing: true, position_frames: 0 }, &mut clock));
        assert_eq!(clock.elapsed(), 0);
    }
}
