//! audio driver adapter
//!
//! The engine only consumes this surface: a fixed period callback plus a
//! start/stop lifecycle and a listener for driver events.  Real device
//! backends (jack, alsa, a VST host shim) live outside this crate; the
//! [`NullDriver`] here clocks the callback off a timer thread so the client
//! can run headless and the tests can drive a whole session without hardware.
use log::{debug, error};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thread_priority::{ThreadBuilder, ThreadPriority};

use crate::common::box_error::BoxError;

use super::{samples_buffer::SamplesBuffer, AudioCallback};

/// driver lifecycle notifications
pub trait DriverListener: Send {
    fn driver_started(&mut self) -> () {}
    fn driver_stopped(&mut self) -> () {}
    fn driver_exception(&mut self, _msg: &str) -> () {}
}

/// start/stop surface the session controller drives
///
/// Both operations are synchronous and idempotent.  `start` returns Ok(false)
/// when the device is unavailable so the caller can fall back to the null
/// driver instead of dying.  `stop` does not return while a callback is still
/// in flight.
pub trait AudioDriver: Send {
    fn start(&mut self) -> Result<bool, BoxError>;
    fn stop(&mut self) -> Result<(), BoxError>;
    fn is_running(&self) -> bool;
    fn sample_rate(&self) -> u32;
    fn block_size(&self) -> usize;
}

// what the callback thread hands back when it exits
type DriverParts = (Box<dyn AudioCallback>, Option<Box<dyn DriverListener>>);

pub struct NullDriver {
    sample_rate: u32,
    block_size: usize,
    engine: Option<Box<dyn AudioCallback>>,
    listener: Option<Box<dyn DriverListener>>,
    run_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<DriverParts>>,
}

impl NullDriver {
    pub fn new(
        engine: Box<dyn AudioCallback>,
        listener: Option<Box<dyn DriverListener>>,
        sample_rate: u32,
        block_size: usize,
    ) -> NullDriver {
        NullDriver {
            sample_rate,
            block_size,
            engine: Some(engine),
            listener,
            run_flag: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl AudioDriver for NullDriver {
    fn start(&mut self) -> Result<bool, BoxError> {
        if self.is_running() {
            return Ok(true);
        }
        let mut engine = match self.engine.take() {
            Some(e) => e,
            None => return Ok(false),
        };
        let mut listener = self.listener.take();
        let run_flag = self.run_flag.clone();
        run_flag.store(true, Ordering::SeqCst);
        let block_period =
            Duration::from_micros(self.block_size as u64 * 1_000_000 / self.sample_rate as u64);
        let block_size = self.block_size;

        let builder = ThreadBuilder::default()
            .name("Audio Callback Thread".to_string())
            .priority(ThreadPriority::Max);
        let flag = self.run_flag.clone();
        let handle = builder.spawn(move |_result| {
            if let Some(l) = listener.as_mut() {
                l.driver_started();
            }
            let mut input = SamplesBuffer::with_frames(2, block_size);
            let mut output = SamplesBuffer::with_frames(2, block_size);
            let mut next_tick = Instant::now() + block_period;
            while flag.load(Ordering::SeqCst) {
                if let Err(e) = engine.process_callback(&input, &mut output) {
                    error!("audio callback error: {}", e);
                    if let Some(l) = listener.as_mut() {
                        l.driver_exception(&e.to_string());
                    }
                    break;
                }
                input.zero();
                let now = Instant::now();
                if next_tick > now {
                    std::thread::sleep(next_tick - now);
                }
                next_tick += block_period;
            }
            if let Some(l) = listener.as_mut() {
                l.driver_stopped();
            }
            (engine, listener)
        })?;
        self.handle = Some(handle);
        debug!("null driver started: {} Hz, {} frame blocks", self.sample_rate, self.block_size);
        Ok(true)
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        self.run_flag.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            // join waits out any callback that is mid flight
            match handle.join() {
                Ok((engine, listener)) => {
                    self.engine = Some(engine);
                    self.listener = listener;
                }
                Err(_) => {
                    error!("audio callback thread panicked");
                }
            }
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.handle.is_some() && self.run_flag.load(Ordering::SeqCst)
    }
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    fn block_size(&self) -> usize {
        self.block_size
    }
}
