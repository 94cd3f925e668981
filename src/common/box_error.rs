//! boxed error type used throughout the crate
//!
//! The Send + Sync bounds are what let error values cross the thread
//! boundaries between the network loop and the audio driver thread.
pub type BoxError = std::boxed::Box<
    dyn std::error::Error // must implement Error to satisfy ?
        + std::marker::Send // needed for threads
        + std::marker::Sync, // needed for threads
>;
