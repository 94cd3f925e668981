//! Client core for real time collaborative jamming over the NINJAM
//! protocol.
//!
//! The crate splits along the two threads a running client has.  The
//! [`audio`] module is everything the real time callback touches: the
//! sample buffer, the node graph with local input and remote playback
//! tracks, plugin hosting and the driver surface.  The [`ninjam`] module is
//! the protocol side: the wire codec for both message directions, interval
//! upload and download, the sample accurate interval clock and the session
//! controller that runs the whole handshake.  The two sides only ever talk
//! through bounded channels, the callback never blocks on the network.
//!
//! [`common`] and [`dsp`] carry the shared plumbing: error type, config
//! file access, timing stats and the little filters behind the meters.

pub mod audio;
pub mod common;
pub mod dsp;
pub mod ninjam;
pub mod utils;
