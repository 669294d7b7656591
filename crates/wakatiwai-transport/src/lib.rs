//! Readiness-aware inbound byte streams.
//!
//! The bridge talks to its peer process over standard input/output and must
//! never block longer than its response timeout while waiting for a reply.
//! This crate provides the [`InboundStream`] abstraction (a `Read` that can
//! wait for readability with a timeout) and [`PollStream`], the `poll(2)`
//! backed implementation used for stdin and Unix socket pairs.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod poll;

pub use error::{Result, TransportError};
pub use traits::InboundStream;

#[cfg(unix)]
pub use poll::PollStream;
