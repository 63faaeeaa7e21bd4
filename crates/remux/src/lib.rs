//! # Remux
//!
//! Packet-copy pipeline stage: takes still-encoded packets from a source and
//! delivers them into a [`mux::Muxer`] without touching the payload.
//!
//! The [`Remuxer`] maps each selected, remuxable input stream to an output
//! stream at setup time, synthesizes wall-clock presentation timestamps for
//! live sources that deliver none, and tolerates a bounded run of consecutive
//! delivery failures before aborting the stream.

pub mod remuxer;

pub use remuxer::{DEFAULT_MAX_REMUX_ERRORS, Remuxer};
