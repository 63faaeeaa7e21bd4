//! # Pipeline Core
//!
//! The composable packet-processing layer of the muxflow workspace.
//!
//! This crate defines the traits a media pipeline is assembled from
//! ([`MediaProcessor`], [`PacketFilter`], [`StreamSelector`]) together with
//! the [`MediaProcessorChain`] that composes them under a shared
//! setup/first-packet/per-packet lifecycle, the [`PacketSource`] capability
//! exposed by input collaborators, and the real-time pacing engines
//! ([`Synchronizer`] and [`CalibratingThrottle`]).
//!
//! The pipeline is single-threaded by contract: all calls into one chain must
//! originate from the same thread. The only blocking operation is the
//! synchronizer's bounded real-time sleep.

pub mod chain;
pub mod context;
pub mod processor;
pub mod selector;
pub mod source;
pub mod sync;

pub use chain::MediaProcessorChain;
pub use context::{Statistics, StreamerContext};
pub use processor::{FnPacketFilter, MediaProcessor, PacketFilter};
pub use selector::{FirstVideoStreamSelector, FnStreamSelector, StreamSelector};
pub use source::{PacketSource, StreamTable};
pub use sync::{CalibratingThrottle, Synchronizer, ThrottleDecision};
