//! # Media Core
//!
//! Leaf data model shared by every crate in the muxflow workspace.
//!
//! This crate defines the rational [`TimeBase`] and its rescaling arithmetic,
//! the still-encoded [`Packet`] unit, stream/codec descriptions, the raw-frame
//! types consumed by the encoder path, and the dual-domain error model
//! ([`MediaError`] with its packed [`StatusCode`] interop form).
//!
//! It has no knowledge of containers, codecs, or pipelines; everything here is
//! plain data plus the invariants the rest of the workspace relies on.

pub mod error;
pub mod frame;
pub mod packet;
pub mod stream;
pub mod time;

pub use error::{ErrorKind, MediaError, StatusCode};
pub use frame::{PixelFormat, RawFrame};
pub use packet::Packet;
pub use stream::{CodecId, CodecParameters, Extradata, MediaKind, StreamDescriptor};
pub use time::{TimeBase, rescale_q, rescale_q_rnd};

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, MediaError>;
