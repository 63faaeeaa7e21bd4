//! # Encode
//!
//! The transcode path: raw frames in, encoded packets out, delivered into a
//! [`mux::Muxer`].
//!
//! An [`EncodingContext`] owns one output muxer and any number of
//! [`VideoEncoder`]s. Each encoder drives a codec backend through the
//! [`VideoCodec`] send/receive seam, stamps packets with a frame-counter
//! timestamp (optionally paced in real time by a
//! [`pipeline_core::Synchronizer`]), and forwards them to the shared muxer.
//!
//! Everything is single-threaded by contract except cancellation: a cloneable
//! [`StopHandle`] may be triggered from any thread and is observed at every
//! entry point.

pub mod codec;
pub mod context;
pub mod encoder;
pub mod raster;
pub mod stop;

pub use codec::{EncoderSettings, RawVideoEncoder, ReceiveResult, SendResult, VideoCodec};
pub use context::{EncoderId, EncodingContext};
pub use encoder::VideoEncoder;
pub use raster::{RasterDetails, RasterSource};
pub use stop::StopHandle;
