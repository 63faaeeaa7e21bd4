//! # Mux
//!
//! The container-output state machine of the muxflow workspace.
//!
//! A [`Muxer`] walks the lifecycle
//! `Constructed → Opened → StreamsCreated → Ready → Closed` (with an
//! absorbing `Failed` state reachable from anywhere), declaring output
//! streams, finalizing the container header, and rescaling packet timing
//! into each output stream's time base with a per-stream zero offset.
//!
//! Concrete variants:
//! - [`DefaultMuxer`] writes through a caller-supplied byte sink
//!   ([`CustomOutput`]) or any other [`Output`];
//! - [`UriMuxer`] writes directly to a file/URI target;
//! - [`SegmentedMuxer`] rotates between successive muxers from a supplier,
//!   replaying stream declarations into each new segment and gating rotation
//!   on reference-stream keyframes.
//!
//! The byte-level structure of the container itself is delegated through the
//! [`ContainerWriter`] seam; an FLV backend is bundled.

pub mod container;
pub mod flv;
pub mod mock;
pub mod muxer;
pub mod output;
pub mod segmented;
pub mod timing;

pub use container::ContainerWriter;
pub use flv::FlvWriter;
pub use muxer::{DefaultMuxer, Muxer, MuxerState, UriMuxer};
pub use output::{CustomOutput, Output, UriOutput, Whence};
pub use segmented::{BoundaryPredicate, MuxerSupplier, SegmentedMuxer, duration_boundary};
pub use timing::PacketRescaler;
