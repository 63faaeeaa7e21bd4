//! The seam between the muxer lifecycle and a concrete container format.

use media_core::{CodecParameters, Packet, Result, StreamDescriptor, TimeBase};

/// Writes one container instance.
///
/// The muxer drives this in lifecycle order: zero or more `add_stream`
/// calls, one `write_header`, any number of `write_packet` calls with
/// timestamps already in the stream's own time base, then exactly one
/// `finish` (or `abort` on the failure path).
pub trait ContainerWriter {
    /// Declare the next stream and return the time base its timestamps will
    /// use. The container may refuse parameters it cannot carry.
    fn add_stream(&mut self, params: &CodecParameters) -> Result<TimeBase>;

    /// Finalize the stream table and emit the container header.
    fn write_header(&mut self, streams: &[StreamDescriptor]) -> Result<()>;

    /// Write one packet whose timing is in `stream`'s time base.
    fn write_packet(&mut self, stream: &StreamDescriptor, packet: &Packet) -> Result<()>;

    /// Flush the trailer and then the underlying byte sink, in that order.
    fn finish(&mut self) -> Result<()>;

    /// Release resources after a failure elsewhere. No trailer is written.
    /// Must be idempotent.
    fn abort(&mut self) {}
}
