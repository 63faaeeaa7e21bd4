//! The per-packet processor and filter traits.

use media_core::{MediaKind, Packet, Result};

use crate::source::PacketSource;

/// A stage that consumes admitted packets.
///
/// Processors share a three-phase lifecycle: `setup` once the source's
/// metadata is available, `pre_first_packet` immediately before the first
/// packet is delivered (timers are started here), then `handle_packet` for
/// every admitted packet in delivery order.
pub trait MediaProcessor {
    /// Prepare for the stream. `selected` marks which input stream indices
    /// are eligible for processing; it always has one entry per input stream.
    fn setup(&mut self, source: &dyn PacketSource, selected: &[bool]) -> Result<()>;

    /// Called just before the first packet. Timer initialization goes here.
    fn pre_first_packet(&mut self) -> Result<()> {
        Ok(())
    }

    /// Handle one packet from the source.
    fn handle_packet(&mut self, packet: &Packet, kind: MediaKind) -> Result<()>;

    /// Release resources. Must be idempotent.
    fn close(&mut self) -> Result<()>;
}

/// A per-packet admission gate.
///
/// `false` means "drop, do not forward to processors". Filters in a chain
/// are combined with AND and short-circuit on the first rejection, so order
/// matters only for performance, never for outcome.
pub trait PacketFilter {
    fn setup(&mut self, source: &dyn PacketSource) -> Result<()> {
        let _ = source;
        Ok(())
    }

    fn filter(&mut self, packet: &Packet, kind: MediaKind) -> bool;
}

/// Admit packets through a caller-supplied closure. The closure sees the
/// packet's media kind, stream index, payload size, keyframe flag, and
/// timing, mirroring the shape of the foreign packet-filter callback.
pub struct FnPacketFilter<F>
where
    F: FnMut(&Packet, MediaKind) -> bool,
{
    func: F,
}

impl<F> FnPacketFilter<F>
where
    F: FnMut(&Packet, MediaKind) -> bool,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> PacketFilter for FnPacketFilter<F>
where
    F: FnMut(&Packet, MediaKind) -> bool,
{
    fn filter(&mut self, packet: &Packet, kind: MediaKind) -> bool {
        (self.func)(packet, kind)
    }
}
