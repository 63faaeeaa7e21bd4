//! Packet timestamp translation into an output stream's time base.

use media_core::{Packet, StreamDescriptor, TimeBase, rescale_q, rescale_q_rnd};

/// Rescales packet timing into an output stream's time base and subtracts a
/// per-output-stream starting offset captured from the first packet seen on
/// that stream, so every output stream's first emitted timestamp is zero.
///
/// Live and concatenated sources may start at an arbitrary, non-zero, even
/// non-monotonic-across-restarts pts; the captured offset normalizes each
/// container instance back to a zero origin.
#[derive(Debug, Default)]
pub struct PacketRescaler {
    start_offsets: Vec<Option<i64>>,
}

impl PacketRescaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the output-side packet: stream index remapped, pts/dts/duration
    /// rescaled with nearest rounding (unknown timestamps pass through),
    /// start offset subtracted, position hint cleared.
    pub fn rescale(
        &mut self,
        packet: &Packet,
        input_time_base: TimeBase,
        output: &StreamDescriptor,
    ) -> Packet {
        let mut out = packet.clone_for_output();
        out.stream_index = output.index;
        out.pts = rescale_q_rnd(packet.pts, input_time_base, output.time_base);
        out.dts = rescale_q_rnd(packet.dts, input_time_base, output.time_base);
        out.duration = rescale_q(packet.duration, input_time_base, output.time_base);

        if self.start_offsets.len() <= output.index {
            self.start_offsets.resize(output.index + 1, None);
        }
        let offset = match self.start_offsets[output.index] {
            Some(offset) => offset,
            None => {
                let offset = out.pts.or(out.dts).unwrap_or(0);
                self.start_offsets[output.index] = Some(offset);
                offset
            }
        };
        out.pts = out.pts.map(|v| v - offset);
        out.dts = out.dts.map(|v| v - offset);
        out
    }

    /// Forget captured offsets (a new container instance starts from zero
    /// again).
    pub fn reset(&mut self) {
        self.start_offsets.clear();
    }
}
