//! Segment rotation over a sequence of muxers.

use media_core::{
    CodecParameters, ErrorKind, MediaKind, Packet, Result, StreamDescriptor, TimeBase, rescale_q,
};
use tracing::{debug, error, info, warn};

use crate::muxer::{Muxer, MuxerState};

/// Produces the muxer for segment `n` (zero-based). Each returned muxer must
/// be freshly constructed; the segmented muxer drives its whole lifecycle.
pub type MuxerSupplier = Box<dyn FnMut(u64) -> Result<Box<dyn Muxer>> + Send>;

/// Decides whether a segment boundary is due. Evaluated once per packet on
/// the reference stream only, with the packet's timing still in the given
/// input time base.
pub type BoundaryPredicate = Box<dyn FnMut(&Packet, MediaKind, TimeBase) -> bool + Send>;

/// Boundary predicate that requests a new segment every `millis`
/// milliseconds of reference-stream time.
pub fn duration_boundary(millis: i64) -> BoundaryPredicate {
    let mut next_boundary = millis;
    Box::new(move |packet, _kind, input_time_base| {
        let Some(ts) = packet.pts.or(packet.dts) else {
            return false;
        };
        let ts = rescale_q(ts, input_time_base, TimeBase::MILLIS);
        if ts >= next_boundary {
            next_boundary = ts + millis;
            true
        } else {
            false
        }
    })
}

/// Muxer that rotates between successive delegate muxers at segment
/// boundaries.
///
/// The boundary predicate is consulted only for packets on the reference
/// stream, the first video stream declared; an output with no video stream
/// never rotates. A due boundary sets a pending flag; the actual rotation is
/// deferred until the next reference-stream keyframe, so every segment
/// opens decodable. On rotation the recorded stream declarations are
/// replayed into the fresh delegate and each delegate's own timing offsets
/// make the new segment start at zero.
pub struct SegmentedMuxer {
    supplier: MuxerSupplier,
    boundary: BoundaryPredicate,
    current: Option<Box<dyn Muxer>>,
    segment: u64,
    recreation: Vec<CodecParameters>,
    reference_stream: Option<usize>,
    pending: bool,
    state: MuxerState,
}

impl SegmentedMuxer {
    pub fn new(supplier: MuxerSupplier, boundary: BoundaryPredicate) -> Self {
        Self {
            supplier,
            boundary,
            current: None,
            segment: 0,
            recreation: Vec::new(),
            reference_stream: None,
            pending: false,
            state: MuxerState::Constructed,
        }
    }

    pub fn segment_index(&self) -> u64 {
        self.segment
    }

    fn current_mut(&mut self) -> Result<&mut Box<dyn Muxer>> {
        self.current.as_mut().ok_or(ErrorKind::NoOutput.into())
    }

    fn next_muxer(&mut self, segment: u64) -> Result<Box<dyn Muxer>> {
        let mut muxer = (self.supplier)(segment).map_err(|e| {
            error!(segment, "muxer supplier failed: {e}");
            e
        })?;
        muxer.open()?;
        Ok(muxer)
    }

    /// Close the current segment and stand up the next one, replaying the
    /// recorded stream declarations. Any failure here is fatal to the whole
    /// segmented muxer.
    fn rotate(&mut self) -> Result<()> {
        if let Some(mut old) = self.current.take() {
            old.close()?;
        }
        self.segment += 1;
        info!(segment = self.segment, "starting new segment");

        let mut muxer = self.next_muxer(self.segment)?;
        for (expected, params) in self.recreation.iter().enumerate() {
            let index = muxer.create_next_stream(params)?;
            if index != expected {
                warn!(
                    index,
                    expected, "replayed stream landed on an unexpected index"
                );
            }
            let kind = muxer.stream(index).map(|s| s.kind());
            if kind != Some(params.kind) {
                warn!(
                    index,
                    ?kind,
                    expected = ?params.kind,
                    "replayed stream came back with a different media kind"
                );
            }
        }
        muxer.ready()?;
        self.current = Some(muxer);
        self.pending = false;
        Ok(())
    }
}

impl Muxer for SegmentedMuxer {
    fn open(&mut self) -> Result<()> {
        if self.state != MuxerState::Constructed {
            return Err(ErrorKind::BadState.into());
        }
        let muxer = self.next_muxer(0)?;
        self.current = Some(muxer);
        self.state = MuxerState::Opened;
        Ok(())
    }

    fn create_next_stream(&mut self, params: &CodecParameters) -> Result<usize> {
        if !matches!(self.state, MuxerState::Opened | MuxerState::StreamsCreated) {
            return Err(ErrorKind::BadState.into());
        }
        let kind = params.kind;
        let recreation = params.clone();
        let index = self.current_mut()?.create_next_stream(params)?;
        self.recreation.push(recreation);
        if self.reference_stream.is_none() && kind == MediaKind::Video {
            debug!(index, "reference stream for segment boundaries");
            self.reference_stream = Some(index);
        }
        self.state = MuxerState::StreamsCreated;
        Ok(index)
    }

    fn ready(&mut self) -> Result<()> {
        if self.state != MuxerState::StreamsCreated {
            return Err(ErrorKind::BadState.into());
        }
        if self.reference_stream.is_none() {
            debug!("no video stream declared, segment rotation disabled");
        }
        self.current_mut()?.ready()?;
        self.state = MuxerState::Ready;
        Ok(())
    }

    fn write_packet(
        &mut self,
        packet: &Packet,
        input_time_base: TimeBase,
        output_stream_index: usize,
    ) -> Result<()> {
        if self.state != MuxerState::Ready {
            return Err(ErrorKind::BadState.into());
        }
        if Some(output_stream_index) == self.reference_stream {
            let kind = self
                .recreation
                .get(output_stream_index)
                .map(|p| p.kind)
                .unwrap_or(MediaKind::Unknown);
            if (self.boundary)(packet, kind, input_time_base) {
                self.pending = true;
            }
            // Rotation waits for a keyframe so the new segment can decode
            // from its first packet.
            if self.pending && packet.keyframe {
                if let Err(e) = self.rotate() {
                    self.fail();
                    return Err(e);
                }
            }
        }
        self.current_mut()?
            .write_packet(packet, input_time_base, output_stream_index)
    }

    fn stream(&self, index: usize) -> Option<&StreamDescriptor> {
        self.current.as_ref().and_then(|m| m.stream(index))
    }

    fn stream_mut(&mut self, index: usize) -> Option<&mut StreamDescriptor> {
        self.current.as_mut().and_then(|m| m.stream_mut(index))
    }

    fn num_streams(&self) -> usize {
        self.current.as_ref().map(|m| m.num_streams()).unwrap_or(0)
    }

    fn state(&self) -> MuxerState {
        self.state
    }

    fn close(&mut self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let result = match self.current.as_mut() {
            Some(muxer) => muxer.close(),
            None => Ok(()),
        };
        self.state = MuxerState::Closed;
        result
    }

    fn fail(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Some(muxer) = self.current.as_mut() {
            muxer.fail();
        }
        self.state = MuxerState::Failed;
    }
}
