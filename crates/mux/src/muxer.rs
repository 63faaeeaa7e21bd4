//! The muxer lifecycle and its direct-output variants.

use std::path::Path;

use media_core::{
    CodecParameters, ErrorKind, Packet, Result, StreamDescriptor, TimeBase,
};
use tracing::{debug, error, trace, warn};

use crate::container::ContainerWriter;
use crate::flv::FlvWriter;
use crate::output::{CustomOutput, SeekCallback, UriOutput, WriteCallback};
use crate::timing::PacketRescaler;

/// Lifecycle state of a muxer.
///
/// `Failed` is absorbing and reachable from every non-terminal state;
/// `close` and `fail` are legal anywhere and idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxerState {
    Constructed,
    Opened,
    StreamsCreated,
    Ready,
    Closed,
    Failed,
}

/// One container output.
///
/// `open` attaches the underlying container writer, `create_next_stream`
/// declares output streams (legal only before `ready`), `ready` finalizes
/// the header, and `write_packet` rescales a packet's timing from the given
/// input time base into the output stream's time base before forwarding.
pub trait Muxer {
    fn open(&mut self) -> Result<()>;

    /// Declare one output stream from codec parameters, preserving or
    /// translating the container-specific tag when available. Returns the
    /// new stream's index; indices are sequential and never reused.
    fn create_next_stream(&mut self, params: &CodecParameters) -> Result<usize>;

    /// Finalize the container header.
    fn ready(&mut self) -> Result<()>;

    /// Rescale `packet`'s timing from `input_time_base` to the output
    /// stream's time base and forward it. Legal only in `Ready`.
    fn write_packet(
        &mut self,
        packet: &Packet,
        input_time_base: TimeBase,
        output_stream_index: usize,
    ) -> Result<()>;

    fn stream(&self, index: usize) -> Option<&StreamDescriptor>;

    fn stream_mut(&mut self, index: usize) -> Option<&mut StreamDescriptor>;

    fn num_streams(&self) -> usize;

    fn state(&self) -> MuxerState;

    /// Flush and finalize. Idempotent; legal from any state.
    fn close(&mut self) -> Result<()>;

    /// Cleanup path invoked when an operation elsewhere failed after this
    /// muxer was partially opened. Idempotent; never writes a trailer and
    /// never double-releases a buffer.
    fn fail(&mut self);

    fn is_closed(&self) -> bool {
        matches!(self.state(), MuxerState::Closed | MuxerState::Failed)
    }
}

/// Muxer over any [`ContainerWriter`].
///
/// This is the one concrete lifecycle implementation; [`UriMuxer`] and the
/// custom-output constructor are configurations of it.
pub struct DefaultMuxer {
    writer: Box<dyn ContainerWriter>,
    streams: Vec<StreamDescriptor>,
    rescaler: PacketRescaler,
    state: MuxerState,
}

impl DefaultMuxer {
    pub fn new(writer: Box<dyn ContainerWriter>) -> Self {
        Self {
            writer,
            streams: Vec::new(),
            rescaler: PacketRescaler::new(),
            state: MuxerState::Constructed,
        }
    }

    /// FLV muxer over a caller-supplied byte sink. The seek callback is
    /// optional; without it the sink is treated as streaming-only.
    pub fn custom_flv(write_cb: WriteCallback, seek_cb: Option<SeekCallback>) -> Self {
        Self::new(Box::new(FlvWriter::new(CustomOutput::new(write_cb, seek_cb))))
    }
}

impl Muxer for DefaultMuxer {
    fn open(&mut self) -> Result<()> {
        if self.state != MuxerState::Constructed {
            error!("open called in {:?}", self.state);
            return Err(ErrorKind::BadState.into());
        }
        self.state = MuxerState::Opened;
        Ok(())
    }

    fn create_next_stream(&mut self, params: &CodecParameters) -> Result<usize> {
        if !matches!(self.state, MuxerState::Opened | MuxerState::StreamsCreated) {
            error!("create_next_stream called in {:?}", self.state);
            return Err(ErrorKind::BadState.into());
        }
        let time_base = self.writer.add_stream(params)?;
        let index = self.streams.len();
        self.streams.push(StreamDescriptor {
            index,
            time_base,
            params: params.clone(),
        });
        self.state = MuxerState::StreamsCreated;
        trace!(index, "created output stream");
        Ok(index)
    }

    fn ready(&mut self) -> Result<()> {
        if self.state != MuxerState::StreamsCreated {
            error!("ready called in {:?}", self.state);
            return Err(ErrorKind::BadState.into());
        }
        if let Err(e) = self.writer.write_header(&self.streams) {
            self.fail();
            return Err(e);
        }
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
            error!("write_packet called in {:?}", self.state);
            return Err(ErrorKind::BadState.into());
        }
        let Some(stream) = self.streams.get(output_stream_index) else {
            error!(
                index = output_stream_index,
                "packet for a stream that doesn't exist"
            );
            return Err(ErrorKind::NoStream.into());
        };
        let out = self.rescaler.rescale(packet, input_time_base, stream);
        self.writer.write_packet(stream, &out)
    }

    fn stream(&self, index: usize) -> Option<&StreamDescriptor> {
        self.streams.get(index)
    }

    fn stream_mut(&mut self, index: usize) -> Option<&mut StreamDescriptor> {
        self.streams.get_mut(index)
    }

    fn num_streams(&self) -> usize {
        self.streams.len()
    }

    fn state(&self) -> MuxerState {
        self.state
    }

    fn close(&mut self) -> Result<()> {
        match self.state {
            MuxerState::Closed | MuxerState::Failed => Ok(()),
            MuxerState::Ready => {
                // trailer must reach the sink before the sink is released
                let result = self.writer.finish();
                self.state = MuxerState::Closed;
                debug!("muxer closed");
                result
            }
            _ => {
                self.writer.abort();
                self.state = MuxerState::Closed;
                Ok(())
            }
        }
    }

    fn fail(&mut self) {
        if matches!(self.state, MuxerState::Closed | MuxerState::Failed) {
            return;
        }
        warn!("muxer entering failed state, discarding output");
        self.writer.abort();
        self.state = MuxerState::Failed;
    }
}

impl Drop for DefaultMuxer {
    fn drop(&mut self) {
        if !self.is_closed() {
            error!("muxer dropped prior to closing");
        }
    }
}

/// Muxer writing its container directly against a URI/file target.
pub struct UriMuxer {
    inner: DefaultMuxer,
}

impl UriMuxer {
    /// FLV output at `path`. The file is created immediately; the muxer
    /// itself still starts in `Constructed` and must be driven through
    /// `open`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let output = UriOutput::create(path)?;
        Ok(Self {
            inner: DefaultMuxer::new(Box::new(FlvWriter::new(output))),
        })
    }
}

impl Muxer for UriMuxer {
    fn open(&mut self) -> Result<()> {
        self.inner.open()
    }

    fn create_next_stream(&mut self, params: &CodecParameters) -> Result<usize> {
        self.inner.create_next_stream(params)
    }

    fn ready(&mut self) -> Result<()> {
        self.inner.ready()
    }

    fn write_packet(
        &mut self,
        packet: &Packet,
        input_time_base: TimeBase,
        output_stream_index: usize,
    ) -> Result<()> {
        self.inner
            .write_packet(packet, input_time_base, output_stream_index)
    }

    fn stream(&self, index: usize) -> Option<&StreamDescriptor> {
        self.inner.stream(index)
    }

    fn stream_mut(&mut self, index: usize) -> Option<&mut StreamDescriptor> {
        self.inner.stream_mut(index)
    }

    fn num_streams(&self) -> usize {
        self.inner.num_streams()
    }

    fn state(&self) -> MuxerState {
        self.inner.state()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn fail(&mut self) {
        self.inner.fail()
    }
}
