//! Recording fakes for muxer and container tests.
//!
//! Public so downstream crates can exercise their processors against a muxer
//! without a real container backend.

use std::sync::{Arc, Mutex};

use media_core::{
    CodecParameters, ErrorKind, MediaError, MediaKind, Packet, Result, StreamDescriptor, TimeBase,
};

use crate::container::ContainerWriter;
use crate::muxer::{Muxer, MuxerState};
use crate::timing::PacketRescaler;

/// Everything a [`MockContainerWriter`] observed.
#[derive(Debug, Default)]
pub struct WriterLog {
    pub added: Vec<CodecParameters>,
    pub header_written: bool,
    pub packets: Vec<Packet>,
    pub finished: bool,
    pub finish_calls: usize,
    pub abort_calls: usize,
}

/// Container writer that records every call. All streams get a 1/1000 time
/// base.
pub struct MockContainerWriter {
    log: Arc<Mutex<WriterLog>>,
    pub fail_header: bool,
    pub fail_packets: bool,
}

impl MockContainerWriter {
    pub fn recording() -> (Self, Arc<Mutex<WriterLog>>) {
        let log = Arc::new(Mutex::new(WriterLog::default()));
        (
            Self {
                log: log.clone(),
                fail_header: false,
                fail_packets: false,
            },
            log,
        )
    }
}

impl ContainerWriter for MockContainerWriter {
    fn add_stream(&mut self, params: &CodecParameters) -> Result<TimeBase> {
        self.log.lock().unwrap().added.push(params.clone());
        Ok(TimeBase::MILLIS)
    }

    fn write_header(&mut self, _streams: &[StreamDescriptor]) -> Result<()> {
        if self.fail_header {
            return Err(ErrorKind::NoOutput.into());
        }
        self.log.lock().unwrap().header_written = true;
        Ok(())
    }

    fn write_packet(&mut self, _stream: &StreamDescriptor, packet: &Packet) -> Result<()> {
        if self.fail_packets {
            return Err(MediaError::Library(-5));
        }
        self.log.lock().unwrap().packets.push(packet.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.finished = true;
        log.finish_calls += 1;
        Ok(())
    }

    fn abort(&mut self) {
        self.log.lock().unwrap().abort_calls += 1;
    }
}

/// Everything a [`MockMuxer`] observed.
#[derive(Debug, Default)]
pub struct MuxerLog {
    pub created: Vec<MediaKind>,
    pub readied: bool,
    pub packets: Vec<Packet>,
    pub closed: bool,
    pub failed: bool,
}

/// In-memory muxer with the full lifecycle but no container behind it.
/// Packets are rescaled exactly as a real muxer would before being recorded.
pub struct MockMuxer {
    log: Arc<Mutex<MuxerLog>>,
    streams: Vec<StreamDescriptor>,
    rescaler: PacketRescaler,
    state: MuxerState,
    pub fail_stream_creation: bool,
}

impl MockMuxer {
    pub fn recording() -> (Self, Arc<Mutex<MuxerLog>>) {
        let log = Arc::new(Mutex::new(MuxerLog::default()));
        (
            Self {
                log: log.clone(),
                streams: Vec::new(),
                rescaler: PacketRescaler::new(),
                state: MuxerState::Constructed,
                fail_stream_creation: false,
            },
            log,
        )
    }
}

impl Muxer for MockMuxer {
    fn open(&mut self) -> Result<()> {
        if self.state != MuxerState::Constructed {
            return Err(ErrorKind::BadState.into());
        }
        self.state = MuxerState::Opened;
        Ok(())
    }

    fn create_next_stream(&mut self, params: &CodecParameters) -> Result<usize> {
        if !matches!(self.state, MuxerState::Opened | MuxerState::StreamsCreated) {
            return Err(ErrorKind::BadState.into());
        }
        if self.fail_stream_creation {
            return Err(ErrorKind::FailedCreateMuxer.into());
        }
        let index = self.streams.len();
        self.streams.push(StreamDescriptor {
            index,
            time_base: TimeBase::MILLIS,
            params: params.clone(),
        });
        self.log.lock().unwrap().created.push(params.kind);
        self.state = MuxerState::StreamsCreated;
        Ok(index)
    }

    fn ready(&mut self) -> Result<()> {
        if self.state != MuxerState::StreamsCreated {
            return Err(ErrorKind::BadState.into());
        }
        self.log.lock().unwrap().readied = true;
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
        let Some(stream) = self.streams.get(output_stream_index) else {
            return Err(ErrorKind::NoStream.into());
        };
        let out = self.rescaler.rescale(packet, input_time_base, stream);
        self.log.lock().unwrap().packets.push(out);
        Ok(())
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
        if !self.is_closed() {
            self.log.lock().unwrap().closed = true;
            self.state = MuxerState::Closed;
        }
        Ok(())
    }

    fn fail(&mut self) {
        if !self.is_closed() {
            self.log.lock().unwrap().failed = true;
            self.state = MuxerState::Failed;
        }
    }
}
