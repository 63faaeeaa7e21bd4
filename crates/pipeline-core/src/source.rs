//! The capability a packet source exposes to the pipeline.

use media_core::{Result, StreamDescriptor};

/// Read-only view of an input's stream table, available once the source's
/// metadata has been probed.
///
/// This is the only thing the core knows about its input collaborator; how
/// packets are actually demuxed is someone else's business.
pub trait PacketSource {
    fn num_streams(&self) -> usize;

    fn stream(&self, index: usize) -> Option<&StreamDescriptor>;

    /// The container-specific codec tag for a stream, when the source
    /// container defines one. Tags are container-instance-specific and must
    /// be translated rather than copied blindly.
    fn codec_tag(&self, index: usize) -> Option<u32> {
        self.stream(index).and_then(|s| s.params.codec_tag)
    }

    fn streams(&self) -> Vec<&StreamDescriptor> {
        (0..self.num_streams()).filter_map(|i| self.stream(i)).collect()
    }
}

/// A plain in-memory stream table. Useful as a source description for tests
/// and for sources probed ahead of time.
#[derive(Debug, Default, Clone)]
pub struct StreamTable {
    streams: Vec<StreamDescriptor>,
}

impl StreamTable {
    pub fn new(streams: Vec<StreamDescriptor>) -> Self {
        Self { streams }
    }

    pub fn push(&mut self, stream: StreamDescriptor) -> Result<()> {
        self.streams.push(stream);
        Ok(())
    }
}

impl PacketSource for StreamTable {
    fn num_streams(&self) -> usize {
        self.streams.len()
    }

    fn stream(&self, index: usize) -> Option<&StreamDescriptor> {
        self.streams.get(index)
    }
}
