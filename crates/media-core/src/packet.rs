//! The still-encoded packet unit.

use bytes::Bytes;

/// One unit of encoded media data plus timing metadata.
///
/// Ordering invariant: within one stream, `dts` must be non-decreasing as
/// delivered to a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub stream_index: usize,
    /// Presentation timestamp in the owning stream's time base; `None` when
    /// the source did not supply one (live feeds).
    pub pts: Option<i64>,
    /// Decode timestamp in the owning stream's time base.
    pub dts: Option<i64>,
    pub duration: i64,
    pub keyframe: bool,
    pub data: Bytes,
    /// Byte position within the source container. Positions are
    /// container-instance-specific, so any clone or rescale resets this to
    /// `None`.
    pub position: Option<u64>,
}

impl Packet {
    pub fn new(stream_index: usize, data: Bytes) -> Self {
        Self {
            stream_index,
            pts: None,
            dts: None,
            duration: 0,
            keyframe: false,
            data,
            position: None,
        }
    }

    /// Copy for delivery into another container: identical payload and
    /// timing, but the position hint is dropped.
    pub fn clone_for_output(&self) -> Packet {
        let mut out = self.clone();
        out.position = None;
        out
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}
