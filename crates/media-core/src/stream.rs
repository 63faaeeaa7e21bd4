//! Stream and codec descriptions.
//!
//! A [`StreamDescriptor`] is created once per container instance by a
//! "create next stream" operation, is never mutated after the container is
//! marked ready (with the single documented exception of the encoder's
//! extradata swap, see [`Extradata`]), and is destroyed with the container.
//! Indices are stable and never reused within one container instance.

use bytes::Bytes;

use crate::time::TimeBase;

/// The kind of media a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
    Data,
    Unknown,
}

impl MediaKind {
    /// Only video, audio, and subtitle streams are eligible for remuxing.
    pub fn is_remuxable(&self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::Audio | MediaKind::Subtitle)
    }
}

/// Identifies the codec of a stream's payload.
///
/// The set is deliberately small: it names the codecs the bundled container
/// backend and encoder know about, plus `Other` for anything an external
/// backend wants to carry through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    H264,
    H265,
    Aac,
    Mp3,
    RawVideo,
    Other(u32),
    None,
}

impl CodecId {
    /// Whether a decoder for this codec is available. Used by the default
    /// stream-selection policy.
    pub fn is_supported(&self) -> bool {
        !matches!(self, CodecId::None | CodecId::Other(_))
    }
}

/// Out-of-band codec configuration bytes, tagged with their current owner.
///
/// Some codecs place the same configuration on both the stream parameters and
/// the codec context. The tag records who owns the live buffer so teardown
/// can restore the stream's original bytes instead of releasing a buffer it
/// no longer owns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Extradata {
    #[default]
    None,
    /// Configuration owned by the stream itself.
    Stream(Bytes),
    /// A view of the codec context's configuration, installed while an
    /// encoder is alive. Must be restored to the stream's original value
    /// before teardown.
    Codec(Bytes),
}

impl Extradata {
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            Extradata::None => None,
            Extradata::Stream(b) | Extradata::Codec(b) => Some(b),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The opaque codec-parameter blob attached to a stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodecParameters {
    pub codec: CodecId,
    pub kind: MediaKind,
    pub width: i32,
    pub height: i32,
    pub sample_rate: i32,
    pub channels: i32,
    pub bit_rate: i64,
    pub extradata: Extradata,
    /// Container-specific codec tag; container-instance-specific, so it is
    /// translated (or cleared) when parameters cross container boundaries.
    pub codec_tag: Option<u32>,
}

impl Default for CodecId {
    fn default() -> Self {
        CodecId::None
    }
}

impl Default for MediaKind {
    fn default() -> Self {
        MediaKind::Unknown
    }
}

impl CodecParameters {
    pub fn video(codec: CodecId, width: i32, height: i32) -> Self {
        Self {
            codec,
            kind: MediaKind::Video,
            width,
            height,
            ..Default::default()
        }
    }

    pub fn audio(codec: CodecId, sample_rate: i32, channels: i32) -> Self {
        Self {
            codec,
            kind: MediaKind::Audio,
            sample_rate,
            channels,
            ..Default::default()
        }
    }
}

/// One declared output (or described input) stream.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    /// Stable index assigned at creation, never reused within one container.
    pub index: usize,
    pub time_base: TimeBase,
    pub params: CodecParameters,
}

impl StreamDescriptor {
    pub fn kind(&self) -> MediaKind {
        self.params.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remuxable_kinds() {
        assert!(MediaKind::Video.is_remuxable());
        assert!(MediaKind::Audio.is_remuxable());
        assert!(MediaKind::Subtitle.is_remuxable());
        assert!(!MediaKind::Data.is_remuxable());
        assert!(!MediaKind::Unknown.is_remuxable());
    }

    #[test]
    fn extradata_owner_tag() {
        let stream_owned = Extradata::Stream(Bytes::from_static(b"sps"));
        let codec_view = Extradata::Codec(Bytes::from_static(b"sps"));
        assert_eq!(stream_owned.bytes(), codec_view.bytes());
        assert_ne!(stream_owned, codec_view);
    }

    #[test]
    fn supported_codecs() {
        assert!(CodecId::H264.is_supported());
        assert!(!CodecId::None.is_supported());
        assert!(!CodecId::Other(42).is_supported());
    }
}
