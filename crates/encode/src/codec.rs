//! The codec backend seam and the bundled raw-video backend.

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};
use media_core::{
    CodecId, CodecParameters, ErrorKind, Extradata, Packet, PixelFormat, RawFrame, Result,
    TimeBase,
};
use tracing::debug;

/// Outcome of handing a frame to the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    Accepted,
    /// The codec's input queue is full; drain pending packets and retry the
    /// same frame. Not an error.
    TryAgain,
}

/// Outcome of asking the codec for a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveResult {
    Packet(Packet),
    /// The codec needs more frames before it can produce output. Not an
    /// error.
    NeedsMoreInput,
    /// The codec has been flushed and everything has been drained. Not an
    /// error.
    EndOfStream,
}

/// Everything an encoder backend is configured with before opening.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub width: i32,
    pub height: i32,
    pub pixel_format: PixelFormat,
    /// Frames per second as a rational.
    pub frame_rate: TimeBase,
    pub bit_rate: i64,
    pub rc_min_bit_rate: i64,
    pub rc_max_bit_rate: i64,
    pub rc_buffer_size: i64,
    /// Codec-specific options, in insertion order.
    pub options: Vec<(String, String)>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            pixel_format: PixelFormat::Bgr24,
            frame_rate: TimeBase::new(30, 1),
            bit_rate: 0,
            rc_min_bit_rate: 0,
            rc_max_bit_rate: 0,
            rc_buffer_size: 0,
            options: Vec::new(),
        }
    }
}

/// One video codec backend.
///
/// The encoder drives this with a send/receive drain loop: frames go in
/// through `send_frame` (which may push back with [`SendResult::TryAgain`]),
/// packets come out through `receive_packet` until it reports
/// [`ReceiveResult::NeedsMoreInput`]. `flush` signals end of input, after
/// which draining continues until [`ReceiveResult::EndOfStream`].
pub trait VideoCodec {
    /// The pixel format the codec would rather consume. Defaults to whatever
    /// the caller asked for.
    fn preferred_format(&self, requested: PixelFormat) -> PixelFormat {
        requested
    }

    /// Open the codec and return the stream parameters it produces,
    /// including any out-of-band configuration bytes.
    fn open(&mut self, settings: &EncoderSettings) -> Result<CodecParameters>;

    fn send_frame(&mut self, frame: &RawFrame) -> Result<SendResult>;

    fn receive_packet(&mut self) -> Result<ReceiveResult>;

    /// Signal end of input.
    fn flush(&mut self) -> Result<()>;
}

/// Pass-through backend: every frame becomes one keyframe packet with the
/// pixel data verbatim. Useful for lossless captures and as the reference
/// backend for the drain-loop contract.
#[derive(Debug, Default)]
pub struct RawVideoEncoder {
    settings: Option<EncoderSettings>,
    pending: VecDeque<Packet>,
    flushed: bool,
}

impl RawVideoEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn config_blob(settings: &EncoderSettings) -> Bytes {
        let mut blob = BytesMut::with_capacity(13);
        blob.put_slice(b"rawv");
        blob.put_i32(settings.width);
        blob.put_i32(settings.height);
        blob.put_u8(match settings.pixel_format {
            PixelFormat::Rgb24 => 0,
            PixelFormat::Bgr24 => 1,
            PixelFormat::Yuv420p => 2,
            PixelFormat::Gray8 => 3,
        });
        blob.freeze()
    }
}

impl VideoCodec for RawVideoEncoder {
    fn open(&mut self, settings: &EncoderSettings) -> Result<CodecParameters> {
        if self.settings.is_some() {
            return Err(ErrorKind::BadState.into());
        }
        if settings.width <= 0 || settings.height <= 0 {
            return Err(ErrorKind::FailedCreateCodecContext.into());
        }
        let mut params =
            CodecParameters::video(CodecId::RawVideo, settings.width, settings.height);
        params.bit_rate = settings.bit_rate;
        params.extradata = Extradata::Stream(Self::config_blob(settings));
        debug!(
            width = settings.width,
            height = settings.height,
            "raw video codec opened"
        );
        self.settings = Some(settings.clone());
        Ok(params)
    }

    fn send_frame(&mut self, frame: &RawFrame) -> Result<SendResult> {
        let Some(settings) = self.settings.as_ref() else {
            return Err(ErrorKind::BadState.into());
        };
        if self.flushed {
            return Err(ErrorKind::BadState.into());
        }
        if frame.width != settings.width || frame.height != settings.height {
            return Err(ErrorKind::StreamChanged.into());
        }
        let mut packet = Packet::new(0, frame.data.clone());
        packet.pts = frame.pts;
        packet.dts = frame.pts;
        packet.keyframe = true;
        self.pending.push_back(packet);
        Ok(SendResult::Accepted)
    }

    fn receive_packet(&mut self) -> Result<ReceiveResult> {
        if let Some(packet) = self.pending.pop_front() {
            return Ok(ReceiveResult::Packet(packet));
        }
        if self.flushed {
            Ok(ReceiveResult::EndOfStream)
        } else {
            Ok(ReceiveResult::NeedsMoreInput)
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.flushed = true;
        Ok(())
    }
}
