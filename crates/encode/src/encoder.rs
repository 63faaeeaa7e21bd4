//! The per-encoder state machine.

use media_core::{ErrorKind, Extradata, PixelFormat, RawFrame, Result, TimeBase, rescale_q};
use mux::Muxer;
use pipeline_core::{Synchronizer, ThrottleDecision};
use tracing::{debug, trace, warn};

use crate::codec::{EncoderSettings, ReceiveResult, SendResult, VideoCodec};
use crate::raster::RasterDetails;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderState {
    Fresh,
    Enabled,
    Encoding,
    Stopped,
}

/// Requested output sizing, resolved against the source dimensions at enable
/// time.
#[derive(Debug, Clone, Copy, Default)]
struct DimensionPolicy {
    requested: Option<(i32, i32)>,
    preserve_aspect: bool,
    only_scale_down: bool,
}

fn resolve_dimensions(source_width: i32, source_height: i32, policy: DimensionPolicy) -> (i32, i32) {
    let Some((max_width, max_height)) = policy.requested else {
        return (source_width, source_height);
    };
    if !policy.preserve_aspect {
        return (max_width, max_height);
    }
    let scale = f64::min(
        max_width as f64 / source_width as f64,
        max_height as f64 / source_height as f64,
    );
    let scale = if policy.only_scale_down {
        scale.min(1.0)
    } else {
        scale
    };
    // codecs want even dimensions
    let width = ((source_width as f64 * scale).round() as i32).max(2) & !1;
    let height = ((source_height as f64 * scale).round() as i32).max(2) & !1;
    (width, height)
}

/// Drives one codec backend and forwards its packets to the context's muxer.
///
/// Lifecycle: `Fresh` (configuration setters legal) -> `Enabled` (codec open,
/// output stream created, extradata swapped in) -> `Encoding` (first frame
/// seen) -> `Stopped`. Configuration after enabling is a `BadState` error.
pub struct VideoEncoder {
    codec: Box<dyn VideoCodec>,
    state: EncoderState,
    settings: EncoderSettings,
    dimensions: DimensionPolicy,
    sync: Option<Synchronizer>,
    output_stream: Option<usize>,
    time_base: TimeBase,
    saved_extradata: Option<Extradata>,
    frame_count: i64,
}

impl VideoEncoder {
    pub(crate) fn new(codec: Box<dyn VideoCodec>) -> Self {
        Self {
            codec,
            state: EncoderState::Fresh,
            settings: EncoderSettings::default(),
            dimensions: DimensionPolicy::default(),
            sync: None,
            output_stream: None,
            time_base: TimeBase::MILLIS,
            saved_extradata: None,
            frame_count: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.state, EncoderState::Fresh)
    }

    pub fn output_stream_index(&self) -> Option<usize> {
        self.output_stream
    }

    fn configurable(&self) -> Result<()> {
        if self.state != EncoderState::Fresh {
            return Err(ErrorKind::BadState.into());
        }
        Ok(())
    }

    /// Frame rate as a rational, e.g. 30000/1001. Default 30/1.
    pub fn set_frame_rate(&mut self, num: i32, den: i32) -> Result<()> {
        self.configurable()?;
        self.settings.frame_rate = TimeBase::new(num, den);
        Ok(())
    }

    pub fn set_fps(&mut self, fps: i32) -> Result<()> {
        self.set_frame_rate(fps, 1)
    }

    pub fn set_bit_rate(&mut self, bit_rate: i64) -> Result<()> {
        self.configurable()?;
        self.settings.bit_rate = bit_rate;
        Ok(())
    }

    pub fn set_rc_bit_rate(&mut self, min: i64, max: i64) -> Result<()> {
        self.configurable()?;
        self.settings.rc_min_bit_rate = min;
        self.settings.rc_max_bit_rate = max;
        Ok(())
    }

    pub fn set_rc_buffer_size(&mut self, size: i64) -> Result<()> {
        self.configurable()?;
        self.settings.rc_buffer_size = size;
        Ok(())
    }

    /// Caller's three-channel interpretation when the raster cannot tell.
    pub fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()> {
        self.configurable()?;
        self.settings.pixel_format = format;
        Ok(())
    }

    /// Bound the output size. With `preserve_aspect` the source aspect ratio
    /// is kept within the given bounds; with `only_scale_down` a source
    /// already inside the bounds is left alone.
    pub fn set_output_dimensions(
        &mut self,
        width: i32,
        height: i32,
        preserve_aspect: bool,
        only_scale_down: bool,
    ) -> Result<()> {
        self.configurable()?;
        self.dimensions = DimensionPolicy {
            requested: Some((width, height)),
            preserve_aspect,
            only_scale_down,
        };
        Ok(())
    }

    /// Codec-specific option. Setting the same key twice is an error.
    pub fn set_codec_option(&mut self, name: &str, value: &str) -> Result<()> {
        self.configurable()?;
        if self.settings.options.iter().any(|(n, _)| n == name) {
            warn!(name, "codec option set twice");
            return Err(ErrorKind::OptionAlreadySet.into());
        }
        self.settings
            .options
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// Pace encoding against the wall clock. Frames arriving faster than the
    /// frame rate block; frames arriving too late are dropped.
    pub fn streaming(&mut self) -> Result<()> {
        self.configurable()?;
        self.sync = Some(Synchronizer::default());
        Ok(())
    }

    /// Open the codec with the resolved dimensions, create the output stream,
    /// and install the codec's configuration bytes on it, saving the stream's
    /// own for restoration at stop.
    pub(crate) fn enable(
        &mut self,
        muxer: &mut dyn Muxer,
        source_width: i32,
        source_height: i32,
    ) -> Result<()> {
        if self.state != EncoderState::Fresh {
            return Err(ErrorKind::BadState.into());
        }
        let (width, height) = resolve_dimensions(source_width, source_height, self.dimensions);
        self.settings.width = width;
        self.settings.height = height;
        self.settings.pixel_format = self.codec.preferred_format(self.settings.pixel_format);

        let params = self.codec.open(&self.settings)?;
        let codec_config = params.extradata.bytes().cloned();
        let index = muxer.create_next_stream(&params)?;
        let stream = muxer.stream_mut(index).ok_or(ErrorKind::NoStream)?;
        self.time_base = stream.time_base;

        // The codec and the stream share the same configuration bytes. Tag
        // the stream's copy as codec-owned and keep the original so stop()
        // can put it back before the stream outlives the codec.
        if let Some(config) = codec_config {
            self.saved_extradata = Some(std::mem::replace(
                &mut stream.params.extradata,
                Extradata::Codec(config),
            ));
        }

        self.output_stream = Some(index);
        self.state = EncoderState::Enabled;
        debug!(width, height, stream = index, "video encoder enabled");
        Ok(())
    }

    /// Encode one frame's pixels and forward whatever packets the codec
    /// produces.
    pub(crate) fn encode(&mut self, muxer: &mut dyn Muxer, details: &RasterDetails) -> Result<()> {
        match self.state {
            EncoderState::Enabled => {
                if let Some(sync) = self.sync.as_mut() {
                    sync.start();
                }
                self.state = EncoderState::Encoding;
            }
            EncoderState::Encoding => {}
            _ => return Err(ErrorKind::BadState.into()),
        }

        let pts = self.next_pts();

        let mut frame = RawFrame::packed(
            details.format,
            details.width,
            details.height,
            details.data.clone(),
        );
        frame.stride = details.stride;
        frame.pts = Some(pts);

        loop {
            match self.codec.send_frame(&frame)? {
                SendResult::Accepted => break,
                // input queue full: make room, then retry the same frame
                SendResult::TryAgain => self.drain(muxer)?,
            }
        }
        self.drain(muxer)
    }

    /// Timestamp of the next frame from the running frame counter. In
    /// streaming mode, counter slots whose wall-clock time has already passed
    /// are skipped so the frame lands on the next on-time slot.
    fn next_pts(&mut self) -> i64 {
        // one frame is frame_rate.den/frame_rate.num seconds, i.e. one tick
        // of the inverted frame rate
        let frame_ticks = self.settings.frame_rate.invert();
        loop {
            let pts = rescale_q(self.frame_count, frame_ticks, self.time_base);
            self.frame_count += 1;
            let Some(sync) = self.sync.as_mut() else {
                return pts;
            };
            match sync.throttle(pts, self.time_base) {
                ThrottleDecision::Keep => return pts,
                ThrottleDecision::Drop => trace!(pts, "frame slot already passed"),
            }
        }
    }

    fn drain(&mut self, muxer: &mut dyn Muxer) -> Result<()> {
        let index = self.output_stream.ok_or(ErrorKind::NoStream)?;
        loop {
            match self.codec.receive_packet()? {
                ReceiveResult::Packet(mut packet) => {
                    packet.stream_index = index;
                    muxer.write_packet(&packet, self.time_base, index)?;
                }
                ReceiveResult::NeedsMoreInput | ReceiveResult::EndOfStream => return Ok(()),
            }
        }
    }

    /// Flush the codec, deliver the tail packets, and restore the stream's
    /// original configuration bytes. Idempotent.
    pub(crate) fn stop(&mut self, muxer: &mut dyn Muxer) -> Result<()> {
        match self.state {
            EncoderState::Stopped => return Ok(()),
            EncoderState::Fresh => {
                self.state = EncoderState::Stopped;
                return Ok(());
            }
            _ => {}
        }
        self.state = EncoderState::Stopped;

        self.codec.flush()?;
        self.drain(muxer)?;

        if let Some(original) = self.saved_extradata.take() {
            if let Some(index) = self.output_stream {
                if let Some(stream) = muxer.stream_mut(index) {
                    stream.params.extradata = original;
                }
            }
        }
        debug!(frames = self.frame_count, "video encoder stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_default_to_source() {
        assert_eq!(
            resolve_dimensions(1280, 720, DimensionPolicy::default()),
            (1280, 720)
        );
    }

    #[test]
    fn explicit_dimensions_without_aspect_are_taken_verbatim() {
        let policy = DimensionPolicy {
            requested: Some((640, 640)),
            preserve_aspect: false,
            only_scale_down: false,
        };
        assert_eq!(resolve_dimensions(1280, 720, policy), (640, 640));
    }

    #[test]
    fn aspect_is_preserved_within_bounds() {
        let policy = DimensionPolicy {
            requested: Some((640, 640)),
            preserve_aspect: true,
            only_scale_down: false,
        };
        // 1280x720 scaled by 0.5 fits 640x640
        assert_eq!(resolve_dimensions(1280, 720, policy), (640, 360));
    }

    #[test]
    fn only_scale_down_never_enlarges() {
        let policy = DimensionPolicy {
            requested: Some((1920, 1080)),
            preserve_aspect: true,
            only_scale_down: true,
        };
        assert_eq!(resolve_dimensions(640, 360, policy), (640, 360));
    }

    #[test]
    fn upscale_is_allowed_when_not_restricted() {
        let policy = DimensionPolicy {
            requested: Some((1920, 1080)),
            preserve_aspect: true,
            only_scale_down: false,
        };
        assert_eq!(resolve_dimensions(640, 360, policy), (1920, 1080));
    }

    #[test]
    fn resolved_dimensions_are_even() {
        let policy = DimensionPolicy {
            requested: Some((641, 481)),
            preserve_aspect: true,
            only_scale_down: false,
        };
        let (w, h) = resolve_dimensions(1280, 720, policy);
        assert_eq!(w % 2, 0);
        assert_eq!(h % 2, 0);
    }
}
