//! Bundled FLV container backend.
//!
//! FLV carries at most one video and one audio stream; the bundled writer
//! accepts H.264 video and AAC audio, both on a fixed 1/1000 time base (FLV
//! tag timestamps are milliseconds). Sequence-header tags are emitted from
//! the streams' extradata when the header is written.

use byteorder::{BigEndian, WriteBytesExt};
use media_core::{
    CodecId, CodecParameters, ErrorKind, MediaKind, Packet, Result, StreamDescriptor, TimeBase,
};
use tracing::{debug, trace, warn};

use crate::container::ContainerWriter;
use crate::output::Output;

const TAG_AUDIO: u8 = 8;
const TAG_VIDEO: u8 = 9;
const TAG_HEADER_LEN: u32 = 11;

/// FLV codec tags as carried in the tag header nibbles.
const FLV_VIDEO_CODEC_AVC: u32 = 7;
const FLV_AUDIO_CODEC_AAC: u32 = 10;

/// Writes one FLV file/stream through any [`Output`].
pub struct FlvWriter<O: Output> {
    output: O,
    video: Option<usize>,
    audio: Option<usize>,
    header_written: bool,
    finished: bool,
}

impl<O: Output> FlvWriter<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            video: None,
            audio: None,
            header_written: false,
            finished: false,
        }
    }

    fn write_tag(&mut self, tag_type: u8, timestamp: i64, body: &[u8]) -> Result<()> {
        // The tag DataSize field is 24 bits; a body that does not fit cannot
        // be carried in FLV at all.
        if body.len() > 0x00FF_FFFF {
            warn!(bytes = body.len(), "tag body exceeds the FLV size field");
            return Err(ErrorKind::UnsupportedCodec.into());
        }
        // FLV timestamps are 24 bits plus an extension byte.
        let ts = timestamp.clamp(0, 0x7FFF_FFFF) as u32;
        self.output.write_u8(tag_type)?;
        self.output.write_u24::<BigEndian>(body.len() as u32)?;
        self.output.write_u24::<BigEndian>(ts & 0x00FF_FFFF)?;
        self.output.write_u8((ts >> 24) as u8)?;
        self.output.write_u24::<BigEndian>(0)?; // stream id
        self.output.write_all(body)?;
        self.output
            .write_u32::<BigEndian>(TAG_HEADER_LEN + body.len() as u32)?;
        Ok(())
    }

    fn video_body(packet: &Packet) -> Vec<u8> {
        let frame_type: u8 = if packet.keyframe { 1 } else { 2 };
        let mut body = Vec::with_capacity(5 + packet.data.len());
        body.push(frame_type << 4 | FLV_VIDEO_CODEC_AVC as u8);
        body.push(1); // AVCPacketType: NALU
        let cts = match (packet.pts, packet.dts) {
            (Some(pts), Some(dts)) => (pts - dts).clamp(-0x0080_0000, 0x007F_FFFF) as i32,
            _ => 0,
        };
        body.extend_from_slice(&cts.to_be_bytes()[1..]);
        body.extend_from_slice(&packet.data);
        body
    }

    fn audio_body(packet: &Packet) -> Vec<u8> {
        let mut body = Vec::with_capacity(2 + packet.data.len());
        // AAC, 44kHz flag, 16-bit, stereo flag: the AudioSpecificConfig in
        // the sequence header carries the real rate and channel layout.
        body.push((FLV_AUDIO_CODEC_AAC as u8) << 4 | 0x0F);
        body.push(1); // AACPacketType: raw
        body.extend_from_slice(&packet.data);
        body
    }
}

impl<O: Output> ContainerWriter for FlvWriter<O> {
    fn add_stream(&mut self, params: &CodecParameters) -> Result<TimeBase> {
        if self.header_written {
            return Err(ErrorKind::BadState.into());
        }
        let next_index = self.video.iter().chain(self.audio.iter()).count();
        match params.kind {
            MediaKind::Video => {
                if params.codec != CodecId::H264 {
                    warn!(codec = ?params.codec, "flv video must be H.264");
                    return Err(ErrorKind::UnsupportedCodec.into());
                }
                if self.video.is_some() {
                    return Err(ErrorKind::AlreadySet.into());
                }
                self.video = Some(next_index);
            }
            MediaKind::Audio => {
                if params.codec != CodecId::Aac {
                    warn!(codec = ?params.codec, "flv audio must be AAC");
                    return Err(ErrorKind::UnsupportedCodec.into());
                }
                if self.audio.is_some() {
                    return Err(ErrorKind::AlreadySet.into());
                }
                self.audio = Some(next_index);
            }
            _ => {
                warn!(kind = ?params.kind, "flv cannot carry this stream kind");
                return Err(ErrorKind::UnsupportedCodec.into());
            }
        }
        Ok(TimeBase::MILLIS)
    }

    fn write_header(&mut self, streams: &[StreamDescriptor]) -> Result<()> {
        if self.header_written {
            return Err(ErrorKind::BadState.into());
        }
        self.output.write_all(b"FLV")?;
        self.output.write_u8(1)?;
        let mut flags = 0u8;
        if self.audio.is_some() {
            flags |= 0x04;
        }
        if self.video.is_some() {
            flags |= 0x01;
        }
        self.output.write_u8(flags)?;
        self.output.write_u32::<BigEndian>(9)?; // data offset
        self.output.write_u32::<BigEndian>(0)?; // PreviousTagSize0

        // Sequence-header tags from extradata, before any payload tag.
        for stream in streams {
            let Some(config) = stream.params.extradata.bytes().cloned() else {
                continue;
            };
            match stream.kind() {
                MediaKind::Video => {
                    let mut body = Vec::with_capacity(5 + config.len());
                    body.push(1 << 4 | FLV_VIDEO_CODEC_AVC as u8);
                    body.push(0); // AVCPacketType: sequence header
                    body.extend_from_slice(&[0, 0, 0]); // cts
                    body.extend_from_slice(&config);
                    self.write_tag(TAG_VIDEO, 0, &body)?;
                }
                MediaKind::Audio => {
                    let mut body = Vec::with_capacity(2 + config.len());
                    body.push((FLV_AUDIO_CODEC_AAC as u8) << 4 | 0x0F);
                    body.push(0); // AACPacketType: sequence header
                    body.extend_from_slice(&config);
                    self.write_tag(TAG_AUDIO, 0, &body)?;
                }
                _ => {}
            }
        }

        self.header_written = true;
        debug!(streams = streams.len(), "flv header written");
        Ok(())
    }

    fn write_packet(&mut self, stream: &StreamDescriptor, packet: &Packet) -> Result<()> {
        if !self.header_written || self.finished {
            return Err(ErrorKind::BadState.into());
        }
        let timestamp = packet.dts.or(packet.pts).unwrap_or(0);
        let (tag_type, body) = match stream.kind() {
            MediaKind::Video if self.video == Some(stream.index) => {
                (TAG_VIDEO, Self::video_body(packet))
            }
            MediaKind::Audio if self.audio == Some(stream.index) => {
                (TAG_AUDIO, Self::audio_body(packet))
            }
            _ => return Err(ErrorKind::NoStream.into()),
        };
        trace!(
            tag_type,
            timestamp,
            bytes = packet.data.len(),
            "flv tag written"
        );
        self.write_tag(tag_type, timestamp, &body)
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        // FLV has no trailer; flushing the sink completes the file.
        self.output.flush()?;
        self.finished = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.finished = true;
    }
}
