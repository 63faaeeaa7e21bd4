//! Stream-subset selection.
//!
//! A selector runs once, after the source's metadata is available, and
//! decides which stream indices are eligible for any further processing.

use media_core::{ErrorKind, MediaKind, Result};
use tracing::debug;

use crate::source::PacketSource;

/// Chooses the subset of input streams the pipeline will process.
pub trait StreamSelector {
    /// Return one entry per input stream; `true` marks the stream eligible.
    /// Must return an error if no decision can be made.
    fn select(&mut self, source: &dyn PacketSource) -> Result<Vec<bool>>;
}

/// Default policy: select exactly the first video stream whose codec is
/// supported.
#[derive(Debug, Default)]
pub struct FirstVideoStreamSelector;

impl StreamSelector for FirstVideoStreamSelector {
    fn select(&mut self, source: &dyn PacketSource) -> Result<Vec<bool>> {
        let count = source.num_streams();
        if count == 0 {
            return Err(ErrorKind::NoStream.into());
        }

        let mut video_stream_index = None;
        let mut saw_unsupported_video = false;
        for i in 0..count {
            let Some(stream) = source.stream(i) else {
                continue;
            };
            if stream.kind() != MediaKind::Video {
                continue;
            }
            if !stream.params.codec.is_supported() {
                saw_unsupported_video = true;
                continue;
            }
            debug!(
                index = i,
                codec = ?stream.params.codec,
                width = stream.params.width,
                height = stream.params.height,
                "selected first supported video stream"
            );
            video_stream_index = Some(i);
            break;
        }

        let Some(chosen) = video_stream_index else {
            return Err(if saw_unsupported_video {
                ErrorKind::NoSupportedCodec.into()
            } else {
                ErrorKind::NoStream.into()
            });
        };

        Ok((0..count).map(|i| i == chosen).collect())
    }
}

/// Selection through a caller-supplied closure. The closure receives the
/// pre-filled "all selected" vector and mutates it in place; returning
/// `false` rejects the selection and fails pipeline setup.
pub struct FnStreamSelector<F>
where
    F: FnMut(&dyn PacketSource, &mut [bool]) -> bool,
{
    func: F,
}

impl<F> FnStreamSelector<F>
where
    F: FnMut(&dyn PacketSource, &mut [bool]) -> bool,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> StreamSelector for FnStreamSelector<F>
where
    F: FnMut(&dyn PacketSource, &mut [bool]) -> bool,
{
    fn select(&mut self, source: &dyn PacketSource) -> Result<Vec<bool>> {
        let mut selections = vec![true; source.num_streams()];
        if !(self.func)(source, &mut selections) {
            return Err(ErrorKind::SelectionFailed.into());
        }
        Ok(selections)
    }
}
