//! Byte sinks a container writer flushes into.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use media_core::{ErrorKind, MediaError, Result, StatusCode};
use tracing::{debug, trace};

/// Staging-buffer size for custom output, matching the original fixed
/// 1 MiB custom-IO buffer.
pub const CUSTOM_OUTPUT_BUFFER_SIZE: usize = 1_048_510;

/// Seek origin. `Size` does not move the cursor; it asks the sink to report
/// its total size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
    Size,
}

/// A writable byte sink, optionally seekable.
pub trait Output: Write {
    /// Move the cursor (or report the size for [`Whence::Size`]). Returns
    /// the new position. Non-seekable sinks report `BadState`.
    fn seek_to(&mut self, offset: i64, whence: Whence) -> Result<i64> {
        let _ = (offset, whence);
        Err(ErrorKind::BadState.into())
    }

    fn is_seekable(&self) -> bool {
        false
    }
}

/// Direct file/URI target.
pub struct UriOutput {
    path: PathBuf,
    file: BufWriter<File>,
}

impl UriOutput {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .map_err(|e| MediaError::Io(format!("could not open output '{}': {e}", path.display())))?;
        debug!("opened output uri {}", path.display());
        Ok(Self {
            path,
            file: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Write for UriOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Output for UriOutput {
    fn seek_to(&mut self, offset: i64, whence: Whence) -> Result<i64> {
        let pos = match whence {
            Whence::Start => SeekFrom::Start(offset.max(0) as u64),
            Whence::Current => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
            Whence::Size => {
                let here = self.file.stream_position()?;
                let size = self.file.seek(SeekFrom::End(0))?;
                self.file.seek(SeekFrom::Start(here))?;
                return Ok(size as i64);
            }
        };
        Ok(self.file.seek(pos)? as i64)
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// Callback invoked with each chunk of produced bytes. The returned status
/// is used only for diagnostics; it does not abort the write.
pub type WriteCallback = Box<dyn FnMut(&[u8]) -> StatusCode + Send>;

/// Optional seek callback: `(offset, whence)` returning the new position, or
/// a negative value to signal failure.
pub type SeekCallback = Box<dyn FnMut(i64, Whence) -> i64 + Send>;

/// Caller-supplied byte sink.
///
/// Bytes are staged into a buffer owned by this sink and handed to the write
/// callback one chunk at a time. The staging buffer may be reallocated (when
/// a chunk outgrows it) but it is owned here outright, so teardown always
/// releases the live buffer and nothing else.
pub struct CustomOutput {
    buffer: Vec<u8>,
    write_cb: WriteCallback,
    seek_cb: Option<SeekCallback>,
}

impl CustomOutput {
    pub fn new(write_cb: WriteCallback, seek_cb: Option<SeekCallback>) -> Self {
        Self {
            buffer: vec![0u8; CUSTOM_OUTPUT_BUFFER_SIZE],
            write_cb,
            seek_cb,
        }
    }
}

impl Write for CustomOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() > self.buffer.len() {
            self.buffer.resize(buf.len(), 0);
        }
        self.buffer[..buf.len()].copy_from_slice(buf);
        let status = (self.write_cb)(&self.buffer[..buf.len()]);
        trace!(
            bytes = buf.len(),
            status = status.0,
            "delivered chunk to write callback"
        );
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Output for CustomOutput {
    fn seek_to(&mut self, offset: i64, whence: Whence) -> Result<i64> {
        let Some(seek) = self.seek_cb.as_mut() else {
            return Err(ErrorKind::BadState.into());
        };
        let ret = seek(offset, whence);
        debug!(offset, ?whence, result = ret, "seek in custom output");
        if ret < 0 {
            return Err(MediaError::Library(ret as i32));
        }
        Ok(ret)
    }

    fn is_seekable(&self) -> bool {
        self.seek_cb.is_some()
    }
}
