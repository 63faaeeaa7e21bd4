//! The dual-domain error model.
//!
//! Every fallible operation in the workspace returns a [`MediaError`] through
//! `Result`. The error carries one of two domains: a pipeline-specific
//! [`ErrorKind`] from a fixed table, or a passthrough error code from the
//! external media-codec library (a signed 32-bit value, negative = error).
//!
//! [`StatusCode`] is the packed 64-bit interop form used across the foreign
//! boundary: the high 32 bits index the domain table; otherwise the low 32
//! bits are the library code. A value is an error iff the high 32 bits are
//! non-zero or the low 32 bits, read as signed, are negative.

use thiserror::Error;

/// Pipeline-specific error table.
///
/// The discriminants are the indices used by the packed [`StatusCode`]
/// representation and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorKind {
    StreamInUse = 1,
    BadState = 2,
    NoStream = 3,
    NoSupportedCodec = 4,
    FailedCreateCodecContext = 5,
    FailedCreateFrame = 6,
    FailedCreatePacket = 7,
    UnsupportedCodec = 8,
    NoSource = 9,
    AlreadySet = 10,
    NullParameter = 11,
    NoProcessor = 12,
    NoRasterMaker = 13,
    FailedCreateCodec = 14,
    OptionAlreadySet = 15,
    StreamChanged = 16,
    SelectionFailed = 17,
    NoOutput = 18,
    FailedCreateMuxer = 19,
}

const MAX_ERROR_KIND: u32 = ErrorKind::FailedCreateMuxer as u32;

impl ErrorKind {
    /// Human-readable description from the fixed table.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::StreamInUse => "Can't open another stream with the same context",
            ErrorKind::BadState => "Context not in correct state for given operation",
            ErrorKind::NoStream => "Couldn't find a media stream in the given source or stream index not set yet",
            ErrorKind::NoSupportedCodec => "No supported media codecs available for the given source or codec not set",
            ErrorKind::FailedCreateCodecContext => "Failed to create a codec context",
            ErrorKind::FailedCreateFrame => "Failed to create a frame",
            ErrorKind::FailedCreatePacket => "Failed to create a packet",
            ErrorKind::UnsupportedCodec => "Unsupported codec",
            ErrorKind::NoSource => "No source set",
            ErrorKind::AlreadySet => "Resource is already set",
            ErrorKind::NullParameter => "Required parameter was not supplied",
            ErrorKind::NoProcessor => "No processor set or attempt to set a null processor",
            ErrorKind::NoRasterMaker => "No raster maker set",
            ErrorKind::FailedCreateCodec => "Failed to create codec",
            ErrorKind::OptionAlreadySet => "Option already set",
            ErrorKind::StreamChanged => "The underlying stream seems to have changed in some important dimension",
            ErrorKind::SelectionFailed => "The stream selection failed",
            ErrorKind::NoOutput => "No output set or attempt to use a null output",
            ErrorKind::FailedCreateMuxer => "Failed to create a muxer",
        }
    }

    fn from_index(index: u32) -> Option<ErrorKind> {
        use ErrorKind::*;
        Some(match index {
            1 => StreamInUse,
            2 => BadState,
            3 => NoStream,
            4 => NoSupportedCodec,
            5 => FailedCreateCodecContext,
            6 => FailedCreateFrame,
            7 => FailedCreatePacket,
            8 => UnsupportedCodec,
            9 => NoSource,
            10 => AlreadySet,
            11 => NullParameter,
            12 => NoProcessor,
            13 => NoRasterMaker,
            14 => FailedCreateCodec,
            15 => OptionAlreadySet,
            16 => StreamChanged,
            17 => SelectionFailed,
            18 => NoOutput,
            19 => FailedCreateMuxer,
            _ => return None,
        })
    }
}

/// Error type shared by every fallible operation in the workspace.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// A pipeline-specific failure from the fixed domain table.
    #[error("{}", .0.message())]
    Pipeline(ErrorKind),

    /// A verbatim error code from the external media-codec library.
    #[error("media library error {0}")]
    Library(i32),

    /// An I/O failure on an output sink, wrapped so sink errors stay
    /// comparable and cloneable across retries.
    #[error("I/O error: {0}")]
    Io(String),
}

impl MediaError {
    pub fn bad_state() -> Self {
        MediaError::Pipeline(ErrorKind::BadState)
    }
}

impl From<ErrorKind> for MediaError {
    fn from(kind: ErrorKind) -> Self {
        MediaError::Pipeline(kind)
    }
}

impl From<std::io::Error> for MediaError {
    fn from(err: std::io::Error) -> Self {
        MediaError::Io(err.to_string())
    }
}

/// Packed 64-bit status used across the foreign boundary.
///
/// Zero is success. High 32 bits non-zero: the low word indexes the
/// [`ErrorKind`] table. Otherwise the whole value is a signed 32-bit library
/// code (negative = error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u64);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(0);

    pub fn from_result(result: &Result<(), MediaError>) -> StatusCode {
        match result {
            Ok(()) => StatusCode::OK,
            Err(e) => StatusCode::from_error(e),
        }
    }

    pub fn from_error(err: &MediaError) -> StatusCode {
        match err {
            MediaError::Pipeline(kind) => StatusCode(((*kind as u32) as u64) << 32),
            MediaError::Library(code) => StatusCode((*code as u32) as u64),
            // Sink I/O failures cross the boundary as the generic library
            // error (there is no domain slot for arbitrary I/O strings).
            MediaError::Io(_) => StatusCode(((ErrorKind::NoOutput as u32) as u64) << 32),
        }
    }

    pub fn is_error(&self) -> bool {
        let high = (self.0 >> 32) as u32;
        let low = self.0 as u32 as i32;
        high != 0 || low < 0
    }

    /// Decode back into the error it encodes, or `None` for success.
    pub fn decode(&self) -> Option<MediaError> {
        if !self.is_error() {
            return None;
        }
        let high = (self.0 >> 32) as u32;
        if high != 0 {
            return Some(match ErrorKind::from_index(high) {
                Some(kind) => MediaError::Pipeline(kind),
                None => MediaError::Library(high as i32),
            });
        }
        Some(MediaError::Library(self.0 as u32 as i32))
    }

    /// Human-readable message: table lookup for domain codes, formatted
    /// library code otherwise.
    pub fn message(&self) -> String {
        let high = (self.0 >> 32) as u32;
        if high != 0 {
            return match ErrorKind::from_index(high) {
                Some(kind) => kind.message().to_string(),
                None => "unknown error".to_string(),
            };
        }
        if self.is_error() {
            format!("media library error {}", self.0 as u32 as i32)
        } else {
            "OK".to_string()
        }
    }
}
