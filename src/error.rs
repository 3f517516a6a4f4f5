// ABOUTME: Error types for BSON document decoding.
// ABOUTME: Every failure is fatal to the current decode call; there is no partial recovery.

use std::fmt;

/// The result type for BSON decoding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding a BSON document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A terminator byte was non-zero, or the bytes consumed for a document or
    /// code-with-scope value did not match its declared length.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// The element type tag is not one this decoder understands.
    #[error("unsupported element type: {0}")]
    UnsupportedType(i8),

    /// The source ran out before a declared length or field width was satisfied.
    #[error("unexpected end of stream")]
    TruncatedStream,

    /// String bytes did not form valid UTF-8.
    #[error("invalid UTF-8 sequence in string")]
    InvalidUtf8,

    /// A decoded value cannot be represented (e.g. a timestamp outside the calendar range).
    #[error("value out of range")]
    ValueOutOfRange,

    /// Unconsumed bytes after the root document (slice decoding only).
    #[error("trailing bytes after document")]
    TrailingBytes,

    /// Documents nested deeper than the configured limit.
    #[error("maximum document depth exceeded")]
    MaxDepthExceeded,

    /// A document declared a length above the configured limit.
    #[error("maximum document size exceeded")]
    MaxDocumentSizeExceeded,

    /// Non-EOF I/O error from the underlying reader.
    #[error("I/O error: {0}")]
    Io(String),

    /// Custom error message (for serde integration).
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Returns a stable name for the error kind.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::MalformedDocument(_) => "malformed_document",
            Error::UnsupportedType(_) => "unsupported_type",
            Error::TruncatedStream => "truncated_stream",
            Error::InvalidUtf8 => "invalid_utf8",
            Error::ValueOutOfRange => "value_out_of_range",
            Error::TrailingBytes => "trailing_bytes",
            Error::MaxDepthExceeded => "max_depth_exceeded",
            Error::MaxDocumentSizeExceeded => "max_document_size_exceeded",
            Error::Io(_) => "io_error",
            Error::Custom(_) => "custom",
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedDocument(msg.into())
    }
}

impl serde::de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Custom(msg.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::TruncatedStream
        } else {
            Error::Io(err.to_string())
        }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}
