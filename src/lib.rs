// ABOUTME: BSON document decoder for Rust.
// ABOUTME: Decodes length-prefixed binary documents from slices or streams into ordered value trees.

//! # bson_reader
//!
//! A decoder for BSON, the length-prefixed binary document format used by
//! database clients and servers.
//!
//! ## Quick Start
//!
//! ```rust
//! use bson_reader::{decode_document, Value};
//!
//! // {"a": 1, "b": "hé"}
//! let bytes = [
//!     0x17, 0x00, 0x00, 0x00,
//!     0x10, b'a', 0x00, 0x01, 0x00, 0x00, 0x00,
//!     0x02, b'b', 0x00, 0x04, 0x00, 0x00, 0x00, b'h', 0xc3, 0xa9, 0x00,
//!     0x00,
//! ];
//! let doc = decode_document(&bytes).unwrap();
//! assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["a", "b"]);
//! assert_eq!(doc.get("a"), Some(&Value::Int32(1)));
//! assert_eq!(doc.get("b").and_then(Value::as_str), Some("hé"));
//! ```
//!
//! ## Typed Decoding
//!
//! ```rust
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, Debug, PartialEq)]
//! struct Point {
//!     x: i32,
//! }
//!
//! let bytes = [0x0c, 0x00, 0x00, 0x00, 0x10, b'x', 0x00, 0x07, 0x00, 0x00, 0x00, 0x00];
//! let point: Point = bson_reader::from_slice(&bytes).unwrap();
//! assert_eq!(point, Point { x: 7 });
//! ```
//!
//! ## Validation
//!
//! Decoding checks structure only:
//! - Every document's declared length must equal the bytes it occupies
//! - Document terminators must be zero
//! - Code-with-scope values must match their declared total length
//! - Strings must be valid UTF-8
//!
//! Numeric ranges, regex syntax and key uniqueness are not checked. A
//! repeated key replaces the earlier value.
//!
//! ## Streaming
//!
//! Strings are decoded through a fixed-size scratch buffer
//! ([`DecoderConfig::buffer_size`]); the decoded text does not depend on its size.
//! Any error leaves the stream at an unspecified position and the whole
//! payload should be discarded.

pub mod de;
pub mod decoder;
pub mod error;
pub mod source;
mod string;
pub mod types;
pub mod value;

// Re-export commonly used items at the crate root
pub use de::{from_document, from_reader, from_slice};
pub use decoder::{Decoder, DecoderConfig};
pub use error::{Error, Result};
pub use source::{ByteSource, ReaderSource, SliceSource};
pub use types::{binary_subtype, limits, type_code, ObjectId};
pub use value::{Array, Binary, CodeWithScope, Document, Reference, Regex, Value, ValueKind};

use std::io::Read;

/// Decode a BSON document that occupies the whole slice.
///
/// # Errors
///
/// Returns an error if the document is malformed, truncated, uses an
/// unsupported element type, or is followed by trailing bytes.
pub fn decode_document(data: &[u8]) -> Result<Document> {
    Decoder::new().decode_slice(data)
}

/// Decode a BSON document from a slice with custom configuration.
///
/// # Errors
///
/// See [`decode_document`]; limits come from `config`.
pub fn decode_document_with_config(data: &[u8], config: DecoderConfig) -> Result<Document> {
    Decoder::with_config(config).decode_slice(data)
}

/// Read one BSON document from a stream.
///
/// The reader is left positioned after the document on success.
///
/// # Errors
///
/// Returns an error if the document is malformed, the stream ends early, or
/// the reader fails.
pub fn read_document<R: Read>(reader: R) -> Result<Document> {
    Decoder::new().decode_reader(reader)
}
