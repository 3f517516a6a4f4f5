// ABOUTME: Defines BSON element type tags, binary subtypes, limits, and the ObjectId type.
// ABOUTME: Tags are kept in signed-byte form, matching how they are read off the wire.

use std::fmt;

/// Element type tags.
///
/// Tags are stored as `i8`: MinKey is 0xff on the wire, which reads back as -1.
pub mod type_code {
    pub const DOUBLE: i8 = 0x01;
    pub const STRING: i8 = 0x02;
    pub const DOCUMENT: i8 = 0x03;
    pub const ARRAY: i8 = 0x04;
    pub const BINARY: i8 = 0x05;
    pub const UNDEFINED: i8 = 0x06;
    pub const OBJECT_ID: i8 = 0x07;
    pub const BOOLEAN: i8 = 0x08;
    pub const TIMESTAMP: i8 = 0x09;
    pub const NULL: i8 = 0x0a;
    pub const REGEX: i8 = 0x0b;
    pub const CODE: i8 = 0x0d;
    pub const CODE_WITH_SCOPE: i8 = 0x0f;
    pub const INT32: i8 = 0x10;
    pub const INT64: i8 = 0x12;
    pub const MAX_KEY: i8 = 0x7f;
    pub const MIN_KEY: i8 = -1;

    /// Ends the element list of a document. Never a valid element tag.
    pub const END_OF_DOCUMENT: i8 = 0x00;

    /// Check if a tag is one the decoder can dispatch.
    #[inline]
    pub const fn is_supported(tag: i8) -> bool {
        matches!(
            tag,
            DOUBLE
                | STRING
                | DOCUMENT
                | ARRAY
                | BINARY
                | UNDEFINED
                | OBJECT_ID
                | BOOLEAN
                | TIMESTAMP
                | NULL
                | REGEX
                | CODE
                | CODE_WITH_SCOPE
                | INT32
                | INT64
                | MAX_KEY
                | MIN_KEY
        )
    }
}

/// Binary subtypes with special decoding rules.
pub mod binary_subtype {
    /// Generic binary data.
    pub const GENERIC: u8 = 0x00;
    /// Legacy "general" form: the payload is prefixed by a redundant embedded length.
    pub const BINARY_OLD: u8 = 0x02;
    /// UUID; promoted to a UUID value when the payload is exactly 16 bytes.
    pub const UUID: u8 = 0x03;

    /// Payload length of a UUID.
    pub const UUID_LEN: usize = 16;
}

/// Default resource limits.
pub mod limits {
    /// Default chunk size for the string decoder's scratch buffer.
    pub const DEFAULT_BUFFER_SIZE: usize = 128;

    /// Maximum document nesting depth
    pub const MAX_DEPTH: usize = 512;

    /// Maximum declared document size in bytes
    #[allow(clippy::cast_sign_loss)]
    pub const MAX_DOCUMENT_SIZE: usize = i32::MAX as usize;
}

/// Number of raw bytes in an ObjectId.
pub const OBJECT_ID_LEN: usize = 12;

/// An opaque 12-byte object identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// Wrap raw ObjectId bytes.
    #[inline]
    pub const fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// The raw bytes, exactly as they appeared on the wire.
    #[inline]
    pub const fn bytes(&self) -> [u8; OBJECT_ID_LEN] {
        self.0
    }

    /// Seconds since the Unix epoch stored in the leading four bytes (big-endian).
    ///
    /// The decoder never interprets ObjectIds; this is a convenience for callers.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Lowercase hexadecimal form (24 characters).
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl From<[u8; OBJECT_ID_LEN]> for ObjectId {
    fn from(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }
}
