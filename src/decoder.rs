// ABOUTME: Recursive-descent BSON document decoder with per-tag value dispatch.
// ABOUTME: Counts every consumed byte and checks it against each declared length.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::error::{Error, Result};
use crate::source::{ByteSource, ReaderSource, SliceSource};
use crate::string::StringDecoder;
use crate::types::{binary_subtype, limits, type_code, ObjectId, OBJECT_ID_LEN};
use crate::value::{Array, Binary, CodeWithScope, Document, Regex, Value};
use chrono::DateTime;
use std::io::Read;
use uuid::Uuid;

/// Configuration options for the decoder.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Chunk size of the string decoder's scratch buffer (minimum 1)
    pub buffer_size: usize,
    /// Maximum document nesting depth
    pub max_depth: usize,
    /// Maximum declared length of any document
    pub max_document_size: usize,
    /// Allow bytes after the root document when decoding a slice (default: false)
    pub allow_trailing_bytes: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            buffer_size: limits::DEFAULT_BUFFER_SIZE,
            max_depth: limits::MAX_DEPTH,
            max_document_size: limits::MAX_DOCUMENT_SIZE,
            allow_trailing_bytes: false,
        }
    }
}

impl DecoderConfig {
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_max_document_size(mut self, max_document_size: usize) -> Self {
        self.max_document_size = max_document_size;
        self
    }

    #[must_use]
    pub fn with_allow_trailing_bytes(mut self, allow: bool) -> Self {
        self.allow_trailing_bytes = allow;
        self
    }
}

/// A BSON document decoder.
///
/// The decoder owns a scratch buffer that is reused between calls, so one
/// instance decodes one stream at a time. Use separate instances to decode
/// independent streams concurrently.
#[derive(Debug)]
pub struct Decoder {
    config: DecoderConfig,
    strings: StringDecoder,
    /// Bytes consumed since the start of the current decode call
    consumed: usize,
    depth: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Create a new decoder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    /// Create a new decoder with custom configuration.
    #[must_use]
    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            strings: StringDecoder::new(config.buffer_size),
            config,
            consumed: 0,
            depth: 0,
        }
    }

    /// Get the decoder configuration.
    #[must_use]
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Bytes consumed by the most recent decode call.
    ///
    /// After a failed decode this is where decoding stopped; the stream
    /// position is not meaningful for further reads.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Decode one document from the source, starting at its length prefix.
    pub fn decode<S: ByteSource>(&mut self, source: &mut S) -> Result<Document> {
        self.consumed = 0;
        self.depth = 0;
        self.read_document(source).inspect_err(|err| {
            log::debug!("decode failed after {} bytes: {err}", self.consumed);
        })
    }

    /// Decode one document from a reader. Bytes after the document are left unread.
    pub fn decode_reader<R: Read>(&mut self, reader: R) -> Result<Document> {
        self.decode(&mut ReaderSource::new(reader))
    }

    /// Decode one document occupying `data`.
    pub fn decode_slice(&mut self, data: &[u8]) -> Result<Document> {
        let mut source = SliceSource::new(data);
        let doc = self.decode(&mut source)?;
        if !self.config.allow_trailing_bytes && !source.is_empty() {
            return Err(Error::TrailingBytes);
        }
        Ok(doc)
    }

    // =========================================================================
    // Counted reads
    // =========================================================================

    #[inline]
    fn read_byte<S: ByteSource>(&mut self, src: &mut S) -> Result<u8> {
        let b = src.read_byte()?;
        self.consumed += 1;
        Ok(b)
    }

    #[inline]
    fn read_i32<S: ByteSource>(&mut self, src: &mut S) -> Result<i32> {
        let n = src.read_i32_le()?;
        self.consumed += 4;
        Ok(n)
    }

    #[inline]
    fn read_i64<S: ByteSource>(&mut self, src: &mut S) -> Result<i64> {
        let n = src.read_i64_le()?;
        self.consumed += 8;
        Ok(n)
    }

    #[inline]
    fn read_f64<S: ByteSource>(&mut self, src: &mut S) -> Result<f64> {
        let f = src.read_f64_le()?;
        self.consumed += 8;
        Ok(f)
    }

    fn read_bytes<S: ByteSource>(&mut self, src: &mut S, len: usize) -> Result<Vec<u8>> {
        let bytes = src.read_bytes(len)?;
        self.consumed += len;
        Ok(bytes)
    }

    fn read_cstring<S: ByteSource>(&mut self, src: &mut S) -> Result<String> {
        let (s, n) = self.strings.read_cstring(src)?;
        self.consumed += n;
        Ok(s)
    }

    fn read_string<S: ByteSource>(&mut self, src: &mut S) -> Result<String> {
        let (s, n) = self.strings.read_string(src)?;
        self.consumed += n;
        Ok(s)
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Read a length-prefixed, zero-terminated list of elements.
    ///
    /// The element loop runs while `consumed - start + 1 < declared`: the final
    /// byte counted by the length is the terminator, which is read after the loop.
    fn read_document<S: ByteSource>(&mut self, src: &mut S) -> Result<Document> {
        if self.depth >= self.config.max_depth {
            return Err(Error::MaxDepthExceeded);
        }
        let start = self.consumed;
        let declared = self.read_i32(src)?;
        if declared > 0 && declared as usize > self.config.max_document_size {
            return Err(Error::MaxDocumentSizeExceeded);
        }
        log::trace!("document start: depth {}, declared {declared} bytes", self.depth);

        self.depth += 1;
        let mut doc = Document::new();
        while ((self.consumed - start + 1) as i64) < i64::from(declared) {
            let tag = self.read_byte(src)? as i8;
            if tag == type_code::END_OF_DOCUMENT {
                return Err(Error::malformed(format!(
                    "document ended after {} bytes but declared {declared}",
                    self.consumed - start
                )));
            }
            let key = self.read_cstring(src)?;
            let value = self.read_value(src, tag)?;
            doc.insert(key, value);
        }
        self.depth -= 1;

        let terminator = self.read_byte(src)?;
        if terminator != 0 {
            return Err(Error::malformed(format!(
                "document terminator is 0x{terminator:02x}, expected 0x00"
            )));
        }
        let consumed = self.consumed - start;
        if consumed as i64 != i64::from(declared) {
            return Err(Error::malformed(format!(
                "document declared {declared} bytes but {consumed} were consumed"
            )));
        }
        log::trace!("document end: {} elements, {consumed} bytes", doc.len());
        Ok(doc)
    }

    // =========================================================================
    // Type dispatch
    // =========================================================================

    /// Decode exactly one value of the given element type.
    fn read_value<S: ByteSource>(&mut self, src: &mut S, tag: i8) -> Result<Value> {
        match tag {
            type_code::NULL | type_code::UNDEFINED => Ok(Value::Null),
            type_code::MIN_KEY => Ok(Value::MinKey),
            type_code::MAX_KEY => Ok(Value::MaxKey),
            type_code::BOOLEAN => Ok(Value::Bool(self.read_byte(src)? != 0)),
            type_code::INT32 => Ok(Value::Int32(self.read_i32(src)?)),
            type_code::INT64 => Ok(Value::Int64(self.read_i64(src)?)),
            type_code::DOUBLE => Ok(Value::Double(self.read_f64(src)?)),
            type_code::TIMESTAMP => {
                let millis = self.read_i64(src)?;
                let instant =
                    DateTime::from_timestamp_millis(millis).ok_or(Error::ValueOutOfRange)?;
                Ok(Value::Timestamp(instant))
            }
            type_code::OBJECT_ID => {
                let mut bytes = [0u8; OBJECT_ID_LEN];
                src.read_exact(&mut bytes)?;
                self.consumed += OBJECT_ID_LEN;
                Ok(Value::ObjectId(ObjectId::from_bytes(bytes)))
            }
            type_code::STRING => Ok(Value::String(self.read_string(src)?)),
            type_code::DOCUMENT => Ok(Value::from_document(self.read_document(src)?)),
            type_code::ARRAY => Ok(Value::Array(Array::from_document(
                self.read_document(src)?,
            ))),
            type_code::REGEX => {
                let pattern = self.read_cstring(src)?;
                let options = self.read_cstring(src)?;
                Ok(Value::Regex(Regex { pattern, options }))
            }
            type_code::CODE => Ok(Value::Code(self.read_string(src)?)),
            type_code::CODE_WITH_SCOPE => self.read_code_with_scope(src),
            type_code::BINARY => self.read_binary(src),
            _ => Err(Error::UnsupportedType(tag)),
        }
    }

    fn read_code_with_scope<S: ByteSource>(&mut self, src: &mut S) -> Result<Value> {
        let start = self.consumed;
        let declared = self.read_i32(src)?;
        let code = self.read_string(src)?;
        let scope = self.read_document(src)?;
        let consumed = self.consumed - start;
        if consumed as i64 != i64::from(declared) {
            return Err(Error::malformed(format!(
                "code with scope declared {declared} bytes but {consumed} were consumed"
            )));
        }
        Ok(Value::CodeWithScope(CodeWithScope { code, scope }))
    }

    /// Read a binary value.
    ///
    /// The legacy subtype 2 carries a second, embedded length that replaces the
    /// outer one as the payload length. The two are not cross-checked.
    fn read_binary<S: ByteSource>(&mut self, src: &mut S) -> Result<Value> {
        let declared = self.read_i32(src)?;
        if declared < 0 {
            return Err(Error::malformed(format!("binary length {declared} is negative")));
        }
        let subtype = self.read_byte(src)?;

        let mut len = declared as usize;
        if subtype == binary_subtype::BINARY_OLD {
            let embedded = self.read_i32(src)?;
            if embedded < 0 {
                return Err(Error::malformed(format!(
                    "embedded binary length {embedded} is negative"
                )));
            }
            if i64::from(embedded) != i64::from(declared) - 4 {
                log::debug!(
                    "legacy binary embedded length {embedded} disagrees with outer length {declared}"
                );
            }
            len = embedded as usize;
        }

        let bytes = self.read_bytes(src, len)?;
        if subtype == binary_subtype::UUID && bytes.len() == binary_subtype::UUID_LEN {
            if let Ok(uuid) = Uuid::from_slice(&bytes) {
                return Ok(Value::Uuid(uuid));
            }
        }
        Ok(Value::Binary(Binary { subtype, bytes }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    /// Wrap raw element bytes in a document with a correct length and terminator.
    fn doc_bytes(elements: &[u8]) -> Vec<u8> {
        let len = (elements.len() + 5) as i32;
        let mut out = len.to_le_bytes().to_vec();
        out.extend_from_slice(elements);
        out.push(0);
        out
    }

    /// Element with tag and key "v".
    fn element(tag: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![tag, b'v', 0];
        out.extend_from_slice(payload);
        out
    }

    fn decode_single(tag: u8, payload: &[u8]) -> Result<Value> {
        let bytes = doc_bytes(&element(tag, payload));
        let doc = Decoder::new().decode_slice(&bytes)?;
        Ok(doc.into_inner().shift_remove("v").unwrap_or_default())
    }

    #[test]
    fn test_empty_document() {
        let mut dec = Decoder::new();
        let doc = dec.decode_slice(&[5, 0, 0, 0, 0]).unwrap();
        assert!(doc.is_empty());
        assert_eq!(dec.consumed(), 5);
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode_single(0x10, &7i32.to_le_bytes()).unwrap(), Value::Int32(7));
        assert_eq!(decode_single(0x12, &(-9i64).to_le_bytes()).unwrap(), Value::Int64(-9));
        assert_eq!(decode_single(0x01, &1.5f64.to_le_bytes()).unwrap(), Value::Double(1.5));
        assert_eq!(decode_single(0x08, &[1]).unwrap(), Value::Bool(true));
        assert_eq!(decode_single(0x08, &[0]).unwrap(), Value::Bool(false));
        assert_eq!(decode_single(0x0a, &[]).unwrap(), Value::Null);
        assert_eq!(decode_single(0x06, &[]).unwrap(), Value::Null);
        assert_eq!(decode_single(0x7f, &[]).unwrap(), Value::MaxKey);
        assert_eq!(decode_single(0xff, &[]).unwrap(), Value::MinKey);
    }

    #[test]
    fn test_decode_timestamp() {
        let v = decode_single(0x09, &1_000i64.to_le_bytes()).unwrap();
        assert_eq!(v.as_timestamp().map(|t| t.timestamp_millis()), Some(1_000));

        let v = decode_single(0x09, &(-86_400_000i64).to_le_bytes()).unwrap();
        assert_eq!(
            v.as_timestamp().map(|t| t.to_rfc3339()),
            Some("1969-12-31T00:00:00+00:00".to_owned())
        );

        assert_eq!(
            decode_single(0x09, &i64::MAX.to_le_bytes()),
            Err(Error::ValueOutOfRange)
        );
    }

    #[test]
    fn test_decode_object_id() {
        let raw: [u8; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        let v = decode_single(0x07, &raw).unwrap();
        assert_eq!(v, Value::ObjectId(ObjectId::from_bytes(raw)));
    }

    #[test]
    fn test_decode_regex_and_code() {
        let v = decode_single(0x0b, b"^a.*\0im\0").unwrap();
        assert_eq!(
            v,
            Value::Regex(Regex {
                pattern: "^a.*".into(),
                options: "im".into()
            })
        );

        let mut payload = 3i32.to_le_bytes().to_vec();
        payload.extend_from_slice(b"f(\0");
        assert_eq!(decode_single(0x0d, &payload).unwrap(), Value::Code("f(".into()));
    }

    #[test]
    fn test_decode_code_with_scope() {
        let scope = doc_bytes(&element(0x10, &1i32.to_le_bytes()));
        let code = b"x+v";
        let total = 4 + 4 + code.len() + 1 + scope.len();
        let mut payload = (total as i32).to_le_bytes().to_vec();
        payload.extend_from_slice(&((code.len() + 1) as i32).to_le_bytes());
        payload.extend_from_slice(code);
        payload.push(0);
        payload.extend_from_slice(&scope);

        let v = decode_single(0x0f, &payload).unwrap();
        let Value::CodeWithScope(cws) = v else {
            panic!("expected code with scope, got {v:?}");
        };
        assert_eq!(cws.code, "x+v");
        assert_eq!(cws.scope.get("v"), Some(&Value::Int32(1)));

        // Declared total off by one
        payload[..4].copy_from_slice(&((total + 1) as i32).to_le_bytes());
        assert!(matches!(
            decode_single(0x0f, &payload),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_decode_binary() {
        let mut payload = 3i32.to_le_bytes().to_vec();
        payload.push(0x80);
        payload.extend_from_slice(&[9, 8, 7]);
        assert_eq!(
            decode_single(0x05, &payload).unwrap(),
            Value::Binary(Binary {
                subtype: 0x80,
                bytes: vec![9, 8, 7]
            })
        );
    }

    #[test]
    fn test_decode_legacy_binary_uses_embedded_length() {
        let mut payload = 6i32.to_le_bytes().to_vec();
        payload.push(binary_subtype::BINARY_OLD);
        payload.extend_from_slice(&2i32.to_le_bytes());
        payload.extend_from_slice(&[0xaa, 0xbb]);
        assert_eq!(
            decode_single(0x05, &payload).unwrap(),
            Value::Binary(Binary {
                subtype: binary_subtype::BINARY_OLD,
                bytes: vec![0xaa, 0xbb]
            })
        );

        // Outer length disagrees; still accepted
        payload[..4].copy_from_slice(&100i32.to_le_bytes());
        assert!(decode_single(0x05, &payload).is_ok());
    }

    #[test]
    fn test_decode_uuid_binary() {
        let raw: Vec<u8> = (0u8..16).collect();
        let mut payload = 16i32.to_le_bytes().to_vec();
        payload.push(binary_subtype::UUID);
        payload.extend_from_slice(&raw);
        let v = decode_single(0x05, &payload).unwrap();
        let Value::Uuid(uuid) = v else {
            panic!("expected uuid, got {v:?}");
        };
        assert_eq!(uuid.as_bytes().as_slice(), raw.as_slice());

        let mut payload = 4i32.to_le_bytes().to_vec();
        payload.push(binary_subtype::UUID);
        payload.extend_from_slice(&raw[..4]);
        assert_eq!(
            decode_single(0x05, &payload).unwrap(),
            Value::Binary(Binary {
                subtype: binary_subtype::UUID,
                bytes: raw[..4].to_vec()
            })
        );
    }

    #[test]
    fn test_negative_binary_length() {
        let mut payload = (-1i32).to_le_bytes().to_vec();
        payload.push(0);
        assert!(matches!(
            decode_single(0x05, &payload),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_array_homogeneous_int32() {
        let mut inner = Vec::new();
        for (i, n) in [10i32, 20, 30].iter().enumerate() {
            inner.push(0x10);
            inner.extend_from_slice(i.to_string().as_bytes());
            inner.push(0);
            inner.extend_from_slice(&n.to_le_bytes());
        }
        let v = decode_single(0x04, &doc_bytes(&inner)).unwrap();
        let arr = v.as_array().unwrap();
        assert_eq!(
            arr.as_slice(),
            &[Value::Int32(10), Value::Int32(20), Value::Int32(30)]
        );
        assert_eq!(arr.element_kind(), Some(ValueKind::Int32));
    }

    #[test]
    fn test_nested_reference() {
        let mut inner = vec![0x02, b'$', b'r', b'e', b'f', 0];
        inner.extend_from_slice(&6i32.to_le_bytes());
        inner.extend_from_slice(b"users\0");
        inner.extend_from_slice(&[0x10, b'$', b'i', b'd', 0]);
        inner.extend_from_slice(&42i32.to_le_bytes());

        let v = decode_single(0x03, &doc_bytes(&inner)).unwrap();
        let Value::Reference(r) = v else {
            panic!("expected reference, got {v:?}");
        };
        assert_eq!(r.collection_name(), Some("users"));
        assert_eq!(*r.id, Value::Int32(42));
    }

    #[test]
    fn test_unsupported_type() {
        assert_eq!(decode_single(99, &[]), Err(Error::UnsupportedType(99)));
        assert_eq!(decode_single(0x0c, &[]), Err(Error::UnsupportedType(0x0c)));
    }

    #[test]
    fn test_non_zero_terminator() {
        let mut bytes = doc_bytes(&element(0x10, &1i32.to_le_bytes()));
        *bytes.last_mut().unwrap() = 1;
        assert!(matches!(
            Decoder::new().decode_slice(&bytes),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_declared_length_off_by_one() {
        let bytes = doc_bytes(&element(0x10, &1i32.to_le_bytes()));
        let len = bytes.len() as i32;

        for declared in [len - 1, len + 1] {
            let mut bad = bytes.clone();
            bad[..4].copy_from_slice(&declared.to_le_bytes());
            let result = Decoder::new().decode_slice(&bad);
            assert!(
                matches!(result, Err(Error::MalformedDocument(_))),
                "declared {declared}: {result:?}"
            );
        }
    }

    #[test]
    fn test_truncated_stream() {
        let bytes = doc_bytes(&element(0x12, &5i64.to_le_bytes()));
        assert_eq!(
            Decoder::new().decode_slice(&bytes[..bytes.len() - 4]),
            Err(Error::TruncatedStream)
        );
    }

    #[test]
    fn test_trailing_bytes() {
        let mut bytes = doc_bytes(&[]);
        bytes.push(0xee);
        assert_eq!(Decoder::new().decode_slice(&bytes), Err(Error::TrailingBytes));

        let config = DecoderConfig::default().with_allow_trailing_bytes(true);
        assert!(Decoder::with_config(config).decode_slice(&bytes).is_ok());
    }

    #[test]
    fn test_max_depth() {
        let mut bytes = doc_bytes(&[]);
        for _ in 0..3 {
            bytes = doc_bytes(&element(0x03, &bytes));
        }
        let config = DecoderConfig::default().with_max_depth(3);
        assert_eq!(
            Decoder::with_config(config).decode_slice(&bytes),
            Err(Error::MaxDepthExceeded)
        );
        let config = DecoderConfig::default().with_max_depth(4);
        assert!(Decoder::with_config(config).decode_slice(&bytes).is_ok());
    }

    #[test]
    fn test_max_document_size() {
        let bytes = doc_bytes(&element(0x10, &1i32.to_le_bytes()));
        let config = DecoderConfig::default().with_max_document_size(bytes.len() - 1);
        assert_eq!(
            Decoder::with_config(config).decode_slice(&bytes),
            Err(Error::MaxDocumentSizeExceeded)
        );
    }

    #[test]
    fn test_decoder_reusable_after_error() {
        let mut dec = Decoder::new();
        assert!(dec.decode_slice(&[5, 0, 0, 0, 1]).is_err());
        let doc = dec.decode_slice(&doc_bytes(&element(0x0a, &[]))).unwrap();
        assert_eq!(doc.get("v"), Some(&Value::Null));
        assert_eq!(dec.consumed(), 8);
    }
}
