// ABOUTME: Serde Deserializer over decoded BSON values.
// ABOUTME: Allows BSON documents to be decoded into any serde-deserializable Rust type.

use crate::decoder::Decoder;
use crate::error::{Error, Result};
use crate::value::{reference_key, Document, Value};
use chrono::SecondsFormat;
use serde::de::value::{MapDeserializer, SeqDeserializer, StringDeserializer};
use serde::de::{self, DeserializeOwned, DeserializeSeed, IntoDeserializer, Visitor};
use std::io::Read;

/// Deserialize a typed value from a decoded document.
///
/// # Errors
///
/// Returns an error if the document doesn't match the expected type `T`.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    T::deserialize(Value::Document(doc))
}

/// Decode a BSON document from a byte slice and deserialize it into `T`.
///
/// # Errors
///
/// Returns an error if:
/// - The data is malformed or truncated
/// - The data doesn't match the expected type `T`
/// - There are trailing bytes after the document
pub fn from_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    from_document(Decoder::new().decode_slice(data)?)
}

/// Decode one BSON document from a reader and deserialize it into `T`.
///
/// # Errors
///
/// Returns an error if the stream is malformed or truncated, or if the
/// document doesn't match the expected type `T`.
pub fn from_reader<R: Read, T: DeserializeOwned>(reader: R) -> Result<T> {
    from_document(Decoder::new().decode_reader(reader)?)
}

impl<'de> IntoDeserializer<'de, Error> for Value {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

impl<'de> IntoDeserializer<'de, Error> for Document {
    type Deserializer = Value;

    fn into_deserializer(self) -> Value {
        Value::Document(self)
    }
}

fn visit_entries<'de, V, I>(entries: I, visitor: V) -> Result<V::Value>
where
    V: Visitor<'de>,
    I: IntoIterator<Item = (String, Value)>,
{
    let mut map: MapDeserializer<'de, _, Error> = MapDeserializer::new(entries.into_iter());
    let value = visitor.visit_map(&mut map)?;
    map.end()?;
    Ok(value)
}

impl<'de> de::Deserializer<'de> for Value {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self {
            Value::Null | Value::MinKey | Value::MaxKey => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Int32(n) => visitor.visit_i32(n),
            Value::Int64(n) => visitor.visit_i64(n),
            Value::Double(f) => visitor.visit_f64(f),
            Value::String(s) | Value::Code(s) => visitor.visit_string(s),
            Value::Timestamp(t) => {
                visitor.visit_string(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::ObjectId(oid) => visitor.visit_string(oid.to_hex()),
            Value::Uuid(u) => visitor.visit_string(u.hyphenated().to_string()),
            Value::Binary(b) => visitor.visit_byte_buf(b.bytes),
            Value::Array(a) => {
                let mut seq: SeqDeserializer<_, Error> = SeqDeserializer::new(a.into_iter());
                let value = visitor.visit_seq(&mut seq)?;
                seq.end()?;
                Ok(value)
            }
            Value::Document(d) => visit_entries(d, visitor),
            Value::Regex(r) => visit_entries(
                [
                    ("pattern".to_owned(), Value::String(r.pattern)),
                    ("options".to_owned(), Value::String(r.options)),
                ],
                visitor,
            ),
            Value::CodeWithScope(c) => visit_entries(
                [
                    ("code".to_owned(), Value::String(c.code)),
                    ("scope".to_owned(), Value::Document(c.scope)),
                ],
                visitor,
            ),
            Value::Reference(r) => {
                let mut entries = vec![
                    (reference_key::REF.to_owned(), *r.collection),
                    (reference_key::ID.to_owned(), *r.id),
                ];
                if let Some(db) = r.database {
                    entries.push((reference_key::DB.to_owned(), *db));
                }
                visit_entries(entries, visitor)
            }
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(other),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self {
            // Unit variant: just a string
            Value::String(s) => {
                let de: StringDeserializer<Error> = s.into_deserializer();
                visitor.visit_enum(de)
            }
            // Other variants: document with single key
            Value::Document(d) if d.len() == 1 => {
                let Some((variant, value)) = d.into_iter().next() else {
                    return Err(Error::Custom("expected single-key document for enum".into()));
                };
                visitor.visit_enum(EnumDeserializer { variant, value })
            }
            _ => Err(Error::Custom("expected string or single-key document for enum".into())),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        drop(self);
        visitor.visit_unit()
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct identifier
    }
}

struct EnumDeserializer {
    variant: String,
    value: Value,
}

impl<'de> de::EnumAccess<'de> for EnumDeserializer {
    type Error = Error;
    type Variant = VariantDeserializer;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self::Variant)> {
        let de: StringDeserializer<Error> = self.variant.into_deserializer();
        let variant = seed.deserialize(de)?;
        Ok((variant, VariantDeserializer { value: self.value }))
    }
}

struct VariantDeserializer {
    value: Value,
}

impl<'de> de::VariantAccess<'de> for VariantDeserializer {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        match self.value {
            Value::Null => Ok(()),
            _ => Err(Error::Custom("expected unit variant".into())),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        seed.deserialize(self.value)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        de::Deserializer::deserialize_seq(self.value, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        de::Deserializer::deserialize_map(self.value, visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectId;
    use crate::value::{Array, Binary};
    use serde::Deserialize;

    fn doc(entries: Vec<(&str, Value)>) -> Document {
        entries.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
    }

    #[test]
    fn test_deserialize_struct() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Person {
            name: String,
            age: u32,
            active: bool,
            nickname: Option<String>,
        }

        let d = doc(vec![
            ("name", Value::String("Alice".into())),
            ("age", Value::Int32(30)),
            ("active", Value::Bool(true)),
            ("nickname", Value::Null),
        ]);
        assert_eq!(
            from_document::<Person>(d).unwrap(),
            Person {
                name: "Alice".into(),
                age: 30,
                active: true,
                nickname: None,
            }
        );
    }

    #[test]
    fn test_deserialize_nested_and_sequences() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Outer {
            scores: Vec<i64>,
            inner: Inner,
        }

        #[derive(Debug, Deserialize, PartialEq)]
        struct Inner {
            ratio: f64,
        }

        let d = doc(vec![
            (
                "scores",
                Value::Array(Array::new(vec![Value::Int32(1), Value::Int64(2)])),
            ),
            ("inner", Value::Document(doc(vec![("ratio", Value::Double(0.5))]))),
        ]);
        let outer: Outer = from_document(d).unwrap();
        assert_eq!(outer.scores, vec![1, 2]);
        assert_eq!(outer.inner, Inner { ratio: 0.5 });
    }

    #[test]
    fn test_deserialize_special_types_as_strings_and_bytes() {
        #[derive(Debug, Deserialize)]
        struct Record {
            id: String,
            #[serde(deserialize_with = "byte_buf::deserialize")]
            blob: Vec<u8>,
            when: chrono::DateTime<chrono::Utc>,
        }

        mod byte_buf {
            use serde::Deserializer;

            pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
                struct BytesVisitor;
                impl<'de> serde::de::Visitor<'de> for BytesVisitor {
                    type Value = Vec<u8>;
                    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                        write!(f, "bytes")
                    }
                    fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
                        Ok(v)
                    }
                }
                d.deserialize_byte_buf(BytesVisitor)
            }
        }

        let when = chrono::DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let d = doc(vec![
            ("id", Value::ObjectId(ObjectId::from_bytes([0x11; 12]))),
            (
                "blob",
                Value::Binary(Binary {
                    subtype: 0,
                    bytes: vec![1, 2, 3],
                }),
            ),
            ("when", Value::Timestamp(when)),
        ]);
        let record: Record = from_document(d).unwrap();
        assert_eq!(record.id, "111111111111111111111111");
        assert_eq!(record.blob, vec![1, 2, 3]);
        assert_eq!(record.when, when);
    }

    #[test]
    fn test_deserialize_enum() {
        #[derive(Debug, Deserialize, PartialEq)]
        enum Shape {
            Empty,
            Circle(f64),
            Rect { w: i32, h: i32 },
        }

        let v: Shape = Shape::deserialize(Value::String("Empty".into())).unwrap();
        assert_eq!(v, Shape::Empty);

        let v = Shape::deserialize(Value::Document(doc(vec![("Circle", Value::Double(2.0))])));
        assert_eq!(v.unwrap(), Shape::Circle(2.0));

        let rect = doc(vec![("w", Value::Int32(3)), ("h", Value::Int32(4))]);
        let v = Shape::deserialize(Value::Document(doc(vec![("Rect", Value::Document(rect))])));
        assert_eq!(v.unwrap(), Shape::Rect { w: 3, h: 4 });
    }

    #[test]
    fn test_type_mismatch_is_custom_error() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Needs {
            n: i32,
        }

        let d = doc(vec![("n", Value::String("seven".into()))]);
        let err = from_document::<Needs>(d).unwrap_err();
        assert_eq!(err.error_type(), "custom");
    }

    #[test]
    fn test_from_slice_and_reader() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Point {
            x: i32,
            y: i32,
        }

        // {"x": 1, "y": 2}
        let mut bytes = vec![
            0x13, 0x00, 0x00, 0x00, //
            0x10, b'x', 0x00, 0x01, 0x00, 0x00, 0x00, //
            0x10, b'y', 0x00, 0x02, 0x00, 0x00, 0x00, //
            0x00,
        ];
        assert_eq!(from_slice::<Point>(&bytes).unwrap(), Point { x: 1, y: 2 });
        assert_eq!(from_reader::<_, Point>(&bytes[..]).unwrap(), Point { x: 1, y: 2 });

        bytes[0] = 0x14;
        assert!(matches!(
            from_slice::<Point>(&bytes),
            Err(Error::MalformedDocument(_))
        ));
    }
}
