// ABOUTME: Dynamic value types produced by the BSON decoder.
// ABOUTME: Documents keep insertion order; arrays record whether their elements share one variant.

use crate::types::ObjectId;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Field names that make up a reference-shaped document.
pub mod reference_key {
    pub const REF: &str = "$ref";
    pub const ID: &str = "$id";
    pub const DB: &str = "$db";
}

/// A decoded BSON value.
#[derive(Clone, PartialEq, Default)]
pub enum Value {
    /// Null, also produced for the deprecated Undefined tag
    #[default]
    Null,
    /// Sorts below every other value
    MinKey,
    /// Sorts above every other value
    MaxKey,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    /// UTC instant from milliseconds since the Unix epoch
    Timestamp(DateTime<Utc>),
    Double(f64),
    String(String),
    Document(Document),
    Array(Array),
    Regex(Regex),
    /// JavaScript source
    Code(String),
    CodeWithScope(CodeWithScope),
    Binary(Binary),
    /// Subtype-3 binary with a 16-byte payload, bytes in wire order
    Uuid(Uuid),
    ObjectId(ObjectId),
    /// A document whose keys match the reference shape
    Reference(Reference),
}

/// The variant tag of a [`Value`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    MinKey,
    MaxKey,
    Bool,
    Int32,
    Int64,
    Timestamp,
    Double,
    String,
    Document,
    Array,
    Regex,
    Code,
    CodeWithScope,
    Binary,
    Uuid,
    ObjectId,
    Reference,
}

/// A regular expression: pattern and option flags, both uninterpreted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Regex {
    pub pattern: String,
    pub options: String,
}

/// JavaScript source with its captured variable bindings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeWithScope {
    pub code: String,
    pub scope: Document,
}

/// Raw binary data with its subtype byte.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Binary {
    pub subtype: u8,
    pub bytes: Vec<u8>,
}

/// A pointer to another document, recognized by its `$ref`/`$id` shape.
///
/// Field values are kept as decoded; their types are not checked.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub collection: Box<Value>,
    pub id: Box<Value>,
    pub database: Option<Box<Value>>,
}

impl Reference {
    /// Upgrade a document to a reference if its key set is exactly
    /// `{$ref, $id}` or `{$ref, $id, $db}`, in any order.
    ///
    /// # Errors
    ///
    /// Returns the document unchanged if it does not have the reference shape.
    pub fn from_document(doc: Document) -> std::result::Result<Self, Document> {
        let has_db = doc.contains_key(reference_key::DB);
        let shaped = doc.contains_key(reference_key::REF)
            && doc.contains_key(reference_key::ID)
            && doc.len() == 2 + usize::from(has_db);
        if !shaped {
            return Err(doc);
        }

        let mut map = doc.into_inner();
        let (Some(collection), Some(id)) = (
            map.shift_remove(reference_key::REF),
            map.shift_remove(reference_key::ID),
        ) else {
            unreachable!("reference keys checked above");
        };
        Ok(Self {
            collection: Box::new(collection),
            id: Box::new(id),
            database: map.shift_remove(reference_key::DB).map(Box::new),
        })
    }

    /// The collection name, if `$ref` holds a string.
    #[must_use]
    pub fn collection_name(&self) -> Option<&str> {
        self.collection.as_str()
    }

    /// The database name, if `$db` is present and holds a string.
    #[must_use]
    pub fn database_name(&self) -> Option<&str> {
        self.database.as_deref().and_then(Value::as_str)
    }
}

/// An ordered mapping from key to value.
///
/// Re-inserting an existing key replaces its value and keeps its original position.
#[derive(Clone, PartialEq, Default)]
pub struct Document(IndexMap<String, Value>);

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Insert a value, returning the previous value for the key if any.
    pub fn insert(&mut self, key: String, value: Value) -> Option<Value> {
        self.0.insert(key, value)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.values()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unwrap into the underlying ordered map.
    #[must_use]
    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.0
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

/// An ordered sequence of values.
///
/// `element_kind` is derived at construction: it names the shared variant when
/// the array is non-empty and every element has the same [`ValueKind`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Array {
    items: Vec<Value>,
    element_kind: Option<ValueKind>,
}

impl Array {
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        let element_kind = match items.split_first() {
            Some((first, rest)) => {
                let kind = first.kind();
                rest.iter().all(|v| v.kind() == kind).then_some(kind)
            }
            None => None,
        };
        Self {
            items,
            element_kind,
        }
    }

    /// Convert a document decoded under the array tag.
    ///
    /// Values are taken in key insertion order; the numeric keys themselves are
    /// neither validated nor used for ordering.
    #[must_use]
    pub fn from_document(doc: Document) -> Self {
        Self::new(doc.into_iter().map(|(_, v)| v).collect())
    }

    /// The variant shared by every element, if the array is homogeneous.
    #[must_use]
    pub fn element_kind(&self) -> Option<ValueKind> {
        self.element_kind
    }

    #[must_use]
    pub fn is_homogeneous(&self) -> bool {
        self.element_kind.is_some()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Value> {
        self.items
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self::new(items)
    }
}

impl IntoIterator for Array {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Array {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Value {
    /// Wrap a decoded embedded document, upgrading it to a [`Reference`] when
    /// its keys have the reference shape.
    #[must_use]
    pub fn from_document(doc: Document) -> Self {
        match Reference::from_document(doc) {
            Ok(reference) => {
                log::debug!("document upgraded to reference");
                Value::Reference(reference)
            }
            Err(doc) => Value::Document(doc),
        }
    }

    /// The variant tag of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::MinKey => ValueKind::MinKey,
            Value::MaxKey => ValueKind::MaxKey,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int32(_) => ValueKind::Int32,
            Value::Int64(_) => ValueKind::Int64,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::Document(_) => ValueKind::Document,
            Value::Array(_) => ValueKind::Array,
            Value::Regex(_) => ValueKind::Regex,
            Value::Code(_) => ValueKind::Code,
            Value::CodeWithScope(_) => ValueKind::CodeWithScope,
            Value::Binary(_) => ValueKind::Binary,
            Value::Uuid(_) => ValueKind::Uuid,
            Value::ObjectId(_) => ValueKind::ObjectId,
            Value::Reference(_) => ValueKind::Reference,
        }
    }

    /// Returns true if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for Int32, Int64 and Double.
    #[must_use]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Int64(_) | Value::Double(_))
    }

    #[must_use]
    pub fn is_document(&self) -> bool {
        matches!(self, Value::Document(_))
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer value widened to i64.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Intentional: int-to-float conversion may lose precision
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(*f),
            Value::Int32(n) => Some(f64::from(*n)),
            Value::Int64(n) => Some(*n as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Index into a document by key. Returns None if not a document or key not found.
    #[must_use]
    pub fn get_key(&self, key: &str) -> Option<&Value> {
        self.as_document().and_then(|d| d.get(key))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::MinKey => write!(f, "MinKey"),
            Value::MaxKey => write!(f, "MaxKey"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int32(n) => write!(f, "Int32({n})"),
            Value::Int64(n) => write!(f, "Int64({n})"),
            Value::Timestamp(t) => write!(f, "Timestamp({})", t.to_rfc3339()),
            Value::Double(n) => write!(f, "Double({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Document(d) => f.debug_tuple("Document").field(d).finish(),
            Value::Array(a) => f.debug_tuple("Array").field(&a.items).finish(),
            Value::Regex(r) => f.debug_tuple("Regex").field(r).finish(),
            Value::Code(c) => write!(f, "Code({c:?})"),
            Value::CodeWithScope(c) => f.debug_tuple("CodeWithScope").field(c).finish(),
            Value::Binary(b) => f.debug_tuple("Binary").field(b).finish(),
            Value::Uuid(u) => write!(f, "Uuid({u})"),
            Value::ObjectId(oid) => write!(f, "ObjectId({oid})"),
            Value::Reference(r) => f.debug_tuple("Reference").field(r).finish(),
        }
    }
}

// JSON-like rendering; special types use extended JSON wrappers.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::MinKey => write!(f, "{{\"$minKey\": 1}}"),
            Value::MaxKey => write!(f, "{{\"$maxKey\": 1}}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int32(n) => write!(f, "{n}"),
            Value::Int64(n) => write!(f, "{n}"),
            Value::Timestamp(t) => write!(f, "{{\"$date\": \"{}\"}}", rfc3339(t)),
            Value::Double(n) => {
                if n.is_finite() {
                    write!(f, "{n}")
                } else if n.is_nan() {
                    write!(f, "NaN")
                } else if n.is_sign_positive() {
                    write!(f, "Infinity")
                } else {
                    write!(f, "-Infinity")
                }
            }
            Value::String(s) => write!(f, "\"{}\"", s.escape_default()),
            Value::Document(d) => write!(f, "{d}"),
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Regex(r) => write!(f, "/{}/{}", r.pattern, r.options),
            Value::Code(c) => write!(f, "{{\"$code\": \"{}\"}}", c.escape_default()),
            Value::CodeWithScope(c) => write!(
                f,
                "{{\"$code\": \"{}\", \"$scope\": {}}}",
                c.code.escape_default(),
                c.scope
            ),
            Value::Binary(b) => write!(
                f,
                "{{\"$binary\": <{} bytes>, \"$type\": {}}}",
                b.bytes.len(),
                b.subtype
            ),
            Value::Uuid(u) => write!(f, "{{\"$uuid\": \"{u}\"}}"),
            Value::ObjectId(oid) => write!(f, "{{\"$oid\": \"{oid}\"}}"),
            Value::Reference(r) => {
                write!(f, "{{\"$ref\": {}, \"$id\": {}", r.collection, r.id)?;
                if let Some(db) = &r.database {
                    write!(f, ", \"$db\": {db}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "\"{}\": {}", k.escape_default(), v)?;
        }
        write!(f, "}}")
    }
}

fn rfc3339(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::MinKey => single_entry(serializer, "$minKey", &1),
            Value::MaxKey => single_entry(serializer, "$maxKey", &1),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int32(n) => serializer.serialize_i32(*n),
            Value::Int64(n) => serializer.serialize_i64(*n),
            Value::Timestamp(t) => single_entry(serializer, "$date", &rfc3339(t)),
            Value::Double(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Document(d) => d.serialize(serializer),
            Value::Array(a) => a.serialize(serializer),
            Value::Regex(r) => {
                let mut m = serializer.serialize_map(Some(2))?;
                m.serialize_entry("$regex", &r.pattern)?;
                m.serialize_entry("$options", &r.options)?;
                m.end()
            }
            Value::Code(c) => single_entry(serializer, "$code", c),
            Value::CodeWithScope(c) => {
                let mut m = serializer.serialize_map(Some(2))?;
                m.serialize_entry("$code", &c.code)?;
                m.serialize_entry("$scope", &c.scope)?;
                m.end()
            }
            Value::Binary(b) => {
                let mut m = serializer.serialize_map(Some(2))?;
                m.serialize_entry("$binary", &BytesRef(&b.bytes))?;
                m.serialize_entry("$type", &b.subtype)?;
                m.end()
            }
            Value::Uuid(u) => single_entry(serializer, "$uuid", &u.hyphenated().to_string()),
            Value::ObjectId(oid) => single_entry(serializer, "$oid", &oid.to_hex()),
            Value::Reference(r) => {
                let len = 2 + usize::from(r.database.is_some());
                let mut m = serializer.serialize_map(Some(len))?;
                m.serialize_entry(reference_key::REF, &r.collection)?;
                m.serialize_entry(reference_key::ID, &r.id)?;
                if let Some(db) = &r.database {
                    m.serialize_entry(reference_key::DB, db)?;
                }
                m.end()
            }
        }
    }
}

fn single_entry<S: Serializer, T: Serialize + ?Sized>(
    serializer: S,
    key: &str,
    value: &T,
) -> std::result::Result<S::Ok, S::Error> {
    let mut m = serializer.serialize_map(Some(1))?;
    m.serialize_entry(key, value)?;
    m.end()
}

struct BytesRef<'a>(&'a [u8]);

impl Serialize for BytesRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0)
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut m = serializer.serialize_map(Some(self.len()))?;
        for (key, val) in self {
            m.serialize_entry(key, val)?;
        }
        m.end()
    }
}

impl Serialize for Array {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for item in self {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}
