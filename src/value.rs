use crate::Error;
use std::fmt;

/// A single scalar held by a primitive field
///
/// Strings are byte sequences; no character encoding is imposed.
///
/// ```
/// use binform::Value;
///
/// let v = Value::from(5u8);
/// assert_eq!(v.as_u64().unwrap(), 5);
/// assert!(v.matches(&Value::Int(5)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An unsigned integer (byte or bit field)
    UInt(u64),

    /// A signed integer
    Int(i64),

    /// An IEEE floating point number
    Float(f64),

    /// A byte sequence
    Bytes(Vec<u8>),

    /// A boolean, produced by conditional expressions
    Bool(bool),
}

impl Value {
    /// Interpret the value as an unsigned integer
    pub fn as_u64(&self) -> Result<u64, Error> {
        match *self {
            Value::UInt(x) => Ok(x),
            Value::Int(x) if x >= 0 => Ok(x as u64),
            _ => Err(Error::message(format!(
                "expected an unsigned integer, found {}",
                self
            ))),
        }
    }

    /// Interpret the value as a signed integer
    pub fn as_i64(&self) -> Result<i64, Error> {
        match *self {
            Value::Int(x) => Ok(x),
            Value::UInt(x) if x <= i64::MAX as u64 => Ok(x as i64),
            _ => Err(Error::message(format!(
                "expected a signed integer, found {}",
                self
            ))),
        }
    }

    /// Interpret the value as a float
    pub fn as_f64(&self) -> Result<f64, Error> {
        match *self {
            Value::Float(x) => Ok(x),
            Value::UInt(x) => Ok(x as f64),
            Value::Int(x) => Ok(x as f64),
            _ => Err(Error::message(format!("expected a float, found {}", self))),
        }
    }

    /// Interpret the value as a boolean
    pub fn as_bool(&self) -> Result<bool, Error> {
        match *self {
            Value::Bool(x) => Ok(x),
            _ => Err(Error::message(format!(
                "expected a boolean, found {}",
                self
            ))),
        }
    }

    /// View the value as a byte sequence
    pub fn as_bytes(&self) -> Result<&[u8], Error> {
        match self {
            Value::Bytes(x) => Ok(x),
            _ => Err(Error::message(format!(
                "expected a byte string, found {}",
                self
            ))),
        }
    }

    /// Equality with numeric coercion across integer representations
    ///
    /// `UInt(5)` matches `Int(5)`, but bytes only match bytes.
    pub fn matches(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::Int(b)) | (Value::Int(b), Value::UInt(a)) => {
                *b >= 0 && *a == *b as u64
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Float(a), Value::UInt(b)) | (Value::UInt(b), Value::Float(a)) => {
                *a == *b as f64
            }
            (Value::Float(a), Value::Int(b)) | (Value::Int(b), Value::Float(a)) => *a == *b as f64,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::UInt(x) => write!(f, "{}", x),
            Value::Int(x) => write!(f, "{}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bytes(x) => write!(f, "{:?}", String::from_utf8_lossy(x)),
            Value::Bool(x) => write!(f, "{}", x),
        }
    }
}

macro_rules! from_uint {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(x: $t) -> Self {
                Value::UInt(u64::from(x))
            }
        })*
    };
}

macro_rules! from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(x: $t) -> Self {
                Value::Int(i64::from(x))
            }
        })*
    };
}

from_uint!(u8, u16, u32, u64);
from_int!(i8, i16, i32, i64);

impl From<usize> for Value {
    fn from(x: usize) -> Self {
        Value::UInt(x as u64)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(f64::from(x))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(x: bool) -> Self {
        Value::Bool(x)
    }
}

impl From<&str> for Value {
    fn from(x: &str) -> Self {
        Value::Bytes(x.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Value {
    fn from(x: &[u8]) -> Self {
        Value::Bytes(x.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(x: Vec<u8>) -> Self {
        Value::Bytes(x)
    }
}

/// The plain-value projection of a node tree
///
/// Scalars for primitives, ordered lists for arrays, and ordered
/// name-value pairs for records. Hidden fields and fields whose
/// `onlyif` evaluated to false are absent.
///
/// ```
/// use binform::{Snapshot, Value};
///
/// let snap = Snapshot::record([("len", 3u8.into()), ("data", "abc".into())]);
/// assert_eq!(snap.get("len"), Some(&Snapshot::Value(Value::UInt(3))));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// A primitive's scalar
    Value(Value),

    /// An array's elements in order
    List(Vec<Snapshot>),

    /// A record's visible fields in declaration order
    Record(Vec<(String, Snapshot)>),
}

impl Snapshot {
    /// Build a record snapshot from ordered name-value pairs
    pub fn record<N, I>(fields: I) -> Snapshot
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Snapshot)>,
    {
        Snapshot::Record(
            fields
                .into_iter()
                .map(|(n, v)| (n.into(), v))
                .collect(),
        )
    }

    /// Build a list snapshot
    pub fn list<I>(elems: I) -> Snapshot
    where
        I: IntoIterator<Item = Snapshot>,
    {
        Snapshot::List(elems.into_iter().collect())
    }

    /// Look up a record entry by name
    pub fn get(&self, name: &str) -> Option<&Snapshot> {
        match self {
            Snapshot::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Look up a list element by position
    pub fn at(&self, index: usize) -> Option<&Snapshot> {
        match self {
            Snapshot::List(elems) => elems.get(index),
            _ => None,
        }
    }

    /// View the snapshot as a scalar
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Snapshot::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Value> for Snapshot {
    fn from(x: Value) -> Self {
        Snapshot::Value(x)
    }
}

macro_rules! snapshot_from_scalar {
    ($($t:ty),*) => {
        $(impl From<$t> for Snapshot {
            fn from(x: $t) -> Self {
                Snapshot::Value(Value::from(x))
            }
        })*
    };
}

snapshot_from_scalar!(u8, u16, u32, u64, i8, i16, i32, i64, usize, f32, f64, bool, &str, &[u8], Vec<u8>);

#[cfg(feature = "serde")]
impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Value::UInt(x) => serializer.serialize_u64(*x),
            Value::Int(x) => serializer.serialize_i64(*x),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Bytes(x) => serializer.serialize_str(&String::from_utf8_lossy(x)),
            Value::Bool(x) => serializer.serialize_bool(*x),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Snapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::{SerializeMap, SerializeSeq};
        match self {
            Snapshot::Value(v) => v.serialize(serializer),
            Snapshot::List(elems) => {
                let mut seq = serializer.serialize_seq(Some(elems.len()))?;
                for elem in elems {
                    seq.serialize_element(elem)?;
                }
                seq.end()
            }
            Snapshot::Record(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
        }
    }
}
