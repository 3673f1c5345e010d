//! Host-side values exchanged with the interpreter.
//!
//! [`HostValue`] is the closed set of shapes the marshaller knows how to move
//! across the boundary.  Narrower Rust integers and floats widen to the
//! 64-bit canonical forms on the way in; there is no narrowing on the way
//! out.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Error type a host closure may return to Python.
pub type CallError = Box<dyn std::error::Error + Send + Sync>;

type HostFnInner = dyn Fn(Vec<HostValue>) -> Result<HostValue, CallError> + Send + Sync;

/// A shareable host closure.
#[derive(Clone)]
pub struct HostFn(Arc<HostFnInner>);

impl HostFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> Result<HostValue, CallError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, args: Vec<HostValue>) -> Result<HostValue, CallError> {
        (self.0)(args)
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFn({:p})", Arc::as_ptr(&self.0))
    }
}

impl PartialEq for HostFn {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A host value with no Python counterpart.
///
/// Kept as a value so a conversion can name it in its error instead of
/// refusing at construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct Opaque {
    pub type_name: String,
    pub display: String,
}

/// A value on the host side of the boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Insertion-ordered entries.  Duplicate keys collapse in Python, last
    /// one wins.
    Map(Vec<(HostValue, HostValue)>),
    List(Vec<HostValue>),
    Callable(HostFn),
    Opaque(Opaque),
}

impl HostValue {
    /// Build a `Map` from any ordered sequence of pairs.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<HostValue>,
        V: Into<HostValue>,
    {
        HostValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Build a `List` from any sequence.
    pub fn list<T: Into<HostValue>>(items: impl IntoIterator<Item = T>) -> Self {
        HostValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> Result<HostValue, CallError> + Send + Sync + 'static,
    {
        HostValue::Callable(HostFn::new(f))
    }

    /// Wrap an arbitrary host object that cannot cross the boundary.
    pub fn opaque<T: fmt::Debug + ?Sized>(value: &T) -> Self {
        HostValue::Opaque(Opaque {
            type_name: std::any::type_name::<T>().to_owned(),
            display: format!("{value:?}"),
        })
    }

    /// Label used in type trees for this variant.
    pub fn kind_name(&self) -> &str {
        match self {
            HostValue::Null => "Null",
            HostValue::Bool(_) => "Bool",
            HostValue::Int(_) => "Int",
            HostValue::Float(_) => "Float",
            HostValue::Str(_) => "Str",
            HostValue::Bytes(_) => "Bytes",
            HostValue::Map(_) => "Map",
            HostValue::List(_) => "List",
            HostValue::Callable(_) => "Callable",
            HostValue::Opaque(o) => &o.type_name,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            HostValue::Float(x) => Some(*x),
            HostValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            HostValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(HostValue, HostValue)]> {
        match self {
            HostValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a map entry by key, in insertion order.
    pub fn get(&self, key: &HostValue) -> Option<&HostValue> {
        self.as_map()?.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => f.write_str("null"),
            HostValue::Bool(b) => write!(f, "{b}"),
            HostValue::Int(n) => write!(f, "{n}"),
            HostValue::Float(x) => write!(f, "{x:?}"),
            HostValue::Str(s) => write!(f, "{s:?}"),
            HostValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            HostValue::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            HostValue::List(items) => {
                f.write_str("[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            HostValue::Callable(_) => f.write_str("<callable>"),
            HostValue::Opaque(o) => write!(f, "<{}: {}>", o.type_name, o.display),
        }
    }
}

// ── Conversions from native types ─────────────────────────────────────────────

macro_rules! widen_int {
    ($($t:ty),*) => {
        $(impl From<$t> for HostValue {
            fn from(n: $t) -> Self {
                HostValue::Int(i64::from(n))
            }
        })*
    };
}

widen_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<char> for HostValue {
    fn from(c: char) -> Self {
        HostValue::Int(i64::from(u32::from(c)))
    }
}

impl From<f32> for HostValue {
    fn from(x: f32) -> Self {
        HostValue::Float(f64::from(x))
    }
}

impl From<f64> for HostValue {
    fn from(x: f64) -> Self {
        HostValue::Float(x)
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<()> for HostValue {
    fn from(_: ()) -> Self {
        HostValue::Null
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Str(s.to_owned())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Str(s)
    }
}

impl From<&[u8]> for HostValue {
    fn from(b: &[u8]) -> Self {
        HostValue::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(b: Vec<u8>) -> Self {
        HostValue::Bytes(b)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(items: Vec<HostValue>) -> Self {
        HostValue::List(items)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(HostValue::Null, Into::into)
    }
}

impl<K: Into<HostValue>, V: Into<HostValue>> From<BTreeMap<K, V>> for HostValue {
    fn from(m: BTreeMap<K, V>) -> Self {
        HostValue::map(m)
    }
}

impl<K: Into<HostValue>, V: Into<HostValue>, S> From<HashMap<K, V, S>> for HostValue {
    fn from(m: HashMap<K, V, S>) -> Self {
        HostValue::map(m)
    }
}

impl From<HostFn> for HostValue {
    fn from(f: HostFn) -> Self {
        HostValue::Callable(f)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
