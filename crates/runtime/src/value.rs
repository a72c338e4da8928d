//! Dynamic values returned by host commands.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;

/// Interior-mutable container shared by reference.
///
/// Two `HostValue`s holding the same `Shared` are the *same* structure, which
/// is what lets a host hand back graphs with cycles.
pub type Shared<T> = Arc<Mutex<T>>;

/// A value produced by a host command.
///
/// Lists and maps are reference types: cloning a `HostValue` clones the
/// handle, not the contents.
#[derive(Clone)]
pub enum HostValue {
    Null,
    /// The host produced nothing at all (distinct from an explicit null).
    Undefined,
    Bool(bool),
    Number(f64),
    String(String),
    List(Shared<Vec<HostValue>>),
    /// Keyed structure in insertion order.
    Map(Shared<Vec<(String, HostValue)>>),
    /// Anything else (widgets, callables, handles); rendered through `Display`.
    Opaque(Arc<dyn fmt::Display + Send + Sync>),
}

impl HostValue {
    pub fn list(items: Vec<HostValue>) -> Self {
        Self::List(Arc::new(Mutex::new(items)))
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, HostValue)>) -> Self {
        let entries = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::Map(Arc::new(Mutex::new(entries)))
    }

    pub fn opaque(value: impl fmt::Display + Send + Sync + 'static) -> Self {
        Self::Opaque(Arc::new(value))
    }

    /// Append to a list. Returns `false` if `self` is not a list.
    pub fn push(&self, item: HostValue) -> bool {
        match self {
            Self::List(items) => {
                items.lock().unwrap_or_else(|e| e.into_inner()).push(item);
                true
            }
            _ => false,
        }
    }

    /// Append a key to a map. Returns `false` if `self` is not a map.
    pub fn insert(&self, key: impl Into<String>, item: HostValue) -> bool {
        match self {
            Self::Map(entries) => {
                entries
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push((key.into(), item));
                true
            }
            _ => false,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

// Shallow on purpose: a derived impl would recurse forever on cycles.
impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Undefined => f.write_str("Undefined"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::List(items) => write!(f, "List({:p})", Arc::as_ptr(items)),
            Self::Map(entries) => write!(f, "Map({:p})", Arc::as_ptr(entries)),
            Self::Opaque(_) => f.write_str("Opaque"),
        }
    }
}

impl From<Value> for HostValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::list(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::map(map.into_iter().map(|(k, v)| (k, Self::from(v)))),
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for HostValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}
