/*!
 * Core Types
 * Shared value and identity types used across the pipeline
 */

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

/// Inline string optimization for short, hot strings (type names, method names)
pub type InlineString = smartstring::alias::String;

/// Identity of an intercepted method: declaring type plus method name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodId {
    pub declaring_type: InlineString,
    pub method: InlineString,
}

impl MethodId {
    pub fn new(declaring_type: impl Into<InlineString>, method: impl Into<InlineString>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            method: method.into(),
        }
    }

    /// Dedupe key shared by queue clear/replace semantics
    pub fn dedupe_key(&self) -> String {
        format!("{}::{}", self.declaring_type, self.method)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.method)
    }
}

/// Opaque reference to a live object that cannot cross a serialization boundary
///
/// Used for instance targets and for arguments that are handles rather than data
/// (open connections, transactions). Compared by pointer identity.
#[derive(Clone)]
pub struct OpaqueRef {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl OpaqueRef {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for OpaqueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpaqueRef<{}>", self.type_name)
    }
}

/// Dynamic argument value passed through interception
///
/// Scalars serialize losslessly; `Opaque` values are process-local handles and
/// are rejected by any serialization boundary (queue payload validation).
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Opaque(OpaqueRef),
}

impl Value {
    /// Scalar values contribute their literal text to lock keys
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)
        )
    }

    /// Literal key fragment for scalar values; `None` for compound/opaque values
    pub fn scalar_fragment(&self) -> Option<String> {
        match self {
            Value::Null => Some("null".to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn is_serializable(&self) -> bool {
        match self {
            Value::Opaque(_) => false,
            Value::Float(f) => f.is_finite(),
            Value::List(items) => items.iter().all(Value::is_serializable),
            Value::Map(entries) => entries.values().all(Value::is_serializable),
            _ => true,
        }
    }

    /// Convert to a JSON payload; `None` when the value holds an opaque handle
    /// or a non-finite float
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Int(i) => Some(serde_json::Value::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number),
            Value::Str(s) => Some(serde_json::Value::String(s.clone())),
            Value::Bytes(b) => Some(serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            )),
            Value::List(items) => items
                .iter()
                .map(Value::to_json)
                .collect::<Option<Vec<_>>>()
                .map(serde_json::Value::Array),
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| v.to_json().map(|jv| (k.clone(), jv)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(serde_json::Value::Object),
            Value::Opaque(_) => None,
        }
    }

    /// Rebuild a value from a JSON payload (bytes come back as integer lists)
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Deterministic hash used for lock-key derivation
    ///
    /// Fixed seeds make the hash repeatable within a process and across
    /// processes running the same build. ahash output is not guaranteed
    /// stable across crate versions or platforms, so heterogeneous
    /// deployments sharing a lock store should key on template parameters
    /// with scalar values, which bypass hashing entirely.
    pub fn stable_hash(&self) -> u64 {
        let mut hasher =
            ahash::RandomState::with_seeds(0x2c5f_95a1, 0x9e37_79b9, 0x85eb_ca6b, 0xc2b2_ae35)
                .build_hasher();
        self.hash_into(&mut hasher);
        hasher.finish()
    }

    fn hash_into(&self, hasher: &mut impl Hasher) {
        match self {
            Value::Null => 0u8.hash(hasher),
            Value::Bool(b) => {
                1u8.hash(hasher);
                b.hash(hasher);
            }
            Value::Int(i) => {
                2u8.hash(hasher);
                i.hash(hasher);
            }
            Value::Float(f) => {
                3u8.hash(hasher);
                f.to_bits().hash(hasher);
            }
            Value::Str(s) => {
                4u8.hash(hasher);
                s.hash(hasher);
            }
            Value::Bytes(b) => {
                5u8.hash(hasher);
                b.hash(hasher);
            }
            Value::List(items) => {
                6u8.hash(hasher);
                items.len().hash(hasher);
                for item in items {
                    item.hash_into(hasher);
                }
            }
            Value::Map(entries) => {
                7u8.hash(hasher);
                entries.len().hash(hasher);
                for (k, v) in entries {
                    k.hash(hasher);
                    v.hash_into(hasher);
                }
            }
            Value::Opaque(r) => {
                8u8.hash(hasher);
                r.type_name().hash(hasher);
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
