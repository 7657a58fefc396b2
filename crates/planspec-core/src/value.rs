use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Tag keys used to carry the variants JSON cannot express natively.
pub const UNKNOWN_TAG: &str = "$unknown";
pub const SET_TAG: &str = "$set";
pub const MAP_TAG: &str = "$map";

/// A dynamically typed configuration value, as found in a plan or a fixture.
///
/// `Object` has a fixed set of attributes (a schema block), `Map` has
/// dynamic keys. Both iterate in key order. `Set` keeps the order it was
/// built with, which is the order comparisons walk it in.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    /// Known to exist, not resolvable until apply.
    Unknown,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Set(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Map(BTreeMap<String, Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Unknown, Value::Unknown) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // sets have no index identity
            (Value::Set(a), Value::Set(b)) => same_elements(a, b, Value::eq),
            (Value::Object(a), Value::Object(b)) | (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

/// Pairs every element of `a` with a distinct equal element of `b`, so
/// duplicates must appear the same number of times on both sides.
fn same_elements(a: &[Value], b: &[Value], eq: impl Fn(&Value, &Value) -> bool) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|x| {
        match (0..b.len()).find(|&i| !used[i] && eq(x, &b[i])) {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

impl Value {
    /// Builds an object value from `(name, value)` pairs.
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Builds a map value from `(key, value)` pairs.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }

    pub fn is_known(&self) -> bool {
        !self.is_unknown()
    }

    /// Returns true for `Bool`, `Number` and `String`.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Number(_) | Value::String(_))
    }

    /// Returns true for `List` and `Set`.
    pub fn is_collection(&self) -> bool {
        matches!(self, Value::List(_) | Value::Set(_))
    }

    /// Returns true for every variant that has children.
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            Value::List(_) | Value::Set(_) | Value::Object(_) | Value::Map(_)
        )
    }

    /// Returns true if the value is null, or a composite whose members are
    /// all absent (recursively). Empty collections are absent.
    pub fn is_absent(&self) -> bool {
        match self {
            Value::Null => true,
            Value::List(items) | Value::Set(items) => items.iter().all(Value::is_absent),
            Value::Object(fields) | Value::Map(fields) => fields.values().all(Value::is_absent),
            _ => false,
        }
    }

    /// Equality that treats a null attribute the same as a missing one, at
    /// any depth. Used to match call queries, where a caller may spell out
    /// attributes it leaves unset.
    pub fn eq_ignoring_nulls(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) | (Value::Map(a), Value::Map(b)) => {
                let set = |fields: &BTreeMap<String, Value>| {
                    fields.values().filter(|v| !v.is_null()).count()
                };
                set(a) == set(b)
                    && a.iter()
                        .filter(|(_, v)| !v.is_null())
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.eq_ignoring_nulls(w)))
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignoring_nulls(y))
            }
            (Value::Set(a), Value::Set(b)) => same_elements(a, b, Value::eq_ignoring_nulls),
            _ => self == other,
        }
    }

    /// Looks up a named attribute of an object or a key of a map.
    pub fn get_attr(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) | Value::Map(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Iterates the children of a composite value, in comparison order.
    ///
    /// Named children (object attributes, map entries) carry their key;
    /// list and set elements carry `None`. Primitives yield nothing.
    pub fn children(&self) -> Box<dyn Iterator<Item = (Option<&str>, &Value)> + '_> {
        match self {
            Value::List(items) | Value::Set(items) => Box::new(items.iter().map(|v| (None, v))),
            Value::Object(fields) | Value::Map(fields) => {
                Box::new(fields.iter().map(|(k, v)| (Some(k.as_str()), v)))
            }
            _ => Box::new(std::iter::empty()),
        }
    }

    /// Returns the elements of a list or set.
    pub fn elements(&self) -> &[Value] {
        match self {
            Value::List(items) | Value::Set(items) => items,
            _ => &[],
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns a copy of `self` where every `Null` leaf is replaced by the
    /// value found at the same location in `source`.
    pub fn backfill(&self, source: &Value) -> Value {
        match self {
            Value::Null => source.clone(),
            Value::Object(fields) => Value::Object(backfill_fields(fields, source)),
            Value::Map(fields) => Value::Map(backfill_fields(fields, source)),
            Value::List(items) => Value::List(backfill_items(items, source)),
            Value::Set(items) => Value::Set(backfill_items(items, source)),
            other => other.clone(),
        }
    }

    /// Converts a `serde_json::Value`, honouring the `$unknown`, `$set` and
    /// `$map` tags.
    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(arr) => Value::List(arr.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(obj) => {
                if obj.len() == 1 {
                    match obj.iter().next() {
                        Some((tag, serde_json::Value::Bool(true))) if tag == UNKNOWN_TAG => {
                            return Value::Unknown;
                        }
                        Some((tag, serde_json::Value::Array(items))) if tag == SET_TAG => {
                            return Value::Set(items.iter().map(Value::from_json).collect());
                        }
                        Some((tag, serde_json::Value::Object(entries))) if tag == MAP_TAG => {
                            return Value::Map(
                                entries
                                    .iter()
                                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                                    .collect(),
                            );
                        }
                        _ => {}
                    }
                }
                Value::Object(
                    obj.iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }

    /// Converts this value to a `serde_json::Value`, tagging the variants
    /// plain JSON would lose.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Unknown => serde_json::json!({ UNKNOWN_TAG: true }),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(|v| v.to_json()).collect()),
            Value::Set(items) => {
                let items: Vec<_> = items.iter().map(|v| v.to_json()).collect();
                serde_json::json!({ SET_TAG: items })
            }
            Value::Object(fields) => serde_json::Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Map(fields) => {
                let entries: serde_json::Map<String, serde_json::Value> =
                    fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
                serde_json::json!({ MAP_TAG: entries })
            }
        }
    }

    /// Returns a type name for messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Unknown => "unknown",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Object(_) => "object",
            Value::Map(_) => "map",
        }
    }
}

fn backfill_fields(fields: &BTreeMap<String, Value>, source: &Value) -> BTreeMap<String, Value> {
    fields
        .iter()
        .map(|(k, v)| {
            let filled = match source.get_attr(k) {
                Some(src) => v.backfill(src),
                None => v.clone(),
            };
            (k.clone(), filled)
        })
        .collect()
}

fn backfill_items(items: &[Value], source: &Value) -> Vec<Value> {
    let sources = source.elements();
    items
        .iter()
        .enumerate()
        .map(|(i, v)| match sources.get(i) {
            Some(src) => v.backfill(src),
            None => v.clone(),
        })
        .collect()
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(|v| Value::from_json(&v))
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Unknown => write!(f, "[unknown]"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) | Value::Set(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(fields) | Value::Map(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}
