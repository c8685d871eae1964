use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};

use crate::instance::EntityHandle;

/// Runtime value of one entity attribute.
///
/// Entities are dynamic records: providers fill attributes with `Value`s and
/// the property model reads them back when statements are emitted. `Decimal`
/// keeps the caller's digits verbatim so output stays bit-stable.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(String),
    Str(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Entity(EntityHandle),
    List(Vec<Value>),
    /// Insertion-ordered key/value pairs of a map attribute.
    PairList(Vec<(Value, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Self::Bool(v) = self { Some(*v) } else { None }
    }

    pub fn as_int(&self) -> Option<i64> {
        if let Self::Int(v) = self { Some(*v) } else { None }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Self::Str(v) = self { Some(v) } else { None }
    }

    pub fn as_entity(&self) -> Option<&EntityHandle> {
        if let Self::Entity(v) = self { Some(v) } else { None }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        if let Self::List(v) = self { Some(v) } else { None }
    }

    pub fn as_pairs(&self) -> Option<&[(Value, Value)]> {
        if let Self::PairList(v) = self { Some(v) } else { None }
    }
}

impl FromStr for Value {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = s.parse() {
            return Ok(Value::Int(value));
        }

        if let Ok(value) = s.parse() {
            return Ok(Value::Float(value));
        }

        let value = match () {
            _ if s.eq_ignore_ascii_case("true") => Value::Bool(true),
            _ if s.eq_ignore_ascii_case("false") => Value::Bool(false),
            _ if s.eq_ignore_ascii_case("null") => Value::Null,
            _ => Value::Str(s.to_owned()),
        };

        Ok(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<EntityHandle> for Value {
    fn from(value: EntityHandle) -> Self {
        Value::Entity(value)
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(value: Option<V>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
