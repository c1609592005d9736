//! String-keyed payload carried by messages, changes and conflicts.
//!
//! The payload keeps the flexibility of an untyped map but every read goes
//! through an accessor that reports a missing key or a wrong type as an
//! error instead of silently coercing.

use crate::{Result, TypesError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Generic key/value payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builds a payload from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Err(TypesError::NotAnObject("null")),
            Value::Bool(_) => Err(TypesError::NotAnObject("bool")),
            Value::Number(_) => Err(TypesError::NotAnObject("number")),
            Value::String(_) => Err(TypesError::NotAnObject("string")),
            Value::Array(_) => Err(TypesError::NotAnObject("array")),
        }
    }

    /// Serializes any value into a payload.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        Self::from_value(serde_json::to_value(value)?)
    }

    /// Adds a key, consuming and returning the payload.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Inserts a key, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Removes a key.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Returns the raw value for a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    fn require(&self, key: &str) -> Result<&Value> {
        self.0
            .get(key)
            .ok_or_else(|| TypesError::MissingKey(key.to_string()))
    }

    fn mismatch(key: &str, expected: &'static str) -> TypesError {
        TypesError::TypeMismatch {
            key: key.to_string(),
            expected,
        }
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| Self::mismatch(key, "string"))
    }

    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.require(key)?
            .as_i64()
            .ok_or_else(|| Self::mismatch(key, "integer"))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64> {
        self.require(key)?
            .as_f64()
            .ok_or_else(|| Self::mismatch(key, "number"))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.require(key)?
            .as_bool()
            .ok_or_else(|| Self::mismatch(key, "bool"))
    }

    pub fn get_object(&self, key: &str) -> Result<&Map<String, Value>> {
        self.require(key)?
            .as_object()
            .ok_or_else(|| Self::mismatch(key, "object"))
    }

    pub fn get_array(&self, key: &str) -> Result<&Vec<Value>> {
        self.require(key)?
            .as_array()
            .ok_or_else(|| Self::mismatch(key, "array"))
    }

    /// Deserializes the whole payload into a known action schema.
    pub fn typed<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }

    /// Returns the payload as a JSON object value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Returns the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Payload {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
