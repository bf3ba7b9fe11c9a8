//! Session-scoped variable store.
//!
//! Capture rules write into the store, substitution rules read from it.
//! Values are never rolled back within a session: a later step always sees
//! the latest value, including values captured earlier in the same run.

use crate::storage::{KeyValueStore, StorageError, CAPTURED_VARIABLES_KEY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A captured or seeded variable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Number(serde_json::Number),
    Text(String),
}

impl VariableValue {
    /// Returns the value as replacement text.
    pub fn as_text(&self) -> String {
        match self {
            VariableValue::Number(n) => n.to_string(),
            VariableValue::Text(s) => s.clone(),
        }
    }

    /// Empty text counts as "no value" when substituting placeholders.
    pub fn is_empty(&self) -> bool {
        matches!(self, VariableValue::Text(s) if s.is_empty())
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableValue::Number(n) => write!(f, "{}", n),
            VariableValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        VariableValue::Text(value)
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        VariableValue::Text(value.to_string())
    }
}

impl From<i64> for VariableValue {
    fn from(value: i64) -> Self {
        VariableValue::Number(value.into())
    }
}

/// Mapping from variable name to its latest value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableStore {
    values: BTreeMap<String, VariableValue>,
}

impl VariableStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the current value of a variable.
    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.values.get(name)
    }

    /// Sets a variable, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<VariableValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &VariableValue)> {
        self.values.iter()
    }

    /// Merges a batch of values into the store.
    pub fn extend<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = (String, VariableValue)>,
    {
        self.values.extend(values);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Loads a store previously saved with [`VariableStore::save_to`].
    ///
    /// A missing key yields an empty store.
    pub fn load_from(store: &dyn KeyValueStore) -> Result<Self, StorageError> {
        match store.get(CAPTURED_VARIABLES_KEY)? {
            Some(value) => serde_json::from_value(value).map_err(StorageError::from),
            None => Ok(Self::new()),
        }
    }

    /// Persists the current values so a later session can resume from them.
    pub fn save_to(&self, store: &mut dyn KeyValueStore) -> Result<(), StorageError> {
        let value = serde_json::to_value(self)?;
        store.set(CAPTURED_VARIABLES_KEY, value)
    }
}
