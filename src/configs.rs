//! The live configuration store that rules read from and the calculator writes to.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;

use crate::error::CalcfigError;
use crate::types::Value;

/// Resolved configuration values, in assignment order.
///
/// Only the calculator mutates a `Configs`. Callers get it back through
/// [`Processor::configs`](crate::Processor::configs) as a shared reference once
/// evaluation has returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configs {
    values: IndexMap<String, Value>,
}

impl Configs {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Deserialize the value of `key` into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, CalcfigError> {
        let value = self.get(key).ok_or_else(|| CalcfigError::InvalidValue {
            key: key.into(),
            reason: "key has not been computed".into(),
        })?;
        value
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| CalcfigError::InvalidValue {
                key: key.into(),
                reason: e.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn assign(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }
}
