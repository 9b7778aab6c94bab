//! Free-form node and link properties.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::validation::ValidationError;

/// String-keyed JSON properties.
///
/// BTreeMap keeps serialization order stable for fingerprints.
pub type Properties = BTreeMap<String, Value>;

/// Normalize a raw JSON value into properties.
///
/// `null` collapses to an empty map. A string is parsed as a JSON document,
/// which lets callers pass `'{"gateway": true}'` as stored by older records.
pub fn properties_from_value(value: Value) -> Result<Properties, ValidationError> {
    match value {
        Value::Null => Ok(Properties::new()),
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::String(text) => {
            let parsed: Value = serde_json::from_str(&text)
                .map_err(|e| ValidationError::InvalidProperties(e.to_string()))?;
            match parsed {
                Value::String(_) => Err(ValidationError::InvalidProperties(text)),
                other => properties_from_value(other),
            }
        }
        other => Err(ValidationError::InvalidProperties(other.to_string())),
    }
}

/// Serde helper: accept `null`, an object, or a JSON-encoded string.
pub fn deserialize_properties<'de, D>(deserializer: D) -> Result<Properties, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null);
    properties_from_value(value).map_err(serde::de::Error::custom)
}
