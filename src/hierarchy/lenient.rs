//! Tolerant deserializers for generated JSON.
//!
//! Generated output drifts from the requested shape in small, predictable
//! ways: numeric ids, `null` where an array was asked for, a bare string in
//! place of a one-element list. These helpers absorb that drift so a single
//! stray `null` does not fail an otherwise usable response.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{ContextPayload, Priority};

/// Accepts a string or a number and yields the textual id. `null` becomes "".
pub(crate) fn id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Accepts `null`, a single string, or an array of scalars.
pub(crate) fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        Value::String(s) => vec![s],
        Value::Array(items) => items.into_iter().filter_map(scalar_text).collect(),
        other => vec![other.to_string()],
    })
}

/// Treats `null` as the type's default.
pub(crate) fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Free text that may arrive as a string, a list of lines, or `null`.
pub(crate) fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        Value::Array(items) => {
            let lines: Vec<String> = items.into_iter().filter_map(scalar_text).collect();
            if lines.is_empty() {
                None
            } else {
                Some(lines.join("\n"))
            }
        }
        other => Some(other.to_string()),
    })
}

/// Context that may be a plain string or a structured object.
pub(crate) fn context<'de, D>(deserializer: D) -> Result<Option<ContextPayload>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(ContextPayload::Text(s)),
        Value::Object(fields) if fields.is_empty() => None,
        Value::Object(fields) => Some(ContextPayload::Fields(fields)),
        other => Some(ContextPayload::Text(other.to_string())),
    })
}

/// Unknown priority words decode as `None` so the configured default applies.
pub(crate) fn priority<'de, D>(deserializer: D) -> Result<Option<Priority>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s.parse().ok(),
        _ => None,
    })
}

/// Non-negative estimate given as an integer, a float, or a numeric string.
pub(crate) fn estimate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|value| value.is_finite() && *value >= 0.0))
}

/// Whole minutes, rounding fractional values.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn minutes<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(estimate(deserializer)?.map(|value| value.round().min(f64::from(u32::MAX)) as u32))
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
