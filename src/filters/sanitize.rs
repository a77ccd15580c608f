use serde::Serialize;
use serde_json::{Map, Value};

/// Replacement for the value of every sensitive field.
pub const FILTERED_VALUE: &str = "[FILTERED]";

/// Nesting depth beyond which values are replaced by [`MAX_DEPTH_EXCEEDED`].
pub const MAX_DEPTH: usize = 10;

/// Strings longer than this many characters are truncated.
pub const MAX_STRING_LENGTH: usize = 10_000;

/// Replacement for values nested deeper than [`MAX_DEPTH`].
pub const MAX_DEPTH_EXCEEDED: &str = "[MAX DEPTH EXCEEDED]";

const TRUNCATED_KEY: &str = "_truncated";
const TRUNCATION_MARKER: &str = "...";
const UNKNOWN_TYPE: &str = "[UNKNOWN TYPE]";

/// Recursively redacts sensitive fields from context, user and request data.
///
/// A field is sensitive when its lowercased name contains one of the filter keys. The value of a
/// sensitive field is replaced by [`FILTERED_VALUE`] without looking at it, so nothing nested
/// below a sensitive key survives. Independent of redaction, long strings are truncated and
/// structures deeper than [`MAX_DEPTH`] are cut off.
#[derive(Debug, Clone, Default)]
pub struct SanitizeFilter {
    filter_keys: Vec<String>,
}

impl SanitizeFilter {
    /// Create a filter matching the given keys case-insensitively. Empty keys are skipped, they
    /// would match every field.
    pub fn new<I, S>(filter_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        SanitizeFilter {
            filter_keys: filter_keys
                .into_iter()
                .map(|key| key.as_ref().to_lowercase())
                .filter(|key| !key.is_empty())
                .collect(),
        }
    }

    /// Filter a map. `None` stays `None`.
    pub fn filter(&self, data: Option<&Map<String, Value>>) -> Option<Map<String, Value>> {
        data.map(|data| self.filter_map(data, 0))
    }

    fn filter_map(&self, data: &Map<String, Value>, depth: usize) -> Map<String, Value> {
        if depth > MAX_DEPTH {
            let mut truncated = Map::new();
            truncated.insert(TRUNCATED_KEY.into(), MAX_DEPTH_EXCEEDED.into());
            return truncated;
        }

        data.iter()
            .map(|(key, value)| {
                let value = if self.should_filter(key) {
                    Value::String(FILTERED_VALUE.into())
                } else {
                    self.filter_value(value, depth + 1)
                };
                (key.clone(), value)
            })
            .collect()
    }

    fn filter_value(&self, value: &Value, depth: usize) -> Value {
        if depth > MAX_DEPTH {
            return Value::String(MAX_DEPTH_EXCEEDED.into());
        }

        match value {
            Value::Object(map) => Value::Object(self.filter_map(map, depth)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.filter_value(item, depth + 1))
                    .collect(),
            ),
            Value::String(s) => Value::String(truncate(s, MAX_STRING_LENGTH)),
            Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        }
    }

    fn should_filter(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.filter_keys
            .iter()
            .any(|filter_key| key.contains(filter_key.as_str()))
    }
}

/// Truncate `s` so that it is at most `max_chars` characters long, including the trailing
/// `...` marker. Strings that already fit are returned unchanged, which keeps filtering
/// idempotent.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.char_indices().nth(max_chars).is_none() {
        return s.to_owned();
    }
    let keep = max_chars.saturating_sub(TRUNCATION_MARKER.len());
    let cut = s.char_indices().nth(keep).map_or(s.len(), |(idx, _)| idx);
    let mut truncated = String::with_capacity(cut + TRUNCATION_MARKER.len());
    truncated.push_str(&s[..cut]);
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// Convert an arbitrary serializable value into data accepted by the notifier.
///
/// Values that fail to serialize (for example maps with non-string keys) become the string
/// `"[UNKNOWN TYPE]"`.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| Value::String(UNKNOWN_TYPE.into()))
}
