use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// A field that upstream may return as a proper JSON array, as a JSON-encoded
/// string (sometimes doubly escaped), or omit entirely. Downstream code only
/// ever sees the canonical `Vec<T>` produced by [`RawList::canonicalize`].
#[derive(Debug, Clone)]
#[derive(Default)]
pub enum RawList<T> {
    AsList(Vec<T>),
    AsString(String),
    #[default]
    Missing,
}


impl<'de, T> Deserialize<'de> for RawList<T>
where
    T: DeserializeOwned,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Null => RawList::Missing,
            serde_json::Value::String(s) => RawList::AsString(s),
            serde_json::Value::Array(_) => {
                let list: Vec<T> = serde_json::from_value(value).unwrap_or_default();
                RawList::AsList(list)
            }
            _ => RawList::Missing,
        })
    }
}

impl<T: Serialize> RawList<T> {
    /// Collapse to a canonical `Vec<T>`, unescaping JSON-in-string values
    /// (including doubly-escaped strings) and logging on parse failure.
    pub fn canonicalize(self) -> Vec<T>
    where
        T: DeserializeOwned,
    {
        match self {
            RawList::AsList(list) => list,
            RawList::Missing => Vec::new(),
            RawList::AsString(mut s) => {
                for _ in 0..2 {
                    match serde_json::from_str::<Vec<T>>(&s) {
                        Ok(list) => return list,
                        Err(_) => {
                            // May be a quoted JSON string; unescape one layer and retry.
                            match serde_json::from_str::<String>(&s) {
                                Ok(unescaped) => s = unescaped,
                                Err(_) => break,
                            }
                        }
                    }
                }
                tracing::warn!(raw = %s, "failed to parse JSON-in-string field, using empty list");
                Vec::new()
            }
        }
    }

    pub fn is_empty_ish(&self) -> bool {
        match self {
            RawList::Missing => true,
            RawList::AsList(l) => l.is_empty(),
            RawList::AsString(s) => s.is_empty() || s == "[]" || s == "null",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_proper_list() {
        let raw: RawList<String> =
            serde_json::from_str(r#"["Yes","No"]"#).unwrap();
        assert_eq!(raw.canonicalize(), vec!["Yes".to_string(), "No".to_string()]);
    }

    #[test]
    fn canonicalizes_json_string() {
        let raw: RawList<String> =
            serde_json::from_str(r#""[\"Yes\",\"No\"]""#).unwrap();
        assert_eq!(raw.canonicalize(), vec!["Yes".to_string(), "No".to_string()]);
    }

    #[test]
    fn canonicalizes_doubly_escaped_string() {
        let raw: RawList<String> =
            serde_json::from_str(r#""\"[\\\"a\\\"]\"""#).unwrap();
        assert_eq!(raw.canonicalize(), vec!["a".to_string()]);
    }

    #[test]
    fn missing_becomes_empty() {
        let raw: RawList<String> = serde_json::from_str("null").unwrap();
        assert!(raw.canonicalize().is_empty());
    }

    #[test]
    fn garbage_string_becomes_empty() {
        let raw: RawList<String> = serde_json::from_str(r#""not json at all""#).unwrap();
        assert!(raw.canonicalize().is_empty());
    }
}
