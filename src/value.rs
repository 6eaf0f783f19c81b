use serde_json::Value;
use std::str::FromStr;

pub(crate) fn get_attribute<T>(value: &Value, attribute: &str) -> Option<T>
where
    T: FromStr,
{
    value.get(attribute).and_then(|v| match v {
        Value::String(s) => T::from_str(s.trim()).ok(),
        Value::Number(n) => T::from_str(&n.to_string()).ok(),
        Value::Bool(b) => T::from_str(&b.to_string()).ok(),
        _ => None,
    })
}

/// Reads a free-text field, rendering non-string scalars as text. Absent or null reads as "".
pub(crate) fn get_text(value: &Value, attribute: &str) -> String {
    match value.get(attribute) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Reads a list of strings. A bare string counts as a one-item list; anything else is empty.
pub(crate) fn get_text_list(value: &Value, attribute: &str) -> Vec<String> {
    match value.get(attribute) {
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attribute_accepts_strings_and_numbers() {
        let value = json!({"a": "3", "b": 3, "c": 2.5, "d": [1]});
        assert_eq!(get_attribute::<u32>(&value, "a"), Some(3));
        assert_eq!(get_attribute::<u32>(&value, "b"), Some(3));
        assert_eq!(get_attribute::<u32>(&value, "c"), None);
        assert_eq!(get_attribute::<u32>(&value, "d"), None);
        assert_eq!(get_attribute::<u32>(&value, "missing"), None);
    }

    #[test]
    fn text_list_tolerates_odd_shapes() {
        let value = json!({"list": ["a", 2, null], "single": "only", "blank": " ", "obj": {}});
        assert_eq!(get_text_list(&value, "list"), vec!["a", "2"]);
        assert_eq!(get_text_list(&value, "single"), vec!["only"]);
        assert!(get_text_list(&value, "blank").is_empty());
        assert!(get_text_list(&value, "obj").is_empty());
        assert!(get_text_list(&value, "missing").is_empty());
    }
}
