use serde_json::Value;

/// Reads an identifier that the service may send as a string or a number.
pub(crate) fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()).filter(|text| !text.is_empty()),
        Value::Number(number) => Some(number.to_string()),
        Value::Object(map) => map.get("id").and_then(id_value),
        _ => None,
    }
}

pub(crate) fn id_field(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| payload.get(*key).and_then(id_value))
}

pub(crate) fn str_field(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        payload
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(ToString::to_string)
    })
}

pub(crate) fn u32_field(payload: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter().find_map(|key| match payload.get(*key)? {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|value| *value >= 0.0).map(|value| value as u64))
            .and_then(|value| u32::try_from(value).ok()),
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    })
}

pub(crate) fn bool_field(payload: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| payload.get(*key).and_then(Value::as_bool))
}

/// Renders a scalar answer option as text; structured values are skipped.
pub(crate) fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

pub(crate) fn text_list(payload: &Value, keys: &[&str]) -> Option<Vec<String>> {
    keys.iter().find_map(|key| {
        payload.get(*key).and_then(Value::as_array).map(|items| items.iter().filter_map(text_value).collect())
    })
}
