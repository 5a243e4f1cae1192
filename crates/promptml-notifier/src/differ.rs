use promptml_core::notice::UNNAMED_DF;
use promptml_core::CategoryKey;
use serde_json::Value;
use std::collections::BTreeMap;

/// Positional structural comparison of two originating messages.
///
/// Reordered but otherwise identical notices count as different.
pub fn is_different(new_message: &[Value], old_message: &[Value]) -> bool {
    if new_message.len() != old_message.len() {
        return true;
    }
    new_message
        .iter()
        .zip(old_message)
        .any(|(new, old)| new != old)
}

/// Compares notices by a natural key instead of position. Falls back to
/// [`is_different`] when any notice has no key or keys collide.
pub fn is_different_keyed<F>(new_message: &[Value], old_message: &[Value], key_of: F) -> bool
where
    F: Fn(&Value) -> Option<String>,
{
    if new_message.len() != old_message.len() {
        return true;
    }
    let (Some(new_keyed), Some(old_keyed)) = (
        index_by_key(new_message, &key_of),
        index_by_key(old_message, &key_of),
    ) else {
        return is_different(new_message, old_message);
    };
    new_keyed
        .iter()
        .any(|(key, new)| old_keyed.get(key) != Some(new))
}

fn index_by_key<'a, F>(message: &'a [Value], key_of: &F) -> Option<BTreeMap<String, &'a Value>>
where
    F: Fn(&Value) -> Option<String>,
{
    let mut indexed = BTreeMap::new();
    for notice in message {
        let key = key_of(notice)?;
        if indexed.insert(key, notice).is_some() {
            return None;
        }
    }
    Some(indexed)
}

/// Natural key of a notice within its category.
pub fn natural_key(category: &CategoryKey, notice: &Value) -> Option<String> {
    let field = |name: &str| notice.get(name).map(key_part);
    let parts = match category.as_str() {
        "proxy" => vec![
            field("df")?,
            field("proxy_col_name")?,
            field("sensitive_col_name")?,
        ],
        "missing" => vec![field("df").or_else(|| field("df_name"))?],
        "errors" => vec![field("model_name")?, field("slice").unwrap_or_default()],
        "protected" => vec![field("df").unwrap_or_else(|| UNNAMED_DF.to_string())],
        "modelReport" | "equalizedOdds" => vec![field("model_name")?],
        "outliers" => vec![field("df_name").unwrap_or_default(), field("col_name")?],
        "welcome" => vec![String::from("welcome")],
        _ => return None,
    };
    Some(parts.join("\u{1f}"))
}

fn key_part(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
