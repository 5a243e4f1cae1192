use crate::notice::NoticeCategory;
use chrono::{DateTime, Utc};
use serde::de;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use thiserror::Error;

const ROUTING_FIELDS: [&str; 6] = [
    "kernel_id",
    "kernelId",
    "cell_id",
    "cellId",
    "received_at",
    "type",
];

#[derive(Debug, Error)]
pub enum NoticeError {
    #[error("invalid notice batch: {0}")]
    Shape(String),
    #[error("invalid {category} notice at index {index}: {source}")]
    Field {
        category: &'static str,
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raw notices for one batch key, in the order the backend sent them.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub name: String,
    pub notices: Vec<Value>,
}

/// One analysis response for a single cell execution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NoticeBatch {
    pub kernel_id: Option<String>,
    pub cell_id: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub entries: Vec<BatchEntry>,
}

impl<'de> Deserialize<'de> for NoticeBatch {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(de::Error::custom)
    }
}

impl NoticeBatch {
    pub fn from_json(input: &str) -> Result<Self, NoticeError> {
        let value: Value = serde_json::from_str(input)?;
        Self::from_value(&value)
    }

    /// Accepts the flat shape (`{"kernel_id": .., "proxy": [..], ..}`), the
    /// wrapped shape (`{"kernel_id": .., "cell_id": .., "notices": {..}}`),
    /// the legacy `multiple` envelope keyed by cell id, and the legacy
    /// single-notice envelope (`{"type": "resemble", .., "info": {"cell": ..}}`).
    pub fn from_value(value: &Value) -> Result<Self, NoticeError> {
        let Some(object) = value.as_object() else {
            return Err(NoticeError::Shape("batch must be a JSON object".to_string()));
        };

        let kernel_id = string_field(object, &["kernel_id", "kernelId"]);
        let received_at = object
            .get("received_at")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        if object.get("type").and_then(Value::as_str) == Some("multiple") {
            let info = object
                .get("info")
                .and_then(Value::as_object)
                .ok_or_else(|| NoticeError::Shape("multiple envelope without info".to_string()))?;
            let cell_id = info
                .get("cell")
                .and_then(Value::as_str)
                .ok_or_else(|| NoticeError::Shape("multiple envelope without cell".to_string()))?;
            let entries = match info.get(cell_id) {
                Some(Value::Object(notices)) => collect_entries(notices, &[]),
                Some(_) => {
                    return Err(NoticeError::Shape(format!(
                        "notices for cell {cell_id} must be an object"
                    )))
                }
                None => Vec::new(),
            };
            return Ok(Self {
                kernel_id,
                cell_id: Some(cell_id.to_string()),
                received_at,
                entries,
            });
        }

        if let Some(batch) = single_notice(object, kernel_id.clone(), received_at) {
            return Ok(batch);
        }

        let cell_id = string_field(object, &["cell_id", "cellId"]);
        let entries = match object.get("notices") {
            Some(Value::Object(notices)) => collect_entries(notices, &[]),
            Some(_) => {
                return Err(NoticeError::Shape("notices must be an object".to_string()));
            }
            None => collect_entries(object, &ROUTING_FIELDS),
        };

        Ok(Self {
            kernel_id,
            cell_id,
            received_at,
            entries,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A lone notice whose `type` names a known category and whose routing
/// sits under `info.cell`.
fn single_notice(
    object: &Map<String, Value>,
    kernel_id: Option<String>,
    received_at: Option<DateTime<Utc>>,
) -> Option<NoticeBatch> {
    let name = object.get("type").and_then(Value::as_str)?;
    NoticeCategory::from_wire(name)?;
    let cell_id = object
        .get("info")
        .and_then(|info| info.get("cell"))
        .and_then(Value::as_str)?;
    let notice = object
        .iter()
        .filter(|(key, _)| key.as_str() != "info")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect::<Map<String, Value>>();
    Some(NoticeBatch {
        kernel_id,
        cell_id: Some(cell_id.to_string()),
        received_at,
        entries: vec![BatchEntry {
            name: name.to_string(),
            notices: vec![Value::Object(notice)],
        }],
    })
}

fn string_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn collect_entries(notices: &Map<String, Value>, skip: &[&str]) -> Vec<BatchEntry> {
    notices
        .iter()
        .filter(|(name, _)| !skip.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            let notices = match value {
                Value::Null => return None,
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            };
            Some(BatchEntry {
                name: name.clone(),
                notices,
            })
        })
        .collect()
}
