pub mod batch;
pub mod notice;

pub use batch::{NoticeBatch, NoticeError};
pub use notice::{NoticeCategory, NoticeGroup};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const PLACEHOLDER_TITLE: &str = "Default Page";
pub const PLACEHOLDER_CONTENT: &str =
    "<div class=\"promptMl placeholder\"><p>This note could not be rendered.</p></div>";

/// Stable identity of a note category. One key per category, never per
/// delivery, so a re-delivered category reconciles with what is on screen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryKey(String);

impl CategoryKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<NoticeCategory> for CategoryKey {
    fn from(category: NoticeCategory) -> Self {
        Self::new(category.key())
    }
}

/// Artifact built for one category in one delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotePayload {
    pub title: String,
    pub rendered_content: String,
    pub category_key: CategoryKey,
    /// Raw notice list that produced this payload, kept verbatim for the
    /// content differ.
    #[serde(default)]
    pub originating_message: Vec<Value>,
}

impl NotePayload {
    pub fn placeholder(category_key: CategoryKey, originating_message: Vec<Value>) -> Self {
        Self {
            title: PLACEHOLDER_TITLE.to_string(),
            rendered_content: PLACEHOLDER_CONTENT.to_string(),
            category_key,
            originating_message,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.rendered_content.trim().is_empty()
    }

    pub fn is_placeholder(&self) -> bool {
        self.title == PLACEHOLDER_TITLE
    }
}
