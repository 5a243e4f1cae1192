//! Note builder registry: routes a batch entry to its category template.

pub mod markup;

use promptml_core::batch::BatchEntry;
use promptml_core::{CategoryKey, NoticeBatch, NoticeCategory, NoticeGroup, NotePayload};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltNote {
    /// Condensed sidebar markup.
    pub condensed: String,
    pub payload: Arc<NotePayload>,
}

#[derive(Debug, Default)]
pub struct RoutedBatch {
    pub notes: Vec<BuiltNote>,
    /// Batch keys that matched no known category.
    pub dropped: Vec<String>,
}

pub fn build(group: &NoticeGroup, originating_message: Vec<Value>) -> BuiltNote {
    let category = group.category();
    let rendered_content = match group {
        NoticeGroup::Proxy(proxies) => markup::proxy_detail(proxies),
        NoticeGroup::Missing(notices) => markup::missing_detail(notices),
        NoticeGroup::Error(notices) => markup::errors_detail(notices),
        NoticeGroup::Resemble(notices) => markup::protected_detail(notices),
        NoticeGroup::ModelReport(models) => markup::model_report_detail(models),
        NoticeGroup::Welcome => markup::welcome_detail(),
        NoticeGroup::Outliers(notices) => markup::outliers_detail(notices),
        NoticeGroup::EqOdds(notices) => markup::eq_odds_detail(notices),
    };
    BuiltNote {
        condensed: markup::condensed_note(category.title()),
        payload: Arc::new(NotePayload {
            title: category.title().to_string(),
            rendered_content,
            category_key: CategoryKey::from(category),
            originating_message,
        }),
    }
}

/// Builds the note for one batch key. Unknown keys yield `None`; notices
/// that fail to parse yield the placeholder payload for their category.
pub fn route_entry(entry: &BatchEntry) -> Option<BuiltNote> {
    let Some(category) = NoticeCategory::from_wire(&entry.name) else {
        warn!(event = "notice_dropped", category = %entry.name, reason = "unknown category");
        return None;
    };
    match NoticeGroup::parse(category, &entry.notices) {
        Ok(group) => Some(build(&group, entry.notices.clone())),
        Err(err) => {
            warn!(event = "notice_placeholder", category = %category, error = %err);
            Some(BuiltNote {
                condensed: markup::condensed_note(category.title()),
                payload: Arc::new(NotePayload::placeholder(
                    CategoryKey::from(category),
                    entry.notices.clone(),
                )),
            })
        }
    }
}

pub fn route_batch(batch: &NoticeBatch) -> RoutedBatch {
    let mut routed = RoutedBatch::default();
    for entry in &batch.entries {
        match route_entry(entry) {
            Some(note) => routed.notes.push(note),
            None => routed.dropped.push(entry.name.clone()),
        }
    }
    routed
}
