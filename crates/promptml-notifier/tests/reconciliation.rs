use promptml_core::{CategoryKey, NoticeBatch, NotePayload};
use promptml_notifier::builder::{markup, BuiltNote};
use promptml_notifier::{
    AppendOutcome, ContainerId, HeadlessShell, HostError, HostShell, NotifierConfig, OpenOutcome,
    ReconciliationEngine, ResolutionFailure, TabDirection, WidgetHandle,
};
use serde_json::{json, Value};
use std::sync::Arc;

const REGION: &str = "main";

fn batch(value: Value) -> NoticeBatch {
    NoticeBatch::from_value(&value).expect("valid batch")
}

fn missing_batch(count: u64) -> NoticeBatch {
    batch(json!({
        "kernel_id": "k-1",
        "cell_id": "cell-7",
        "missing": [{
            "df": "loans",
            "columns": [{
                "name": "income",
                "number_missing": count,
                "total_length": 100,
                "correlated_column": "zip",
                "largest_percent": 0.4,
                "largest_missing_value": "94110"
            }]
        }]
    }))
}

fn proxy_batch() -> NoticeBatch {
    batch(json!({
        "proxy": [{"df": "loans", "proxy_col_name": "zip", "sensitive_col_name": "race", "p": 0.0001}]
    }))
}

fn errors_batch() -> NoticeBatch {
    batch(json!({
        "error": [{"model_name": "lr", "slice": [["sex", "F"]], "n": 4}]
    }))
}

fn engine() -> ReconciliationEngine<HeadlessShell> {
    let mut shell = HeadlessShell::new().with_creation_lag(1);
    shell.open_foreign_tab(REGION, "analysis.ipynb");
    ReconciliationEngine::new(NotifierConfig::default(), shell)
}

#[test]
fn redelivery_of_identical_batch_is_idempotent() {
    let mut engine = engine();
    let first = engine.ingest(&missing_batch(3));
    let note_id = first.inserted[0];
    engine.click(note_id).expect("note present");

    let second = engine.ingest(&missing_batch(3));
    assert!(second.inserted.is_empty());
    assert_eq!(second.unchanged, vec![CategoryKey::new("missing")]);
    assert_eq!(engine.panel().len(), 1);
    let note = engine.panel().get(note_id).expect("original note kept");
    assert!(note.classes().contains(&"clicked"));
}

#[test]
fn changed_notice_replaces_the_note() {
    let mut engine = engine();
    let first = engine.ingest(&missing_batch(3));
    let second = engine.ingest(&missing_batch(5));

    assert_eq!(second.inserted.len(), 1);
    assert_ne!(second.inserted[0], first.inserted[0]);
    assert_eq!(engine.panel().len(), 1);
    assert_eq!(engine.panel().notes()[0].id, second.inserted[0]);
    let stored = engine
        .registry()
        .get(&CategoryKey::new("missing"))
        .expect("registry entry");
    assert_eq!(stored[0]["columns"][0]["number_missing"], json!(5));
}

#[tokio::test(start_paused = true)]
async fn opening_a_category_twice_keeps_one_widget() {
    let mut engine = engine();
    let report = engine.ingest(&proxy_batch());
    let note_id = report.inserted[0];

    let first = engine.select_and_open(note_id).await.expect("note");
    assert!(matches!(first, OpenOutcome::Created { .. }));
    let second = engine.select_and_open(note_id).await.expect("note");
    assert!(matches!(second, OpenOutcome::Refocused { .. }));

    assert_eq!(engine.host().created_count(), 1);
    assert_eq!(engine.widgets().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn closed_tab_is_pruned_and_reopened() {
    let mut engine = engine();
    let report = engine.ingest(&errors_batch());
    let note_id = report.inserted[0];
    let OpenOutcome::Created { tab_id } = engine.select_and_open(note_id).await.expect("note")
    else {
        panic!("expected a created widget");
    };

    assert!(engine.host_mut().close_tab(&tab_id));
    let reopened = engine.select_and_open(note_id).await.expect("note");
    let OpenOutcome::Created { tab_id: new_tab } = reopened else {
        panic!("expected a fresh widget, got {reopened:?}");
    };
    assert_ne!(new_tab, tab_id);
    assert_eq!(engine.host().created_count(), 2);
    let entry = engine
        .widgets()
        .entry(&CategoryKey::new("errors"))
        .expect("tracked");
    assert_eq!(entry.host_tab_id, new_tab);
}

/// Host whose created widgets either never surface or surface alongside an
/// unrelated tab.
struct RacingShell {
    inner: HeadlessShell,
    extra_tabs_on_create: usize,
}

impl HostShell for RacingShell {
    fn tab_ids(&self, region: &str) -> Vec<String> {
        self.inner.tab_ids(region)
    }

    fn current_tab(&self, region: &str) -> Option<String> {
        self.inner.current_tab(region)
    }

    fn contains_tab(&self, tab_id: &str) -> bool {
        self.inner.contains_tab(tab_id)
    }

    fn create_widget(
        &mut self,
        region: &str,
        title: &str,
        container: &ContainerId,
    ) -> Result<WidgetHandle, HostError> {
        let handle = self.inner.create_widget(region, title, container)?;
        for _ in 0..self.extra_tabs_on_create {
            self.inner.open_foreign_tab(region, "terminal");
        }
        Ok(handle)
    }

    fn set_content(&mut self, container: &ContainerId, markup: &str) -> Result<(), HostError> {
        self.inner.set_content(container, markup)
    }

    fn activate_adjacent(&mut self, region: &str, direction: TabDirection) -> Result<(), HostError> {
        self.inner.activate_adjacent(region, direction)
    }
}

#[tokio::test(start_paused = true)]
async fn ambiguous_resolution_leaves_category_untracked() {
    let shell = RacingShell {
        inner: HeadlessShell::new(),
        extra_tabs_on_create: 1,
    };
    let mut engine = ReconciliationEngine::new(NotifierConfig::default(), shell);
    let note_id = engine.ingest(&proxy_batch()).inserted[0];

    let outcome = engine.select_and_open(note_id).await.expect("note");
    let OpenOutcome::Untracked { reason, .. } = outcome else {
        panic!("expected untracked, got {outcome:?}");
    };
    assert!(matches!(reason, ResolutionFailure::Ambiguous { .. }));
    assert!(engine.widgets().is_empty());

    engine.host_mut().extra_tabs_on_create = 0;
    let retry = engine.select_and_open(note_id).await.expect("note");
    assert!(matches!(retry, OpenOutcome::Created { .. }));
    assert_eq!(engine.host().inner.created_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn unresolved_creation_is_retried_on_next_open() {
    let shell = RacingShell {
        inner: HeadlessShell::new().with_creation_lag(50),
        extra_tabs_on_create: 0,
    };
    let mut engine = ReconciliationEngine::new(NotifierConfig::default(), shell);
    let note_id = engine.ingest(&errors_batch()).inserted[0];

    let outcome = engine.select_and_open(note_id).await.expect("note");
    let OpenOutcome::Untracked { reason, .. } = outcome else {
        panic!("expected untracked, got {outcome:?}");
    };
    assert_eq!(reason, ResolutionFailure::NotFound { attempts: 3 });

    let again = engine.select_and_open(note_id).await.expect("note");
    assert!(matches!(again, OpenOutcome::Untracked { .. }));
    assert_eq!(engine.host().inner.created_count(), 2);
}

fn note_with_condensed(key: &str, condensed_title: &str) -> BuiltNote {
    BuiltNote {
        condensed: markup::condensed_note(condensed_title),
        payload: Arc::new(NotePayload {
            title: condensed_title.to_string(),
            rendered_content: "<p>detail</p>".to_string(),
            category_key: CategoryKey::new(key),
            originating_message: vec![json!({"key": key})],
        }),
    }
}

#[test]
fn identical_text_across_categories_is_deduplicated() {
    let mut engine = engine();
    let AppendOutcome::Inserted { note_id: first, .. } =
        engine.append(note_with_condensed("proxy", "Check these columns"))
    else {
        panic!("first note inserted");
    };
    let AppendOutcome::Inserted {
        note_id: second,
        deduplicated,
    } = engine.append(note_with_condensed("protected", "Check these columns"))
    else {
        panic!("second note inserted");
    };

    assert_eq!(deduplicated, vec![first]);
    assert_eq!(engine.panel().len(), 1);
    assert_eq!(engine.panel().notes()[0].id, second);
    assert_eq!(engine.registry().len(), 2);
}

#[test]
fn update_for_unopened_category_creates_no_widget() {
    let mut engine = engine();
    engine.ingest(&missing_batch(3));
    engine.ingest(&missing_batch(8));

    assert_eq!(engine.host().created_count(), 0);
    let stored = engine
        .registry()
        .get(&CategoryKey::new("missing"))
        .expect("registry entry");
    assert_eq!(stored[0]["columns"][0]["number_missing"], json!(8));
}

#[tokio::test(start_paused = true)]
async fn update_reaches_open_detail_view() {
    let mut engine = engine();
    let note_id = engine.ingest(&missing_batch(3)).inserted[0];
    engine.select_and_open(note_id).await.expect("note");
    let container = engine
        .widgets()
        .entry(&CategoryKey::new("missing"))
        .expect("tracked")
        .container_id
        .clone();

    engine.ingest(&missing_batch(9));
    let content = engine.host().content_of(&container).expect("content");
    assert!(
        content.contains("<strong>9</strong>/<strong>100</strong>"),
        "content was not pushed: {content}"
    );
    assert_eq!(engine.host().created_count(), 1);
}

#[test]
fn dismissed_note_stays_dismissed_on_unchanged_redelivery() {
    let mut engine = engine();
    let proxy = engine.ingest(&proxy_batch()).inserted[0];
    engine.ingest(&missing_batch(1));
    assert_eq!(engine.dismiss(proxy), Some(true));

    engine.ingest(&proxy_batch());
    let notes = engine.panel().notes();
    assert_eq!(notes.last().map(|note| note.id), Some(proxy));
    assert!(notes
        .last()
        .map(|note| note.classes().contains(&"wasClosed"))
        .unwrap_or(false));
}
