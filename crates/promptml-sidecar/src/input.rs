use anyhow::{Context, Result};
use promptml_core::{CategoryKey, NoticeBatch};
use promptml_notifier::{HeadlessShell, NoteId, ReconciliationEngine};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

/// One NDJSON line of sidecar input.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PanelInput {
    Batch { batch: NoticeBatch },
    Click { note: NoteId },
    Dismiss { note: NoteId },
    Expand { note: NoteId },
    /// The user closed a detail view through the host's own close button.
    CloseTab { category: String },
    Reset,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InputStats {
    pub applied: usize,
    pub skipped: usize,
}

pub async fn apply(engine: &mut ReconciliationEngine<HeadlessShell>, input: PanelInput) -> Result<()> {
    match input {
        PanelInput::Batch { batch } => {
            engine.ingest(&batch);
        }
        PanelInput::Click { note } => {
            let outcome = engine
                .select_and_open(note)
                .await
                .with_context(|| format!("unknown note {note}"))?;
            info!(event = "note_opened", note = %note, outcome = ?outcome);
        }
        PanelInput::Dismiss { note } => {
            engine
                .dismiss(note)
                .with_context(|| format!("unknown note {note}"))?;
        }
        PanelInput::Expand { note } => {
            engine
                .toggle_expanded(note)
                .with_context(|| format!("unknown note {note}"))?;
        }
        PanelInput::CloseTab { category } => {
            let key = CategoryKey::new(category);
            let tab_id = engine
                .widgets()
                .entry(&key)
                .map(|entry| entry.host_tab_id.clone())
                .with_context(|| format!("no open view for {key}"))?;
            engine.host_mut().close_tab(&tab_id);
        }
        PanelInput::Reset => engine.reset(),
    }
    Ok(())
}

/// Applies every line of `reader`. Lines that fail to parse or apply are
/// logged and skipped.
pub async fn process<R>(engine: &mut ReconciliationEngine<HeadlessShell>, reader: R) -> Result<InputStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = InputStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.context("read input")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let input = match serde_json::from_str::<PanelInput>(&line) {
            Ok(input) => input,
            Err(err) => {
                warn!(event = "input_skipped", line = line_no, error = %err);
                stats.skipped += 1;
                continue;
            }
        };
        match apply(engine, input).await {
            Ok(()) => stats.applied += 1,
            Err(err) => {
                warn!(event = "input_failed", line = line_no, error = ?err);
                stats.skipped += 1;
            }
        }
    }
    Ok(stats)
}
