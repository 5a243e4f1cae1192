//! Reconciles notice deliveries with the panel and open detail views.

use crate::builder::{self, BuiltNote};
use crate::config::{DiffPolicy, NotifierConfig};
use crate::differ;
use crate::host::HostShell;
use crate::panel::{NoteId, NoteSelected, PanelList};
use crate::registry::NoteRegistry;
use crate::widgets::{OpenOutcome, PushOutcome, WidgetResolver, WidgetState};
use promptml_core::{CategoryKey, NoticeBatch};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AppendOutcome {
    Inserted {
        note_id: NoteId,
        /// Older notes removed because their text matched.
        deduplicated: Vec<NoteId>,
    },
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub delivery: u64,
    pub inserted: Vec<NoteId>,
    pub unchanged: Vec<CategoryKey>,
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteView {
    pub id: NoteId,
    pub category_key: CategoryKey,
    pub title: String,
    pub text: String,
    pub classes: Vec<&'static str>,
    pub markup: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenWidgetView {
    pub category_key: CategoryKey,
    pub tab_id: String,
    pub container_id: String,
    pub state: WidgetState,
}

#[derive(Debug, Clone, Serialize)]
pub struct PanelSnapshot {
    pub notes: Vec<NoteView>,
    pub open_widgets: Vec<OpenWidgetView>,
    pub registered_categories: Vec<CategoryKey>,
    pub deliveries: u64,
}

pub struct ReconciliationEngine<H: HostShell> {
    config: NotifierConfig,
    host: H,
    registry: NoteRegistry,
    panel: PanelList,
    widgets: WidgetResolver,
    deliveries: u64,
}

impl<H: HostShell> ReconciliationEngine<H> {
    pub fn new(config: NotifierConfig, host: H) -> Self {
        let widgets = WidgetResolver::new(config.dock_region.clone(), config.resolution);
        Self {
            config,
            host,
            registry: NoteRegistry::new(),
            panel: PanelList::new(),
            widgets,
            deliveries: 0,
        }
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn registry(&self) -> &NoteRegistry {
        &self.registry
    }

    pub fn panel(&self) -> &PanelList {
        &self.panel
    }

    pub fn widgets(&self) -> &WidgetResolver {
        &self.widgets
    }

    /// Number of batches ingested since the last reset. Diagnostic only.
    pub fn deliveries(&self) -> u64 {
        self.deliveries
    }

    pub fn ingest(&mut self, batch: &NoticeBatch) -> IngestReport {
        self.deliveries += 1;
        let routed = builder::route_batch(batch);
        let mut report = IngestReport {
            delivery: self.deliveries,
            dropped: routed.dropped,
            ..IngestReport::default()
        };
        for note in routed.notes {
            let key = note.payload.category_key.clone();
            match self.append(note) {
                AppendOutcome::Inserted { note_id, .. } => report.inserted.push(note_id),
                AppendOutcome::Unchanged => report.unchanged.push(key),
            }
        }
        info!(
            event = "batch_ingested",
            delivery = report.delivery,
            kernel = batch.kernel_id.as_deref().unwrap_or("-"),
            cell = batch.cell_id.as_deref().unwrap_or("-"),
            inserted = report.inserted.len(),
            unchanged = report.unchanged.len(),
            dropped = report.dropped.len()
        );
        report
    }

    pub fn append(&mut self, note: BuiltNote) -> AppendOutcome {
        let key = note.payload.category_key.clone();
        let message = &note.payload.originating_message;
        if let Some(previous) = self.registry.get(&key) {
            let changed = self.differs(&key, message, previous);
            let pushed = self.widgets.push_update(&mut self.host, &note.payload);
            if pushed == PushOutcome::Pushed {
                debug!(event = "note_pushed", category = %key);
            }
            if !changed {
                debug!(event = "note_unchanged", category = %key);
                return AppendOutcome::Unchanged;
            }
        }
        self.registry.set(key.clone(), message.clone());
        let (note_id, deduplicated) = self.panel.insert_front(&note);
        debug!(
            event = "note_inserted",
            category = %key,
            note = %note_id,
            deduplicated = deduplicated.len()
        );
        AppendOutcome::Inserted {
            note_id,
            deduplicated,
        }
    }

    fn differs(&self, key: &CategoryKey, new: &[Value], old: &[Value]) -> bool {
        match self.config.diff_policy {
            DiffPolicy::Positional => differ::is_different(new, old),
            DiffPolicy::Keyed => {
                differ::is_different_keyed(new, old, |notice| differ::natural_key(key, notice))
            }
        }
    }

    pub fn click(&mut self, id: NoteId) -> Option<NoteSelected> {
        self.panel.select(id)
    }

    pub fn dismiss(&mut self, id: NoteId) -> Option<bool> {
        self.panel.dismiss(id)
    }

    pub fn toggle_expanded(&mut self, id: NoteId) -> Option<bool> {
        self.panel.toggle_expanded(id)
    }

    pub async fn open(&mut self, selected: &NoteSelected) -> OpenOutcome {
        self.widgets.open(&mut self.host, &selected.payload).await
    }

    /// Click followed by open, the path a user click takes.
    pub async fn select_and_open(&mut self, id: NoteId) -> Option<OpenOutcome> {
        let selected = self.click(id)?;
        Some(self.open(&selected).await)
    }

    pub fn prune(&mut self) -> Vec<CategoryKey> {
        self.widgets.prune(&self.host)
    }

    pub fn reset(&mut self) {
        self.registry.clear();
        self.panel.clear();
        self.widgets.reset();
        self.deliveries = 0;
        info!(event = "engine_reset");
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        let notes = self
            .panel
            .notes()
            .iter()
            .map(|note| NoteView {
                id: note.id,
                category_key: note.category_key.clone(),
                title: note.payload.title.clone(),
                text: note.text.clone(),
                classes: note.classes(),
                markup: note.markup.clone(),
            })
            .collect();
        let open_widgets = self
            .widgets
            .entries()
            .into_iter()
            .map(|(key, entry)| OpenWidgetView {
                category_key: key.clone(),
                tab_id: entry.host_tab_id.clone(),
                container_id: entry.container_id.to_string(),
                state: self.widgets.state(key),
            })
            .collect();
        PanelSnapshot {
            notes,
            open_widgets,
            registered_categories: self.registry.keys(),
            deliveries: self.deliveries,
        }
    }
}
