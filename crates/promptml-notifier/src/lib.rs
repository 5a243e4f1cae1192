//! Notification panel engine: turns notice batches into condensed notes and
//! keeps at most one detail view per category open in the host shell.

pub mod builder;
pub mod config;
pub mod differ;
pub mod engine;
pub mod host;
pub mod panel;
pub mod registry;
pub mod widgets;

pub use config::{DiffPolicy, NotifierConfig, ResolutionPolicy};
pub use engine::{AppendOutcome, IngestReport, PanelSnapshot, ReconciliationEngine};
pub use host::{ContainerId, HeadlessShell, HostError, HostShell, TabDirection, WidgetHandle};
pub use panel::{NoteId, NoteSelected, PanelList, PanelNote};
pub use widgets::{OpenOutcome, PushOutcome, ResolutionFailure, WidgetResolver, WidgetState};
