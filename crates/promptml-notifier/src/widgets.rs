//! Tracks which host tab shows the detail view of each category.
//!
//! The host never reports the id of a tab it created, so the resolver
//! diffs tab-strip snapshots taken before and after creation. Refocusing
//! an existing view goes through "activate adjacent tab" because the host
//! exposes no activate-by-id.

use crate::config::ResolutionPolicy;
use crate::host::{ContainerId, HostError, HostShell, TabDirection, WidgetHandle};
use promptml_core::{CategoryKey, NotePayload};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetState {
    Closed,
    Opening,
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenWidgetEntry {
    pub host_tab_id: String,
    pub handle: WidgetHandle,
    pub container_id: ContainerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionFailure {
    /// The created tab never showed up in the tab strip.
    NotFound { attempts: u32 },
    /// Several tabs appeared at once; none can be attributed.
    Ambiguous { candidates: Vec<String> },
    Host { message: String },
}

impl From<HostError> for ResolutionFailure {
    fn from(err: HostError) -> Self {
        ResolutionFailure::Host {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OpenOutcome {
    Refocused { tab_id: String, steps: usize },
    Created { tab_id: String },
    /// A widget may exist in the host but is not tracked; the next open
    /// for the category creates another one.
    Untracked {
        container_id: ContainerId,
        reason: ResolutionFailure,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    Pushed,
    /// The tracked tab was gone and the entry has been dropped.
    Pruned,
    NotOpen,
}

#[derive(Debug)]
pub struct WidgetResolver {
    region: String,
    policy: ResolutionPolicy,
    open: HashMap<CategoryKey, OpenWidgetEntry>,
    opening: HashSet<CategoryKey>,
}

impl WidgetResolver {
    pub fn new(region: impl Into<String>, policy: ResolutionPolicy) -> Self {
        Self {
            region: region.into(),
            policy,
            open: HashMap::new(),
            opening: HashSet::new(),
        }
    }

    pub fn state(&self, key: &CategoryKey) -> WidgetState {
        if self.opening.contains(key) {
            WidgetState::Opening
        } else if self.open.contains_key(key) {
            WidgetState::Open
        } else {
            WidgetState::Closed
        }
    }

    pub fn entry(&self, key: &CategoryKey) -> Option<&OpenWidgetEntry> {
        self.open.get(key)
    }

    /// Open entries sorted by category key.
    pub fn entries(&self) -> Vec<(&CategoryKey, &OpenWidgetEntry)> {
        let mut entries = self.open.iter().collect::<Vec<_>>();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub fn reset(&mut self) {
        self.open.clear();
        self.opening.clear();
    }

    /// Drops every entry whose tab the host no longer has.
    pub fn prune<H: HostShell>(&mut self, host: &H) -> Vec<CategoryKey> {
        let mut pruned = Vec::new();
        self.open.retain(|key, entry| {
            if host.contains_tab(&entry.host_tab_id) {
                true
            } else {
                pruned.push(key.clone());
                false
            }
        });
        pruned.sort();
        for key in &pruned {
            info!(event = "widget_pruned", category = %key);
        }
        pruned
    }

    /// Replaces the content of an already open view. Never creates one.
    pub fn push_update<H: HostShell>(&mut self, host: &mut H, payload: &NotePayload) -> PushOutcome {
        let key = &payload.category_key;
        let Some(entry) = self.open.get(key) else {
            return PushOutcome::NotOpen;
        };
        if !host.contains_tab(&entry.host_tab_id) {
            info!(event = "widget_pruned", category = %key, tab = %entry.host_tab_id);
            self.open.remove(key);
            return PushOutcome::Pruned;
        }
        match host.set_content(&entry.container_id, &payload.rendered_content) {
            Ok(()) => {
                debug!(event = "widget_updated", category = %key, tab = %entry.host_tab_id);
                PushOutcome::Pushed
            }
            Err(err) => {
                warn!(event = "widget_update_failed", category = %key, error = %err);
                self.open.remove(key);
                PushOutcome::Pruned
            }
        }
    }

    pub async fn open<H: HostShell>(&mut self, host: &mut H, payload: &NotePayload) -> OpenOutcome {
        self.prune(host);
        let key = payload.category_key.clone();

        if let Some(entry) = self.open.get(&key).cloned() {
            match self.refocus(host, &entry, payload) {
                Ok(steps) => {
                    return OpenOutcome::Refocused {
                        tab_id: entry.host_tab_id,
                        steps,
                    }
                }
                Err(err) => {
                    warn!(event = "widget_refocus_failed", category = %key, error = %err);
                    self.open.remove(&key);
                }
            }
        }

        if !self.opening.insert(key.clone()) {
            warn!(event = "widget_opening_stale", category = %key);
        }
        let outcome = self.create(host, payload).await;
        self.opening.remove(&key);
        outcome
    }

    fn refocus<H: HostShell>(
        &self,
        host: &mut H,
        entry: &OpenWidgetEntry,
        payload: &NotePayload,
    ) -> Result<usize, HostError> {
        let tabs = host.tab_ids(&self.region);
        let target = tabs
            .iter()
            .position(|id| id == &entry.host_tab_id)
            .ok_or_else(|| HostError::Rejected(format!("tab not in region: {}", entry.host_tab_id)))?;
        let current = host
            .current_tab(&self.region)
            .and_then(|current| tabs.iter().position(|id| *id == current))
            .unwrap_or(0);
        let direction = if target > current {
            TabDirection::Next
        } else {
            TabDirection::Previous
        };
        let steps = target.abs_diff(current);
        for _ in 0..steps {
            host.activate_adjacent(&self.region, direction)?;
        }
        host.set_content(&entry.container_id, &payload.rendered_content)?;
        debug!(
            event = "widget_refocused",
            category = %payload.category_key,
            tab = %entry.host_tab_id,
            steps
        );
        Ok(steps)
    }

    async fn create<H: HostShell>(&mut self, host: &mut H, payload: &NotePayload) -> OpenOutcome {
        let key = payload.category_key.clone();
        let before = host.tab_ids(&self.region).into_iter().collect::<HashSet<_>>();
        let container_id = ContainerId::generate();

        let handle = match host.create_widget(&self.region, &payload.title, &container_id) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(event = "widget_create_failed", category = %key, error = %err);
                return OpenOutcome::Untracked {
                    container_id,
                    reason: err.into(),
                };
            }
        };
        if let Err(err) = host.set_content(&container_id, &payload.rendered_content) {
            warn!(
                event = "widget_content_failed",
                category = %key,
                container = %container_id,
                error = %err
            );
        }

        match self.resolve_tab(host, handle, &before).await {
            Ok(tab_id) => {
                info!(
                    event = "widget_opened",
                    category = %key,
                    tab = %tab_id,
                    container = %container_id
                );
                self.open.insert(
                    key,
                    OpenWidgetEntry {
                        host_tab_id: tab_id.clone(),
                        handle,
                        container_id,
                    },
                );
                OpenOutcome::Created { tab_id }
            }
            Err(reason) => {
                warn!(
                    event = "widget_untracked",
                    category = %key,
                    container = %container_id,
                    reason = ?reason
                );
                OpenOutcome::Untracked {
                    container_id,
                    reason,
                }
            }
        }
    }

    async fn resolve_tab<H: HostShell>(
        &self,
        host: &H,
        handle: WidgetHandle,
        before: &HashSet<String>,
    ) -> Result<String, ResolutionFailure> {
        if let Some(tab_id) = host.creation_result(handle) {
            return Ok(tab_id);
        }
        let attempts = self.policy.max_attempts.max(1);
        let mut delay = self.policy.initial_delay;
        for attempt in 1..=attempts {
            tokio::time::sleep(delay).await;
            let mut added = host
                .tab_ids(&self.region)
                .into_iter()
                .filter(|id| !before.contains(id))
                .collect::<Vec<_>>();
            match added.len() {
                0 => {
                    debug!(
                        event = "widget_resolve_retry",
                        attempt,
                        delay_ms = delay.as_millis() as u64
                    );
                    delay = self.policy.next_delay(delay);
                }
                1 => return Ok(added.remove(0)),
                _ => return Err(ResolutionFailure::Ambiguous { candidates: added }),
            }
        }
        Err(ResolutionFailure::NotFound { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HeadlessShell;
    use std::time::Duration;

    const REGION: &str = "main";

    fn payload(key: &str, content: &str) -> NotePayload {
        NotePayload {
            title: key.to_string(),
            rendered_content: content.to_string(),
            category_key: CategoryKey::new(key),
            originating_message: Vec::new(),
        }
    }

    fn resolver() -> WidgetResolver {
        WidgetResolver::new(REGION, ResolutionPolicy::default())
    }

    /// Opens an unrelated tab whenever a widget is created.
    struct NoisyShell(HeadlessShell);

    impl HostShell for NoisyShell {
        fn tab_ids(&self, region: &str) -> Vec<String> {
            self.0.tab_ids(region)
        }

        fn current_tab(&self, region: &str) -> Option<String> {
            self.0.current_tab(region)
        }

        fn contains_tab(&self, tab_id: &str) -> bool {
            self.0.contains_tab(tab_id)
        }

        fn create_widget(
            &mut self,
            region: &str,
            title: &str,
            container: &ContainerId,
        ) -> Result<WidgetHandle, HostError> {
            let handle = self.0.create_widget(region, title, container)?;
            self.0.open_foreign_tab(region, "console");
            Ok(handle)
        }

        fn set_content(&mut self, container: &ContainerId, markup: &str) -> Result<(), HostError> {
            self.0.set_content(container, markup)
        }

        fn activate_adjacent(
            &mut self,
            region: &str,
            direction: TabDirection,
        ) -> Result<(), HostError> {
            self.0.activate_adjacent(region, direction)
        }
    }

    /// Never reports a focused tab.
    struct UnfocusedShell(HeadlessShell);

    impl HostShell for UnfocusedShell {
        fn tab_ids(&self, region: &str) -> Vec<String> {
            self.0.tab_ids(region)
        }

        fn current_tab(&self, _region: &str) -> Option<String> {
            None
        }

        fn contains_tab(&self, tab_id: &str) -> bool {
            self.0.contains_tab(tab_id)
        }

        fn create_widget(
            &mut self,
            region: &str,
            title: &str,
            container: &ContainerId,
        ) -> Result<WidgetHandle, HostError> {
            self.0.create_widget(region, title, container)
        }

        fn set_content(&mut self, container: &ContainerId, markup: &str) -> Result<(), HostError> {
            self.0.set_content(container, markup)
        }

        fn activate_adjacent(
            &mut self,
            region: &str,
            direction: TabDirection,
        ) -> Result<(), HostError> {
            self.0.activate_adjacent(region, direction)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn created_tab_is_resolved_by_snapshot_diff() {
        let mut shell = HeadlessShell::new().with_creation_lag(1);
        shell.open_foreign_tab(REGION, "notebook");
        let mut widgets = resolver();

        let outcome = widgets.open(&mut shell, &payload("proxy", "<p>a</p>")).await;
        let OpenOutcome::Created { tab_id } = outcome else {
            panic!("expected created, got {outcome:?}");
        };
        assert_eq!(tab_id, "tab-2");
        assert_eq!(widgets.state(&CategoryKey::new("proxy")), WidgetState::Open);
        let entry = widgets.entry(&CategoryKey::new("proxy")).expect("entry");
        assert!(entry.container_id.as_str().starts_with("promptml-popup-"));
        assert_eq!(shell.content_of(&entry.container_id), Some("<p>a</p>"));
    }

    #[tokio::test(start_paused = true)]
    async fn open_view_is_refocused_not_recreated() {
        let mut shell = HeadlessShell::new();
        shell.open_foreign_tab(REGION, "notebook");
        let mut widgets = resolver();
        widgets.open(&mut shell, &payload("proxy", "<p>a</p>")).await;
        shell.open_foreign_tab(REGION, "console");

        let outcome = widgets.open(&mut shell, &payload("proxy", "<p>b</p>")).await;
        assert_eq!(
            outcome,
            OpenOutcome::Refocused {
                tab_id: "tab-2".to_string(),
                steps: 1
            }
        );
        assert_eq!(shell.created_count(), 1);
        assert_eq!(shell.current_tab(REGION), Some("tab-2".to_string()));
        assert_eq!(shell.activations(), &[TabDirection::Previous]);
        let entry = widgets.entry(&CategoryKey::new("proxy")).expect("entry");
        assert_eq!(shell.content_of(&entry.container_id), Some("<p>b</p>"));
    }

    #[tokio::test(start_paused = true)]
    async fn view_right_of_focus_is_reached_going_next() {
        let mut shell = HeadlessShell::new();
        let notebook = shell.open_foreign_tab(REGION, "notebook");
        let mut widgets = resolver();
        widgets.open(&mut shell, &payload("proxy", "<p>a</p>")).await;
        assert_eq!(shell.title_of("tab-2"), Some("proxy"));
        assert!(shell.activate(&notebook));

        let outcome = widgets.open(&mut shell, &payload("proxy", "<p>b</p>")).await;
        assert_eq!(
            outcome,
            OpenOutcome::Refocused {
                tab_id: "tab-2".to_string(),
                steps: 1
            }
        );
        assert_eq!(shell.activations(), &[TabDirection::Next]);
        assert_eq!(shell.current_tab(REGION), Some("tab-2".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_focus_counts_steps_from_the_first_tab() {
        let mut shell = UnfocusedShell(HeadlessShell::new());
        shell.0.open_foreign_tab(REGION, "notebook");
        shell.0.open_foreign_tab(REGION, "console");
        let mut widgets = resolver();
        let created = widgets.open(&mut shell, &payload("errors", "<p/>")).await;
        assert_eq!(
            created,
            OpenOutcome::Created {
                tab_id: "tab-3".to_string()
            }
        );

        let outcome = widgets.open(&mut shell, &payload("errors", "<p/>")).await;
        assert_eq!(
            outcome,
            OpenOutcome::Refocused {
                tab_id: "tab-3".to_string(),
                steps: 2
            }
        );
        assert_eq!(shell.0.activations(), &[TabDirection::Next, TabDirection::Next]);
        assert_eq!(shell.0.created_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_open_does_not_block_the_next_one() {
        let mut shell = HeadlessShell::new();
        let mut widgets = resolver();
        let key = CategoryKey::new("missing");

        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            widgets.open(&mut shell, &payload("missing", "<p>a</p>")),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(widgets.state(&key), WidgetState::Opening);
        assert!(widgets.entry(&key).is_none());

        let outcome = widgets.open(&mut shell, &payload("missing", "<p>b</p>")).await;
        assert_eq!(
            outcome,
            OpenOutcome::Created {
                tab_id: "tab-2".to_string()
            }
        );
        assert_eq!(widgets.state(&key), WidgetState::Open);
        assert_eq!(shell.created_count(), 2);
        let entry = widgets.entry(&key).expect("entry");
        assert_eq!(shell.content_of(&entry.container_id), Some("<p>b</p>"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_tab_gives_up_after_attempts() {
        let mut shell = HeadlessShell::new().with_creation_lag(10);
        let mut widgets = resolver();
        let started = tokio::time::Instant::now();

        let outcome = widgets.open(&mut shell, &payload("errors", "<p/>")).await;
        let OpenOutcome::Untracked { reason, .. } = outcome else {
            panic!("expected untracked, got {outcome:?}");
        };
        assert_eq!(reason, ResolutionFailure::NotFound { attempts: 3 });
        assert_eq!(started.elapsed(), Duration::from_millis(150 + 300 + 600));
        assert_eq!(widgets.state(&CategoryKey::new("errors")), WidgetState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn two_new_tabs_are_ambiguous() {
        let mut shell = NoisyShell(HeadlessShell::new());
        let mut widgets = resolver();

        let outcome = widgets.open(&mut shell, &payload("proxy", "<p/>")).await;
        let OpenOutcome::Untracked { reason, .. } = outcome else {
            panic!("expected untracked, got {outcome:?}");
        };
        assert!(matches!(reason, ResolutionFailure::Ambiguous { ref candidates } if candidates.len() == 2));
        assert!(widgets.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_creation_result_skips_the_wait() {
        let mut shell = HeadlessShell::new()
            .with_creation_lag(10)
            .with_creation_results(true);
        let mut widgets = resolver();
        let started = tokio::time::Instant::now();

        let outcome = widgets.open(&mut shell, &payload("welcome", "<p/>")).await;
        assert_eq!(
            outcome,
            OpenOutcome::Created {
                tab_id: "tab-1".to_string()
            }
        );
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn push_update_prunes_closed_tabs_and_ignores_closed_views() {
        let mut shell = HeadlessShell::new();
        let mut widgets = resolver();
        let update = payload("missing", "<p>new</p>");
        assert_eq!(widgets.push_update(&mut shell, &update), PushOutcome::NotOpen);
        assert_eq!(shell.created_count(), 0);

        widgets.open(&mut shell, &payload("missing", "<p>old</p>")).await;
        assert_eq!(widgets.push_update(&mut shell, &update), PushOutcome::Pushed);
        let container = widgets
            .entry(&CategoryKey::new("missing"))
            .expect("entry")
            .container_id
            .clone();
        assert_eq!(shell.content_of(&container), Some("<p>new</p>"));

        assert!(shell.close_tab("tab-1"));
        assert_eq!(widgets.push_update(&mut shell, &update), PushOutcome::Pruned);
        assert_eq!(widgets.state(&CategoryKey::new("missing")), WidgetState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn prune_drops_entries_for_closed_tabs() {
        let mut shell = HeadlessShell::new();
        let mut widgets = resolver();
        widgets.open(&mut shell, &payload("errors", "<p/>")).await;
        widgets.open(&mut shell, &payload("proxy", "<p/>")).await;
        assert_eq!(widgets.len(), 2);

        shell.close_tab("tab-1");
        assert_eq!(widgets.prune(&shell), vec![CategoryKey::new("errors")]);
        assert_eq!(widgets.len(), 1);
    }
}
