//! Seam between the engine and the UI shell that hosts detail views.
//!
//! The shell inserts widgets asynchronously and, in the integration surface
//! the panel targets, never hands back the tab id of what it just created.
//! Everything the resolver knows about host identity comes from tab-strip
//! snapshots taken through this trait.

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("unknown dock region: {0}")]
    UnknownRegion(String),
    #[error("unknown container: {0}")]
    UnknownContainer(String),
    #[error("host rejected request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabDirection {
    Previous,
    Next,
}

/// Opaque handle the host returns for a created widget. It is not the tab id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetHandle(pub u64);

/// Client-chosen marker for the content container of a detail view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn generate() -> Self {
        Self(format!("promptml-popup-{}", Uuid::new_v4().simple()))
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait HostShell {
    /// Tab ids of a dock region, in tab-strip order.
    fn tab_ids(&self, region: &str) -> Vec<String>;

    /// Tab currently focused in the region, if any.
    fn current_tab(&self, region: &str) -> Option<String>;

    fn contains_tab(&self, tab_id: &str) -> bool;

    fn create_widget(
        &mut self,
        region: &str,
        title: &str,
        container: &ContainerId,
    ) -> Result<WidgetHandle, HostError>;

    /// Replaces the whole content of a container.
    fn set_content(&mut self, container: &ContainerId, markup: &str) -> Result<(), HostError>;

    fn activate_adjacent(&mut self, region: &str, direction: TabDirection)
        -> Result<(), HostError>;

    /// Tab id assigned to a created widget, for hosts that report it.
    fn creation_result(&self, _handle: WidgetHandle) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
struct HeadlessTab {
    tab_id: String,
    region: String,
    title: String,
    handle: Option<WidgetHandle>,
    container: Option<ContainerId>,
    content: String,
    visible_after: u64,
}

/// In-process shell used by the sidecar and tests.
///
/// Created tabs only show up in `tab_ids` after `creation_lag` further
/// snapshots, which reproduces the host inserting widgets after the create
/// call has returned.
#[derive(Debug)]
pub struct HeadlessShell {
    tabs: Vec<HeadlessTab>,
    current: HashMap<String, String>,
    snapshots: Cell<u64>,
    creation_lag: u64,
    reports_creation: bool,
    next_tab: u64,
    next_handle: u64,
    created: usize,
    activations: Vec<TabDirection>,
}

impl Default for HeadlessShell {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessShell {
    pub fn new() -> Self {
        Self {
            tabs: Vec::new(),
            current: HashMap::new(),
            snapshots: Cell::new(0),
            creation_lag: 0,
            reports_creation: false,
            next_tab: 1,
            next_handle: 1,
            created: 0,
            activations: Vec::new(),
        }
    }

    pub fn with_creation_lag(mut self, snapshots: u64) -> Self {
        self.creation_lag = snapshots;
        self
    }

    pub fn with_creation_results(mut self, enabled: bool) -> Self {
        self.reports_creation = enabled;
        self
    }

    /// Adds a tab the panel did not create, e.g. a notebook.
    pub fn open_foreign_tab(&mut self, region: &str, title: &str) -> String {
        let tab_id = self.allocate_tab_id();
        self.tabs.push(HeadlessTab {
            tab_id: tab_id.clone(),
            region: region.to_string(),
            title: title.to_string(),
            handle: None,
            container: None,
            content: String::new(),
            visible_after: 0,
        });
        self.current.insert(region.to_string(), tab_id.clone());
        tab_id
    }

    /// Closes a tab the way the user would through the native close button.
    pub fn close_tab(&mut self, tab_id: &str) -> bool {
        let Some(index) = self.tabs.iter().position(|tab| tab.tab_id == tab_id) else {
            return false;
        };
        let removed = self.tabs.remove(index);
        if self.current.get(&removed.region).map(String::as_str) == Some(tab_id) {
            let fallback = self
                .region_tabs(&removed.region)
                .last()
                .map(|tab| tab.tab_id.clone());
            match fallback {
                Some(next) => {
                    self.current.insert(removed.region, next);
                }
                None => {
                    self.current.remove(&removed.region);
                }
            }
        }
        true
    }

    pub fn activate(&mut self, tab_id: &str) -> bool {
        let Some(region) = self
            .tabs
            .iter()
            .find(|tab| tab.tab_id == tab_id)
            .map(|tab| tab.region.clone())
        else {
            return false;
        };
        self.current.insert(region, tab_id.to_string());
        true
    }

    pub fn content_of(&self, container: &ContainerId) -> Option<&str> {
        self.tabs
            .iter()
            .find(|tab| tab.container.as_ref() == Some(container))
            .map(|tab| tab.content.as_str())
    }

    pub fn title_of(&self, tab_id: &str) -> Option<&str> {
        self.tabs
            .iter()
            .find(|tab| tab.tab_id == tab_id)
            .map(|tab| tab.title.as_str())
    }

    pub fn created_count(&self) -> usize {
        self.created
    }

    pub fn activations(&self) -> &[TabDirection] {
        &self.activations
    }

    fn allocate_tab_id(&mut self) -> String {
        let tab_id = format!("tab-{}", self.next_tab);
        self.next_tab += 1;
        tab_id
    }

    fn is_visible(&self, tab: &HeadlessTab) -> bool {
        self.snapshots.get() >= tab.visible_after
    }

    fn region_tabs<'a>(&'a self, region: &'a str) -> impl Iterator<Item = &'a HeadlessTab> + 'a {
        self.tabs
            .iter()
            .filter(move |tab| tab.region == region && self.is_visible(tab))
    }
}

impl HostShell for HeadlessShell {
    fn tab_ids(&self, region: &str) -> Vec<String> {
        self.snapshots.set(self.snapshots.get() + 1);
        self.region_tabs(region)
            .map(|tab| tab.tab_id.clone())
            .collect()
    }

    fn current_tab(&self, region: &str) -> Option<String> {
        self.current.get(region).cloned()
    }

    fn contains_tab(&self, tab_id: &str) -> bool {
        self.tabs
            .iter()
            .any(|tab| tab.tab_id == tab_id && self.is_visible(tab))
    }

    fn create_widget(
        &mut self,
        region: &str,
        title: &str,
        container: &ContainerId,
    ) -> Result<WidgetHandle, HostError> {
        if region.trim().is_empty() {
            return Err(HostError::UnknownRegion(region.to_string()));
        }
        let handle = WidgetHandle(self.next_handle);
        self.next_handle += 1;
        let tab_id = self.allocate_tab_id();
        self.tabs.push(HeadlessTab {
            tab_id: tab_id.clone(),
            region: region.to_string(),
            title: title.to_string(),
            handle: Some(handle),
            container: Some(container.clone()),
            content: String::new(),
            visible_after: self.snapshots.get() + self.creation_lag,
        });
        self.current.insert(region.to_string(), tab_id);
        self.created += 1;
        Ok(handle)
    }

    fn set_content(&mut self, container: &ContainerId, markup: &str) -> Result<(), HostError> {
        let tab = self
            .tabs
            .iter_mut()
            .find(|tab| tab.container.as_ref() == Some(container))
            .ok_or_else(|| HostError::UnknownContainer(container.to_string()))?;
        tab.content = markup.to_string();
        Ok(())
    }

    fn activate_adjacent(
        &mut self,
        region: &str,
        direction: TabDirection,
    ) -> Result<(), HostError> {
        let ids = self
            .region_tabs(region)
            .map(|tab| tab.tab_id.clone())
            .collect::<Vec<_>>();
        if ids.is_empty() {
            return Err(HostError::UnknownRegion(region.to_string()));
        }
        let current = self
            .current
            .get(region)
            .and_then(|current| ids.iter().position(|id| id == current))
            .unwrap_or(0);
        let next = match direction {
            TabDirection::Next => (current + 1) % ids.len(),
            TabDirection::Previous => (current + ids.len() - 1) % ids.len(),
        };
        self.current.insert(region.to_string(), ids[next].clone());
        self.activations.push(direction);
        Ok(())
    }

    fn creation_result(&self, handle: WidgetHandle) -> Option<String> {
        if !self.reports_creation {
            return None;
        }
        self.tabs
            .iter()
            .find(|tab| tab.handle == Some(handle))
            .map(|tab| tab.tab_id.clone())
    }
}
