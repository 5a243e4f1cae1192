//! Condensed notes shown in the sidebar panel, newest first.

use crate::builder::BuiltNote;
use promptml_core::{CategoryKey, NotePayload};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub u64);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct PanelNote {
    pub id: NoteId,
    pub category_key: CategoryKey,
    pub markup: String,
    /// Markup with tags stripped; the dedup identity of the note.
    pub text: String,
    pub payload: Arc<NotePayload>,
    pub expanded: bool,
    pub was_closed: bool,
    pub clicked: bool,
}

impl PanelNote {
    pub fn classes(&self) -> Vec<&'static str> {
        let mut classes = vec!["note"];
        classes.push(if self.expanded { "expanded" } else { "condensed" });
        if self.was_closed {
            classes.push("wasClosed");
        }
        if self.clicked {
            classes.push("clicked");
        }
        classes
    }
}

/// Emitted when the user clicks a note; consumed by the widget resolver.
#[derive(Debug, Clone)]
pub struct NoteSelected {
    pub note_id: NoteId,
    pub payload: Arc<NotePayload>,
}

pub fn rendered_text(markup: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"));
    tags.replace_all(markup, "").into_owned()
}

#[derive(Debug, Default)]
pub struct PanelList {
    notes: Vec<PanelNote>,
    next_id: u64,
}

impl PanelList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts at the front and removes every other note with the same
    /// rendered text. Returns the new id and the ids that were removed.
    pub fn insert_front(&mut self, built: &BuiltNote) -> (NoteId, Vec<NoteId>) {
        self.next_id += 1;
        let id = NoteId(self.next_id);
        let text = rendered_text(&built.condensed);
        let mut removed = Vec::new();
        self.notes.retain(|note| {
            if note.text == text {
                removed.push(note.id);
                false
            } else {
                true
            }
        });
        self.notes.insert(
            0,
            PanelNote {
                id,
                category_key: built.payload.category_key.clone(),
                markup: built.condensed.clone(),
                text,
                payload: Arc::clone(&built.payload),
                expanded: false,
                was_closed: false,
                clicked: false,
            },
        );
        (id, removed)
    }

    /// Marks the note seen and returns the event for the resolver.
    pub fn select(&mut self, id: NoteId) -> Option<NoteSelected> {
        let note = self.notes.iter_mut().find(|note| note.id == id)?;
        note.clicked = true;
        let payload = if note.payload.is_empty() {
            Arc::new(NotePayload::placeholder(
                note.category_key.clone(),
                note.payload.originating_message.clone(),
            ))
        } else {
            Arc::clone(&note.payload)
        };
        Some(NoteSelected {
            note_id: id,
            payload,
        })
    }

    /// Toggles `wasClosed`. Closing collapses the note and sends it to the
    /// back; reopening brings it to the front. Returns the new state.
    pub fn dismiss(&mut self, id: NoteId) -> Option<bool> {
        let index = self.position(id)?;
        let mut note = self.notes.remove(index);
        note.was_closed = !note.was_closed;
        let closed = note.was_closed;
        if closed {
            note.expanded = false;
            self.notes.push(note);
        } else {
            self.notes.insert(0, note);
        }
        Some(closed)
    }

    pub fn toggle_expanded(&mut self, id: NoteId) -> Option<bool> {
        let note = self.notes.iter_mut().find(|note| note.id == id)?;
        note.expanded = !note.expanded;
        Some(note.expanded)
    }

    pub fn get(&self, id: NoteId) -> Option<&PanelNote> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn notes(&self) -> &[PanelNote] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }

    fn position(&self, id: NoteId) -> Option<usize> {
        self.notes.iter().position(|note| note.id == id)
    }
}
