//! Per-user notes kept in memory.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_CONTENT_CHARS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub id: u64,
    pub owner: String,
    pub title: String,
    pub content: String,
    pub created_at: String,
}

impl Note {
    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle) || self.content.to_lowercase().contains(needle)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NoteError {
    #[error("Title is required")]
    MissingTitle,
    #[error("Title must be at most {} characters", MAX_TITLE_CHARS)]
    TitleTooLong,
    #[error("Content must be at most {} characters", MAX_CONTENT_CHARS)]
    ContentTooLong,
    #[error("Note not found")]
    NotFound { id: u64 },
    #[error("You can only delete your own notes")]
    NotOwner { id: u64, owner: String },
}

#[derive(Debug, Default)]
struct NoteBook {
    last_id: u64,
    notes: BTreeMap<u64, Note>,
}

/// Notes for every user, keyed by id. Ids increase monotonically and are
/// never reused, so iteration order is creation order.
#[derive(Debug, Clone, Default)]
pub struct NoteStore {
    inner: Arc<RwLock<NoteBook>>,
}

impl NoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, owner: &str, title: &str, content: &str) -> Result<Note, NoteError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(NoteError::MissingTitle);
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(NoteError::TitleTooLong);
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(NoteError::ContentTooLong);
        }

        let created_at = humantime::format_rfc3339_seconds(SystemTime::now()).to_string();
        let mut book = self.inner.write().await;
        book.last_id += 1;
        let note = Note {
            id: book.last_id,
            owner: owner.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            created_at,
        };
        book.notes.insert(note.id, note.clone());
        Ok(note)
    }

    pub async fn list(&self, owner: &str) -> Vec<Note> {
        let book = self.inner.read().await;
        book.notes
            .values()
            .filter(|note| note.owner == owner)
            .cloned()
            .collect::<Vec<_>>()
    }

    /// Case-insensitive substring search over the owner's titles and
    /// contents. An empty query matches every note.
    pub async fn search(&self, owner: &str, query: &str) -> Vec<Note> {
        let needle = query.trim().to_lowercase();
        let book = self.inner.read().await;
        book.notes
            .values()
            .filter(|note| note.owner == owner && note.matches(&needle))
            .cloned()
            .collect::<Vec<_>>()
    }

    pub async fn delete(&self, owner: &str, id: u64) -> Result<Note, NoteError> {
        let mut book = self.inner.write().await;
        let existing = book.notes.get(&id).ok_or(NoteError::NotFound { id })?;
        if existing.owner != owner {
            return Err(NoteError::NotOwner {
                id,
                owner: existing.owner.clone(),
            });
        }
        book.notes.remove(&id).ok_or(NoteError::NotFound { id })
    }

    pub async fn all(&self) -> Vec<Note> {
        self.inner.read().await.notes.values().cloned().collect()
    }
}
