//! Persistence boundary for users, notes and categories

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::models::{Category, NewNote, Note, User};
use crate::error::{NoteError, Result};

/// Trait for note storage operations
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Insert a user; fails if the name is taken
    async fn insert_user(&self, user_name: &str, password_hash: String) -> Result<User>;

    async fn user_by_name(&self, user_name: &str) -> Result<Option<User>>;

    async fn user_by_id(&self, id: u64) -> Result<Option<User>>;

    /// Look up a category by name, creating it if missing
    async fn category_get_or_create(&self, name: &str) -> Result<Category>;

    /// Insert a note; fails if another note has the same title
    async fn insert_note(&self, note: NewNote) -> Result<Note>;

    async fn note(&self, id: u64) -> Result<Option<Note>>;

    async fn note_by_title(&self, title: &str) -> Result<Option<Note>>;

    /// Replace a stored note, stamping `updated_at`
    async fn save_note(&self, note: Note) -> Result<Note>;

    async fn delete_note(&self, id: u64) -> Result<()>;

    /// All notes owned by a user, ordered by id
    async fn notes_for_user(&self, user_id: u64) -> Result<Vec<Note>>;
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<u64, User>,
    notes: BTreeMap<u64, Note>,
    categories: BTreeMap<String, Category>,
    next_id: u64,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local store backed by ordered maps
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NoteStore for InMemoryStore {
    async fn insert_user(&self, user_name: &str, password_hash: String) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|user| user.user_name == user_name) {
            return Err(NoteError::UserAlreadyExists.into());
        }

        let user = User {
            id: tables.next_id(),
            user_name: user_name.to_string(),
            password_hash,
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_name(&self, user_name: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|user| user.user_name == user_name).cloned())
    }

    async fn user_by_id(&self, id: u64) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn category_get_or_create(&self, name: &str) -> Result<Category> {
        let mut tables = self.tables.write().await;
        if let Some(category) = tables.categories.get(name) {
            return Ok(category.clone());
        }

        let category = Category {
            id: tables.next_id(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        tables.categories.insert(name.to_string(), category.clone());
        Ok(category)
    }

    async fn insert_note(&self, note: NewNote) -> Result<Note> {
        let mut tables = self.tables.write().await;
        if tables.notes.values().any(|existing| existing.title == note.title) {
            return Err(NoteError::DuplicateTitle.into());
        }

        let note = Note {
            id: tables.next_id(),
            title: note.title,
            content: note.content,
            categories: note.categories,
            user_id: note.user_id,
            is_archived: false,
            created_at: Utc::now(),
            updated_at: None,
        };
        tables.notes.insert(note.id, note.clone());
        Ok(note)
    }

    async fn note(&self, id: u64) -> Result<Option<Note>> {
        Ok(self.tables.read().await.notes.get(&id).cloned())
    }

    async fn note_by_title(&self, title: &str) -> Result<Option<Note>> {
        let tables = self.tables.read().await;
        Ok(tables.notes.values().find(|note| note.title == title).cloned())
    }

    async fn save_note(&self, mut note: Note) -> Result<Note> {
        let mut tables = self.tables.write().await;
        let Some(slot) = tables.notes.get_mut(&note.id) else {
            return Err(NoteError::NoteNotFound(note.id).into());
        };

        note.updated_at = Some(Utc::now());
        *slot = note.clone();
        Ok(note)
    }

    async fn delete_note(&self, id: u64) -> Result<()> {
        self.tables
            .write()
            .await
            .notes
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| NoteError::NoteNotFound(id).into())
    }

    async fn notes_for_user(&self, user_id: u64) -> Result<Vec<Note>> {
        let tables = self.tables.read().await;
        Ok(tables.notes.values().filter(|note| note.user_id == user_id).cloned().collect())
    }
}
