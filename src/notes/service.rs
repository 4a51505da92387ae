//! Business rules for notes and user accounts
//!
//! Every note operation is scoped to the verified subject; touching a note
//! owned by someone else is rejected before any change is made.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::models::{Category, NewNote, Note, User};
use super::store::NoteStore;
use crate::error::{NoteError, NotesError, Result};
use crate::middleware::{AuthError, CredentialAuthority, InputValidator};

/// Maximum categories per note
pub const MAX_CATEGORIES: usize = 4;

/// Replacement values for an existing note
#[derive(Debug, Clone, Deserialize)]
pub struct NoteUpdate {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub is_archived: bool,
}

/// Note operations
#[derive(Clone)]
pub struct NotesService {
    store: Arc<dyn NoteStore>,
}

impl NotesService {
    pub fn new(store: Arc<dyn NoteStore>) -> Self {
        Self { store }
    }

    /// Create a note for `subject`
    pub async fn create(&self, subject: u64, title: &str, content: &str, categories: &[String]) -> Result<Note> {
        let title = InputValidator::title(title)?;
        let content = InputValidator::content(content)?;
        let names = category_names(categories)?;

        if self.store.note_by_title(&title).await?.is_some() {
            return Err(NoteError::DuplicateTitle.into());
        }

        let categories = self.resolve_categories(&names).await?;
        let note = self
            .store
            .insert_note(NewNote {
                title,
                content,
                categories,
                user_id: subject,
            })
            .await?;

        info!(note_id = note.id, user_id = subject, "Note created");
        Ok(note)
    }

    /// Fetch a note owned by `subject`
    pub async fn get(&self, subject: u64, note_id: u64) -> Result<Note> {
        let note = self
            .store
            .note(note_id)
            .await?
            .ok_or(NoteError::NoteNotFound(note_id))?;

        if note.user_id != subject {
            debug!(note_id, user_id = subject, "Note owned by another user");
            return Err(NoteError::NotOwnedByUser.into());
        }
        Ok(note)
    }

    pub async fn list(&self, subject: u64) -> Result<Vec<Note>> {
        let notes = self.store.notes_for_user(subject).await?;
        if notes.is_empty() {
            return Err(NoteError::NoNotesFound.into());
        }
        Ok(notes)
    }

    /// Replace title, content, categories and archive flag
    pub async fn update(&self, subject: u64, note_id: u64, update: NoteUpdate) -> Result<Note> {
        let mut note = self.get(subject, note_id).await?;

        let title = InputValidator::title(&update.title)?;
        if let Some(other) = self.store.note_by_title(&title).await? {
            if other.id != note.id {
                return Err(NoteError::DuplicateTitle.into());
            }
        }
        let content = InputValidator::content(&update.content)?;
        let names = category_names(&update.categories)?;

        let unchanged = note.title == title
            && note.content == content
            && note.is_archived == update.is_archived
            && same_categories(&note.categories, &names);
        if unchanged {
            return Err(NoteError::NoChangesDetected.into());
        }

        note.categories = self.resolve_categories(&names).await?;
        note.title = title;
        note.content = content;
        note.is_archived = update.is_archived;

        self.store.save_note(note).await
    }

    /// Delete a note and return its id
    pub async fn delete(&self, subject: u64, note_id: u64) -> Result<u64> {
        let note = self.get(subject, note_id).await?;
        self.store.delete_note(note.id).await?;
        info!(note_id, user_id = subject, "Note deleted");
        Ok(note.id)
    }

    pub async fn toggle_archive(&self, subject: u64, note_id: u64) -> Result<Note> {
        let mut note = self.get(subject, note_id).await?;
        note.is_archived = !note.is_archived;
        self.store.save_note(note).await
    }

    pub async fn add_category(&self, subject: u64, note_id: u64, name: &str) -> Result<Note> {
        let mut note = self.get(subject, note_id).await?;
        if note.categories.len() >= MAX_CATEGORIES {
            return Err(NoteError::TooManyCategories { max: MAX_CATEGORIES }.into());
        }

        let name = InputValidator::category(name)?;
        if note.has_category(&name) {
            return Err(NoteError::CategoryAlreadyAdded.into());
        }

        let category = self.store.category_get_or_create(&name).await?;
        note.categories.push(category);
        self.store.save_note(note).await
    }

    pub async fn remove_category(&self, subject: u64, note_id: u64, name: &str) -> Result<Note> {
        let mut note = self.get(subject, note_id).await?;
        if note.categories.len() <= 1 {
            return Err(NoteError::MinCategory.into());
        }

        let name = InputValidator::category(name)?;
        if !note.has_category(&name) {
            return Err(NoteError::CategoryNotOnNote.into());
        }

        note.categories.retain(|category| category.name != name);
        self.store.save_note(note).await
    }

    /// Notes of `subject` matching the archive flag and holding any of the
    /// given categories. Absent filters match everything.
    pub async fn filter(&self, subject: u64, is_archived: Option<bool>, categories: &[String]) -> Result<Vec<Note>> {
        let names = categories
            .iter()
            .map(|name| InputValidator::category(name))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let notes: Vec<Note> = self
            .store
            .notes_for_user(subject)
            .await?
            .into_iter()
            .filter(|note| is_archived.map_or(true, |archived| note.is_archived == archived))
            .filter(|note| names.is_empty() || names.iter().any(|name| note.has_category(name)))
            .collect();

        if notes.is_empty() {
            return Err(NoteError::NoNotesFound.into());
        }
        Ok(notes)
    }

    async fn resolve_categories(&self, names: &[String]) -> Result<Vec<Category>> {
        let mut categories = Vec::with_capacity(names.len());
        for name in names {
            categories.push(self.store.category_get_or_create(name).await?);
        }
        Ok(categories)
    }
}

/// Validate, format and deduplicate category names, enforcing 1..=4
fn category_names(raw: &[String]) -> Result<Vec<String>> {
    let mut names: Vec<String> = Vec::with_capacity(raw.len());
    for name in raw {
        let name = InputValidator::category(name)?;
        if !names.contains(&name) {
            names.push(name);
        }
    }

    if names.len() > MAX_CATEGORIES {
        return Err(NoteError::TooManyCategories { max: MAX_CATEGORIES }.into());
    }
    if names.is_empty() {
        return Err(NoteError::MinCategory.into());
    }
    Ok(names)
}

fn same_categories(existing: &[Category], names: &[String]) -> bool {
    existing.len() == names.len() && names.iter().all(|name| existing.iter().any(|c| &c.name == name))
}

/// Account registration and login
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn NoteStore>,
    authority: Arc<CredentialAuthority>,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(store: Arc<dyn NoteStore>, authority: Arc<CredentialAuthority>, bcrypt_cost: u32) -> Self {
        Self {
            store,
            authority,
            bcrypt_cost,
        }
    }

    /// Create an account and issue its first credential
    pub async fn register(&self, user_name: &str, password: &str) -> Result<(User, String)> {
        let user_name = InputValidator::username(user_name)?;
        InputValidator::password(password)?;

        if self.store.user_by_name(&user_name).await?.is_some() {
            return Err(NoteError::UserAlreadyExists.into());
        }

        let password = password.to_string();
        let cost = self.bcrypt_cost;
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| NoteError::Hashing(e.to_string()))?
            .map_err(|e| NoteError::Hashing(e.to_string()))?;

        let user = self.store.insert_user(&user_name, hash).await?;
        let token = self.authority.issue(user.id)?;

        info!(user_id = user.id, "User registered");
        Ok((user, token))
    }

    /// Check a username/password pair and issue a credential
    pub async fn login(&self, user_name: &str, password: &str) -> Result<(User, String)> {
        let user_name = user_name.trim().to_lowercase();
        let user = self
            .store
            .user_by_name(&user_name)
            .await?
            .ok_or(NotesError::Auth(AuthError::InvalidLogin))?;

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| NoteError::Hashing(e.to_string()))?
            .unwrap_or(false);

        if !valid {
            debug!(user_id = user.id, "Password mismatch");
            return Err(AuthError::InvalidLogin.into());
        }

        let token = self.authority.issue(user.id)?;
        info!(user_id = user.id, "User logged in");
        Ok((user, token))
    }

    pub fn authority(&self) -> &CredentialAuthority {
        &self.authority
    }
}
