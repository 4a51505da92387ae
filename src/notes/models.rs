//! Domain models for notes, categories and users

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A named label shared across notes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A user's note
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub id: u64,
    pub title: String,
    pub content: String,
    pub categories: Vec<Category>,
    pub user_id: u64,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Note {
    pub fn has_category(&self, name: &str) -> bool {
        self.categories.iter().any(|category| category.name == name)
    }
}

/// Fields of a note before the store assigns an id
#[derive(Debug, Clone)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub categories: Vec<Category>,
    pub user_id: u64,
}

/// A registered account
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: u64,
    pub user_name: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}
