//! Notes, categories and user accounts

pub mod models;
pub mod service;
pub mod store;

pub use models::{Category, NewNote, Note, User};
pub use service::{NoteUpdate, NotesService, UserService, MAX_CATEGORIES};
pub use store::{InMemoryStore, NoteStore};
