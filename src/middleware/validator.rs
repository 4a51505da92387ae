//! Input validation and normalization for notes, categories and users

use tracing::{debug, warn};

const TITLE_LENGTH: (usize, usize) = (5, 50);
const CONTENT_LENGTH: (usize, usize) = (10, 70);
const CATEGORY_LENGTH: (usize, usize) = (2, 30);
const USERNAME_LENGTH: (usize, usize) = (5, 20);
const PASSWORD_LENGTH: (usize, usize) = (5, 20);

/// Input validator
pub struct InputValidator;

impl InputValidator {
    /// Validate a note title and return it trimmed and title-cased
    pub fn title(title: &str) -> Result<String, ValidationError> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            warn!("Validation failed: empty title");
            return Err(ValidationError::EmptyTitle);
        }
        if has_triple_repeat(trimmed) {
            warn!("Validation failed: repeated letters in title");
            return Err(ValidationError::RepeatedLetters);
        }

        let formatted = title_case(trimmed);
        check_length(&formatted, TITLE_LENGTH, "title")?;

        debug!("Title validation passed");
        Ok(formatted)
    }

    /// Validate note content and return it trimmed and lowercased
    pub fn content(content: &str) -> Result<String, ValidationError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            warn!("Validation failed: empty content");
            return Err(ValidationError::EmptyContent);
        }

        let formatted = trimmed.to_lowercase();
        if has_triple_repeat(&formatted) {
            warn!("Validation failed: repeated letters in content");
            return Err(ValidationError::RepeatedLetters);
        }
        check_length(&formatted, CONTENT_LENGTH, "content")?;

        debug!("Content validation passed");
        Ok(formatted)
    }

    /// Validate a category name and return it title-cased
    pub fn category(name: &str) -> Result<String, ValidationError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyCategory);
        }
        if has_triple_repeat(trimmed) {
            return Err(ValidationError::RepeatedLetters);
        }

        let formatted = title_case(trimmed);
        check_length(&formatted, CATEGORY_LENGTH, "category")?;
        Ok(formatted)
    }

    /// Validate a username and return it lowercased
    pub fn username(username: &str) -> Result<String, ValidationError> {
        let length = username.chars().count();
        if length < USERNAME_LENGTH.0 || length > USERNAME_LENGTH.1 || has_triple_repeat(username) {
            warn!("Validation failed: invalid username");
            return Err(ValidationError::InvalidUsername);
        }
        Ok(username.to_lowercase())
    }

    pub fn password(password: &str) -> Result<(), ValidationError> {
        let length = password.chars().count();
        if length < PASSWORD_LENGTH.0 || length > PASSWORD_LENGTH.1 {
            return Err(ValidationError::InvalidPassword);
        }
        Ok(())
    }
}

/// True when any character appears three times in a row
fn has_triple_repeat(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn check_length(text: &str, (min, max): (usize, usize), field: &'static str) -> Result<(), ValidationError> {
    let length = text.chars().count();
    if length < min || length > max {
        warn!("Validation failed: {} length {} outside {}..={}", field, length, min, max);
        return Err(ValidationError::Length { field, min, max });
    }
    Ok(())
}

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("title cannot be empty")]
    EmptyTitle,

    #[error("content cannot be empty")]
    EmptyContent,

    #[error("category cannot be empty")]
    EmptyCategory,

    #[error("text cannot contain three consecutive repeated characters")]
    RepeatedLetters,

    #[error("{field} must be between {min} and {max} characters")]
    Length {
        field: &'static str,
        min: usize,
        max: usize,
    },

    #[error("username must be 5-20 characters without three consecutive repeated characters")]
    InvalidUsername,

    #[error("password must be 5-20 characters")]
    InvalidPassword,

    #[error("invalid note id: {0}")]
    InvalidNoteId(String),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("invalid query parameter: {0}")]
    InvalidQuery(String),
}
