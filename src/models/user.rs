//! User identity and authentication payloads

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::book::Book;

/// Identity returned by `/auth/me/`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Not every backend version sends it
    #[serde(default)]
    pub id: Option<i64>,
    pub username: String,
    /// Staff members may create, edit and delete books
    #[serde(default)]
    pub is_staff: bool,
}

impl User {
    /// Whether `book` is currently lent to this user.
    ///
    /// Always false when the backend did not tell us the user's id.
    pub fn has_borrowed(&self, book: &Book) -> bool {
        self.id.is_some_and(|id| book.is_borrowed_by(id))
    }
}

/// Login and registration request
#[derive(Debug, Clone, Serialize, Validate)]
pub struct Credentials {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Login response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Acknowledgement body (`{"detail": "..."}`) returned by register, borrow and return
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub detail: Option<String>,
}

impl ApiMessage {
    /// Server-provided text, or `fallback` when the body carried none
    pub fn text_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.detail.as_deref().unwrap_or(fallback)
    }
}
