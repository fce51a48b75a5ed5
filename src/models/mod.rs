//! Data models exchanged with the library backend

pub mod book;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookForm, BookFormat, BookPatch, BookType};
pub use user::{ApiMessage, Credentials, TokenResponse, User};
