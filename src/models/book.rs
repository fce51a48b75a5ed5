//! Book model and the form payloads used to create and edit books.
//!
//! The backend stores every type-specific column on the same row and nulls
//! out the ones that do not apply. Here the `book_type` discriminator and its
//! single meaningful attribute travel together in [`BookFormat`], so a
//! printed book cannot carry a file format or a duration.

use std::borrow::Cow;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Physical or digital form of a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookType {
    #[default]
    Printed,
    Ebook,
    Audiobook,
}

impl BookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookType::Printed => "printed",
            BookType::Ebook => "ebook",
            BookType::Audiobook => "audiobook",
        }
    }

    /// Human label used by the screens
    pub fn label(&self) -> &'static str {
        match self {
            BookType::Printed => "Printed",
            BookType::Ebook => "Ebook",
            BookType::Audiobook => "Audiobook",
        }
    }
}

impl std::fmt::Display for BookType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BookType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "printed" => Ok(BookType::Printed),
            "ebook" => Ok(BookType::Ebook),
            "audiobook" => Ok(BookType::Audiobook),
            _ => Err(format!(
                "Invalid book type '{}'. Must be 'printed', 'ebook', or 'audiobook'.",
                s
            )),
        }
    }
}

/// Type-specific attribute, tagged on the wire by `book_type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "book_type", rename_all = "lowercase")]
pub enum BookFormat {
    Printed {
        #[serde(default)]
        pages: Option<u32>,
    },
    Ebook {
        #[serde(default)]
        file_format: Option<String>,
    },
    Audiobook {
        /// Running time in minutes
        #[serde(default)]
        duration: Option<u32>,
    },
}

impl Default for BookFormat {
    fn default() -> Self {
        BookFormat::Printed { pages: None }
    }
}

impl BookFormat {
    pub fn book_type(&self) -> BookType {
        match self {
            BookFormat::Printed { .. } => BookType::Printed,
            BookFormat::Ebook { .. } => BookType::Ebook,
            BookFormat::Audiobook { .. } => BookType::Audiobook,
        }
    }

    /// Empty format of the given type, as a form starts out
    pub fn empty(book_type: BookType) -> Self {
        match book_type {
            BookType::Printed => BookFormat::Printed { pages: None },
            BookType::Ebook => BookFormat::Ebook { file_format: None },
            BookType::Audiobook => BookFormat::Audiobook { duration: None },
        }
    }

    /// Check that the attribute required by the book type is present and sane
    pub fn check(&self) -> Result<(), ValidationError> {
        match self {
            BookFormat::Printed { pages } => match pages {
                None => Err(required("pages", "Pages is required for printed books.")),
                Some(0) => Err(required("pages", "Pages must be a positive integer.")),
                Some(_) => Ok(()),
            },
            BookFormat::Ebook { file_format } => match file_format.as_deref().map(str::trim) {
                None | Some("") => Err(required(
                    "file_format",
                    "File format is required for ebooks.",
                )),
                Some(f) if f.chars().count() > 10 => Err(required(
                    "file_format",
                    "File format must be at most 10 characters.",
                )),
                Some(_) => Ok(()),
            },
            BookFormat::Audiobook { duration } => match duration {
                None => Err(required(
                    "duration",
                    "Duration is required for audiobooks.",
                )),
                Some(0) => Err(required("duration", "Duration must be a positive integer.")),
                Some(_) => Ok(()),
            },
        }
    }

    /// One-line description of the type-specific attribute
    pub fn describe(&self) -> String {
        match self {
            BookFormat::Printed { pages: Some(p) } => format!("{} pages", p),
            BookFormat::Ebook { file_format: Some(f) } => format!("{} file", f),
            BookFormat::Audiobook { duration: Some(d) } => format!("{} minutes", d),
            other => other.book_type().label().to_string(),
        }
    }
}

fn required(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

/// A book as returned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub published_date: NaiveDate,
    pub available: bool,
    /// Id of the user currently holding the book
    #[serde(default)]
    pub borrowed_by: Option<i64>,
    #[serde(flatten)]
    pub format: BookFormat,
}

impl Book {
    pub fn book_type(&self) -> BookType {
        self.format.book_type()
    }

    pub fn is_borrowed_by(&self, user_id: i64) -> bool {
        !self.available && self.borrowed_by == Some(user_id)
    }

    /// `available` and `borrowed_by` agree with each other
    pub fn is_consistent(&self) -> bool {
        self.available == self.borrowed_by.is_none()
    }
}

/// Payload for creating a book or replacing one in full
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_book_format", skip_on_field_errors = false))]
pub struct BookForm {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    #[validate(length(min = 1, max = 13, message = "ISBN is required (at most 13 characters)"))]
    pub isbn: String,
    pub published_date: NaiveDate,
    pub available: bool,
    #[serde(flatten)]
    pub format: BookFormat,
}

fn validate_book_format(form: &BookForm) -> Result<(), ValidationError> {
    form.format.check()
}

impl BookForm {
    /// Blank form as the "new book" screen presents it
    pub fn new(published_date: NaiveDate) -> Self {
        Self {
            title: String::new(),
            author: String::new(),
            isbn: String::new(),
            published_date,
            available: true,
            format: BookFormat::default(),
        }
    }

    /// Switch the book type, dropping the attribute of the previous type
    pub fn set_book_type(&mut self, book_type: BookType) {
        if self.format.book_type() != book_type {
            self.format = BookFormat::empty(book_type);
        }
    }
}

impl From<&Book> for BookForm {
    fn from(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            published_date: book.published_date,
            available: book.available,
            format: book.format.clone(),
        }
    }
}

/// Payload for a partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BookPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    #[serde(flatten)]
    pub format: Option<BookFormat>,
}

impl BookPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.isbn.is_none()
            && self.published_date.is_none()
            && self.available.is_none()
            && self.format.is_none()
    }
}

impl Validate for BookPatch {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        let mut errors = validator::ValidationErrors::new();
        for (field, value) in [("title", &self.title), ("author", &self.author), ("isbn", &self.isbn)] {
            if matches!(value.as_deref().map(str::trim), Some("")) {
                errors.add(field, required("required", "Fields cannot be blanked out"));
            }
        }
        if let Some(format) = &self.format {
            if let Err(e) = format.check() {
                errors.add("__all__", e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
