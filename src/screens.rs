//! Plain-text rendering of the application's screens

use std::fmt::Write;

use crate::models::{Book, User};

/// Actions a user can take on a book from its details screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookAction {
    Borrow,
    Return,
    Edit,
    Delete,
}

impl BookAction {
    pub fn label(&self) -> &'static str {
        match self {
            BookAction::Borrow => "borrow",
            BookAction::Return => "return",
            BookAction::Edit => "edit",
            BookAction::Delete => "delete",
        }
    }
}

/// Actions offered to `user` for `book`
pub fn actions_for(book: &Book, user: &User) -> Vec<BookAction> {
    let mut actions = Vec::new();
    if user.is_staff {
        actions.extend([BookAction::Edit, BookAction::Delete]);
    }
    if book.available {
        actions.push(BookAction::Borrow);
    } else if user.has_borrowed(book) {
        actions.push(BookAction::Return);
    }
    actions
}

fn status(book: &Book) -> &'static str {
    if book.available {
        "Available"
    } else {
        "Borrowed"
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

fn table(books: &[Book]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>5}  {:<32}  {:<24}  {:<10}  {}",
        "ID", "TITLE", "AUTHOR", "TYPE", "STATUS"
    );
    for book in books {
        let _ = writeln!(
            out,
            "{:>5}  {:<32}  {:<24}  {:<10}  {}",
            book.id,
            truncate(&book.title, 32),
            truncate(&book.author, 24),
            book.book_type().label(),
            status(book)
        );
    }
    out
}

/// Book list, as shown on the dashboard
pub fn dashboard(books: &[Book], search: Option<&str>) -> String {
    let search = search.map(str::trim).filter(|s| !s.is_empty());
    if books.is_empty() {
        return match search {
            Some(q) => format!("No books found matching \"{}\".\n", q),
            None => "No books in the library yet.\n".to_string(),
        };
    }

    let mut out = String::new();
    if let Some(q) = search {
        let _ = writeln!(out, "Results for \"{}\":", q);
    }
    out.push_str(&table(books));
    out
}

/// Full view of one book, with what the user may do with it
pub fn book_details(book: &Book, user: &User) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}  [{}]", book.title, status(book));
    let _ = writeln!(out, "  Author:          {}", book.author);
    let _ = writeln!(out, "  ISBN:            {}", book.isbn);
    let _ = writeln!(out, "  Published:       {}", book.published_date.format("%Y-%m-%d"));
    let _ = writeln!(out, "  Type:            {}", book.book_type().label());
    let _ = writeln!(out, "  Details:         {}", book.format.describe());

    if user.has_borrowed(book) {
        let _ = writeln!(out, "  You are currently borrowing this book.");
    }

    let actions: Vec<&str> = actions_for(book, user).iter().map(BookAction::label).collect();
    if !actions.is_empty() {
        let _ = writeln!(out, "  Actions:         {}", actions.join(", "));
    }
    out
}

/// Books the user is currently borrowing
pub fn my_books(books: &[Book]) -> String {
    if books.is_empty() {
        return "You haven't borrowed any books yet.\n".to_string();
    }
    table(books)
}

pub fn user_summary(user: &User) -> String {
    let role = if user.is_staff { "staff" } else { "member" };
    match user.id {
        Some(id) => format!("{} (id {}, {})\n", user.username, id, role),
        None => format!("{} ({})\n", user.username, role),
    }
}
