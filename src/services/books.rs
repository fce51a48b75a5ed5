//! Book reads and writes.
//!
//! Reads go through two caches: book lists keyed by their search term and
//! single books keyed by id. Writes always hit the backend and, once they
//! succeed, mark stale the affected book and every list.

use std::sync::Arc;

use tokio::sync::watch;
use validator::Validate;

use super::cache::{Freshness, QueryCache, RetryPolicy};
use super::session::{SessionData, SessionState};
use crate::{
    api::ApiClient,
    error::{ClientError, ClientResult},
    models::{ApiMessage, Book, BookForm, BookPatch},
};

/// Cache key of a book list: the trimmed search term, `None` for all books
pub type ListKey = Option<String>;

fn list_key(search: Option<&str>) -> ListKey {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

#[derive(Clone, Debug)]
pub struct BookService {
    api: ApiClient,
    session: watch::Receiver<SessionState>,
    lists: QueryCache<ListKey, Vec<Book>>,
    books: QueryCache<i64, Book>,
}

impl BookService {
    pub fn new(api: ApiClient, session: watch::Receiver<SessionState>, retry: RetryPolicy) -> Self {
        Self {
            api,
            session,
            lists: QueryCache::new("books", retry),
            books: QueryCache::new("book", retry),
        }
    }

    fn token(&self) -> ClientResult<String> {
        self.session
            .borrow()
            .token()
            .map(str::to_owned)
            .ok_or_else(|| ClientError::Auth("Not authenticated".to_string()))
    }

    /// Books matching `search` in title or author, all books when `None`
    pub async fn list_books(&self, search: Option<&str>) -> ClientResult<Arc<Vec<Book>>> {
        let token = self.token()?;
        let key = list_key(search);
        let api = self.api.clone();
        let search = key.clone();

        self.lists
            .fetch(key, move || {
                let api = api.clone();
                let token = token.clone();
                let search = search.clone();
                async move { api.list_books(&token, search.as_deref()).await }
            })
            .await
    }

    pub async fn get_book(&self, id: i64) -> ClientResult<Arc<Book>> {
        let token = self.token()?;
        let api = self.api.clone();

        self.books
            .fetch(id, move || {
                let api = api.clone();
                let token = token.clone();
                async move { api.get_book(&token, id).await }
            })
            .await
    }

    /// Books currently borrowed by the logged-in user
    pub async fn my_books(&self) -> ClientResult<Vec<Book>> {
        let user = self
            .session
            .borrow()
            .user()
            .cloned()
            .ok_or_else(|| ClientError::Auth("Not authenticated".to_string()))?;
        if user.id.is_none() {
            tracing::debug!("No user id for {}, borrowed books cannot be matched", user.username);
        }

        let books = self.list_books(None).await?;
        Ok(books
            .iter()
            .filter(|book| user.has_borrowed(book))
            .cloned()
            .collect())
    }

    pub async fn create_book(&self, form: &BookForm) -> ClientResult<Book> {
        form.validate()?;
        let token = self.token()?;

        let book = self.api.create_book(&token, form).await?;
        self.after_write(None);
        tracing::info!("Book created successfully (id {})", book.id);
        Ok(book)
    }

    /// Replace every field of book `id`
    pub async fn update_book(&self, id: i64, form: &BookForm) -> ClientResult<Book> {
        form.validate()?;
        let token = self.token()?;

        let book = self.api.update_book(&token, id, form).await?;
        self.after_write(Some(id));
        tracing::info!("Book {} updated successfully", id);
        Ok(book)
    }

    /// Change only the fields set in `patch`
    pub async fn patch_book(&self, id: i64, patch: &BookPatch) -> ClientResult<Book> {
        if patch.is_empty() {
            return Err(ClientError::Validation("Nothing to update".to_string()));
        }
        patch.validate()?;
        let token = self.token()?;

        let book = self.api.patch_book(&token, id, patch).await?;
        self.after_write(Some(id));
        tracing::info!("Book {} updated successfully", id);
        Ok(book)
    }

    pub async fn delete_book(&self, id: i64) -> ClientResult<()> {
        let token = self.token()?;

        self.api.delete_book(&token, id).await?;
        self.after_write(Some(id));
        tracing::info!("Book {} deleted successfully", id);
        Ok(())
    }

    pub async fn borrow_book(&self, id: i64) -> ClientResult<ApiMessage> {
        let token = self.token()?;

        let message = self.api.borrow_book(&token, id).await?;
        self.after_write(Some(id));
        tracing::info!("Book {}: {}", id, message.text_or("Book borrowed successfully."));
        Ok(message)
    }

    pub async fn return_book(&self, id: i64) -> ClientResult<ApiMessage> {
        let token = self.token()?;

        let message = self.api.return_book(&token, id).await?;
        self.after_write(Some(id));
        tracing::info!("Book {}: {}", id, message.text_or("Book returned successfully."));
        Ok(message)
    }

    /// Mark stale everything a successful write to book `id` may have changed
    fn after_write(&self, id: Option<i64>) {
        if let Some(id) = id {
            self.books.invalidate(&id);
        }
        self.lists.invalidate_all();
    }

    /// Cached list for `search`, without a request
    pub fn peek_list(&self, search: Option<&str>) -> Option<(Arc<Vec<Book>>, Freshness)> {
        self.lists.peek(&list_key(search))
    }

    /// Cached book, without a request
    pub fn peek_book(&self, id: i64) -> Option<(Arc<Book>, Freshness)> {
        self.books.peek(&id)
    }

    pub fn is_cache_empty(&self) -> bool {
        self.lists.is_empty() && self.books.is_empty()
    }
}

impl SessionData for BookService {
    fn purge(&self) {
        self.lists.clear();
        self.books.clear();
        tracing::debug!("Book caches cleared");
    }
}
