//! Book endpoints

use reqwest::Method;

use super::ApiClient;
use crate::{
    error::ClientResult,
    models::{ApiMessage, Book, BookForm, BookPatch},
};

impl ApiClient {
    /// List books, optionally filtered by a title/author substring
    pub async fn list_books(&self, token: &str, search: Option<&str>) -> ClientResult<Vec<Book>> {
        let mut request = self.request(Method::GET, "/books/", Some(token));
        if let Some(search) = search.filter(|s| !s.is_empty()) {
            request = request.query(&[("search", search)]);
        }
        Self::send_json(request, "Failed to fetch books").await
    }

    pub async fn get_book(&self, token: &str, id: i64) -> ClientResult<Book> {
        let request = self.request(Method::GET, &format!("/books/{}/", id), Some(token));
        Self::send_json(request, "Failed to fetch book").await
    }

    pub async fn create_book(&self, token: &str, form: &BookForm) -> ClientResult<Book> {
        let request = self
            .request(Method::POST, "/books/", Some(token))
            .json(form);
        Self::send_json(request, "Failed to create book").await
    }

    /// Replace every field of a book
    pub async fn update_book(&self, token: &str, id: i64, form: &BookForm) -> ClientResult<Book> {
        let request = self
            .request(Method::PUT, &format!("/books/{}/", id), Some(token))
            .json(form);
        Self::send_json(request, "Failed to update book").await
    }

    /// Update only the fields set in `patch`
    pub async fn patch_book(&self, token: &str, id: i64, patch: &BookPatch) -> ClientResult<Book> {
        let request = self
            .request(Method::PATCH, &format!("/books/{}/", id), Some(token))
            .json(patch);
        Self::send_json(request, "Failed to update book").await
    }

    pub async fn delete_book(&self, token: &str, id: i64) -> ClientResult<()> {
        let request = self.request(Method::DELETE, &format!("/books/{}/", id), Some(token));
        Self::send(request, "Failed to delete book").await?;
        Ok(())
    }

    /// Mark a book as borrowed by the token's owner
    pub async fn borrow_book(&self, token: &str, id: i64) -> ClientResult<ApiMessage> {
        let request = self.request(Method::POST, &format!("/books/{}/borrow/", id), Some(token));
        Self::send_json(request, "Failed to borrow book").await
    }

    /// Give a borrowed book back
    pub async fn return_book(&self, token: &str, id: i64) -> ClientResult<ApiMessage> {
        let request = self.request(
            Method::POST,
            &format!("/books/{}/return_book/", id),
            Some(token),
        );
        Self::send_json(request, "Failed to return book").await
    }
}
