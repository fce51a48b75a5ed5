//! In-process fake of the library backend

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};

use library_client::{
    api::ApiClient,
    config::ApiConfig,
    models::{Book, BookForm, BookFormat, User},
    repository::{MemoryTokenStore, Repository, TokenStore},
    services::cache::RetryPolicy,
    Services,
};

pub const ADMIN_ID: i64 = 1;
pub const READER_ID: i64 = 2;

type Reply = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn reject(status: StatusCode, detail: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "detail": detail })))
}

fn not_found() -> (StatusCode, Json<Value>) {
    reject(StatusCode::NOT_FOUND, "Not found.")
}

#[derive(Default)]
pub struct Backend {
    users: Mutex<HashMap<String, (String, User)>>,
    books: Mutex<BTreeMap<i64, Book>>,
    next_id: AtomicI64,
    pub list_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub borrow_calls: AtomicUsize,
    /// Number of upcoming list requests answered with 503
    pub failing_lists: AtomicUsize,
    /// Delay before answering list requests
    pub list_delay_ms: AtomicUsize,
    /// Delay before answering `/auth/me/`
    pub me_delay_ms: AtomicUsize,
    /// Answer `/auth/me/` with username and staff flag only
    pub me_without_id: AtomicBool,
}

impl Backend {
    pub fn seeded() -> Self {
        let backend = Backend::default();
        {
            let mut users = backend.users.lock().unwrap();
            users.insert(
                "admin".into(),
                (
                    "admin".into(),
                    User {
                        id: Some(ADMIN_ID),
                        username: "admin".into(),
                        is_staff: true,
                    },
                ),
            );
            users.insert(
                "reader".into(),
                (
                    "reader".into(),
                    User {
                        id: Some(READER_ID),
                        username: "reader".into(),
                        is_staff: false,
                    },
                ),
            );

            let mut books = backend.books.lock().unwrap();
            for book in [
                seed_book(1, "The Hobbit", "J.R.R. Tolkien", BookFormat::Printed { pages: Some(310) }),
                seed_book(
                    2,
                    "The Fellowship of the Ring",
                    "J.R.R. Tolkien",
                    BookFormat::Printed { pages: Some(423) },
                ),
                seed_book(3, "Neuromancer", "William Gibson", BookFormat::Audiobook { duration: Some(645) }),
                seed_book(7, "Dune", "Frank Herbert", BookFormat::Ebook { file_format: Some("epub".into()) }),
            ] {
                books.insert(book.id, book);
            }
        }
        backend.next_id.store(8, Ordering::SeqCst);
        backend
    }

    fn user_for(&self, headers: &HeaderMap) -> Result<User, (StatusCode, Json<Value>)> {
        let username = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .and_then(|token| token.strip_prefix("token-"))
            .ok_or_else(|| {
                reject(
                    StatusCode::UNAUTHORIZED,
                    "Authentication credentials were not provided.",
                )
            })?;

        self.users
            .lock()
            .unwrap()
            .get(username)
            .map(|(_, user)| user.clone())
            .ok_or_else(|| {
                reject(
                    StatusCode::UNAUTHORIZED,
                    "Given token not valid for any token type",
                )
            })
    }

    fn staff_for(&self, headers: &HeaderMap) -> Result<User, (StatusCode, Json<Value>)> {
        let user = self.user_for(headers)?;
        if user.is_staff {
            Ok(user)
        } else {
            Err(reject(
                StatusCode::FORBIDDEN,
                "You do not have permission to perform this action.",
            ))
        }
    }

    pub fn book(&self, id: i64) -> Option<Book> {
        self.books.lock().unwrap().get(&id).cloned()
    }
}

fn seed_book(id: i64, title: &str, author: &str, format: BookFormat) -> Book {
    Book {
        id,
        title: title.into(),
        author: author.into(),
        isbn: format!("97800000000{:02}", id),
        published_date: NaiveDate::from_ymd_opt(1960, 1, 1).unwrap(),
        available: true,
        borrowed_by: None,
        format,
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Json<Value> {
    Json(serde_json::to_value(value).unwrap())
}

async fn login(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Reply {
    let username = body["username"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    let users = backend.users.lock().unwrap();
    match users.get(username) {
        Some((expected, _)) if expected == password => Ok(Json(json!({
            "access_token": format!("token-{}", username),
            "refresh_token": format!("refresh-{}", username),
        }))),
        _ => Err(reject(StatusCode::UNAUTHORIZED, "Invalid credentials.")),
    }
}

async fn register(
    State(backend): State<Arc<Backend>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let username = body["username"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default().to_string();

    let mut users = backend.users.lock().unwrap();
    if users.contains_key(&username) {
        // Field errors carry no `detail`
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "username": ["A user with that username already exists."] })),
        ));
    }
    let id = users.len() as i64 + 1;
    users.insert(
        username.clone(),
        (
            password,
            User {
                id: Some(id),
                username,
                is_staff: false,
            },
        ),
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({ "detail": "User registered successfully." })),
    ))
}

async fn me(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Reply {
    let user = backend.user_for(&headers)?;

    let delay = backend.me_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
    }

    if backend.me_without_id.load(Ordering::SeqCst) {
        return Ok(Json(json!({
            "username": user.username,
            "is_staff": user.is_staff,
        })));
    }
    Ok(to_json(&user))
}

async fn list_books(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Reply {
    backend.user_for(&headers)?;
    backend.list_calls.fetch_add(1, Ordering::SeqCst);

    let delay = backend.list_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
    }

    let failing = backend.failing_lists.load(Ordering::SeqCst);
    if failing > 0 {
        backend.failing_lists.store(failing - 1, Ordering::SeqCst);
        return Err(reject(StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable."));
    }

    let search = params.get("search").map(|s| s.to_lowercase());
    let books: Vec<Book> = backend
        .books
        .lock()
        .unwrap()
        .values()
        .filter(|book| match &search {
            Some(q) => book.title.to_lowercase().contains(q) || book.author.to_lowercase().contains(q),
            None => true,
        })
        .cloned()
        .collect();
    Ok(to_json(&books))
}

async fn create_book(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(form): Json<BookForm>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    backend.create_calls.fetch_add(1, Ordering::SeqCst);
    backend.staff_for(&headers)?;

    let id = backend.next_id.fetch_add(1, Ordering::SeqCst);
    let book = Book {
        id,
        title: form.title,
        author: form.author,
        isbn: form.isbn,
        published_date: form.published_date,
        available: true,
        borrowed_by: None,
        format: form.format,
    };
    backend.books.lock().unwrap().insert(id, book.clone());
    Ok((StatusCode::CREATED, to_json(&book)))
}

async fn get_book(State(backend): State<Arc<Backend>>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    backend.user_for(&headers)?;
    backend.get_calls.fetch_add(1, Ordering::SeqCst);
    backend.book(id).map(|b| to_json(&b)).ok_or_else(not_found)
}

async fn update_book(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(form): Json<BookForm>,
) -> Reply {
    backend.staff_for(&headers)?;
    let mut books = backend.books.lock().unwrap();
    let book = books.get_mut(&id).ok_or_else(not_found)?;
    book.title = form.title;
    book.author = form.author;
    book.isbn = form.isbn;
    book.published_date = form.published_date;
    book.format = form.format;
    Ok(to_json(&*book))
}

async fn patch_book(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<Value>,
) -> Reply {
    backend.staff_for(&headers)?;
    let mut books = backend.books.lock().unwrap();
    let book = books.get_mut(&id).ok_or_else(not_found)?;
    if let Some(title) = patch["title"].as_str() {
        book.title = title.to_string();
    }
    if let Some(author) = patch["author"].as_str() {
        book.author = author.to_string();
    }
    if patch.get("book_type").is_some() {
        book.format = serde_json::from_value(patch.clone())
            .map_err(|_| reject(StatusCode::BAD_REQUEST, "Invalid book type."))?;
    }
    Ok(to_json(&*book))
}

async fn delete_book(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    backend.staff_for(&headers)?;
    backend
        .books
        .lock()
        .unwrap()
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(not_found)
}

async fn borrow_book(State(backend): State<Arc<Backend>>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    let user = backend.user_for(&headers)?;
    backend.borrow_calls.fetch_add(1, Ordering::SeqCst);
    let mut books = backend.books.lock().unwrap();
    let book = books.get_mut(&id).ok_or_else(not_found)?;
    if !book.available {
        return Err(reject(StatusCode::BAD_REQUEST, "Book is not available for borrowing."));
    }
    book.available = false;
    book.borrowed_by = user.id;
    Ok(Json(json!({ "detail": "Book borrowed successfully." })))
}

async fn return_book(State(backend): State<Arc<Backend>>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    let user = backend.user_for(&headers)?;
    let mut books = backend.books.lock().unwrap();
    let book = books.get_mut(&id).ok_or_else(not_found)?;
    if book.available || book.borrowed_by != user.id {
        return Err(reject(StatusCode::BAD_REQUEST, "Book cannot be returned."));
    }
    book.available = true;
    book.borrowed_by = None;
    Ok(Json(json!({ "detail": "Book returned successfully." })))
}

fn router(backend: Arc<Backend>) -> Router {
    Router::new()
        .route("/api/auth/login/", post(login))
        .route("/api/auth/register/", post(register))
        .route("/api/auth/me/", get(me))
        .route("/api/books/", get(list_books).post(create_book))
        .route(
            "/api/books/:id/",
            get(get_book).put(update_book).patch(patch_book).delete(delete_book),
        )
        .route("/api/books/:id/borrow/", post(borrow_book))
        .route("/api/books/:id/return_book/", post(return_book))
        .with_state(backend)
}

/// Client services wired to a running fake backend
pub struct TestApp {
    pub backend: Arc<Backend>,
    pub tokens: Arc<dyn TokenStore>,
    pub services: Services,
    pub api: ApiClient,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(Repository::in_memory()).await
    }

    /// Spawn with `token` left in storage by a previous run
    pub async fn with_stored_token(token: &str) -> Self {
        Self::spawn_with(Repository {
            tokens: Arc::new(MemoryTokenStore::with_token(token)),
        })
        .await
    }

    pub async fn spawn_with(repository: Repository) -> Self {
        let backend = Arc::new(Backend::seeded());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = router(backend.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let api = ApiClient::new(&ApiConfig {
            base_url: format!("http://{}", addr),
            timeout_secs: 5,
        })
        .unwrap();

        let tokens = Arc::clone(&repository.tokens);
        let services = Services::with_parts(
            api.clone(),
            repository,
            RetryPolicy {
                retries: 1,
                delay: Duration::ZERO,
            },
        );

        Self {
            backend,
            tokens,
            services,
            api,
        }
    }

    /// Spawn and log in as `username` (password equals username)
    pub async fn logged_in(username: &str) -> Self {
        let app = Self::spawn().await;
        app.services.session.login(username, username).await.unwrap();
        app
    }

    pub async fn stored_token(&self) -> Option<String> {
        self.tokens.load().await.unwrap()
    }
}
