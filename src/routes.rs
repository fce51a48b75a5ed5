//! Screens of the application and the guard in front of them

use tokio::sync::watch;

use crate::services::session::SessionState;

/// A screen reachable by path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// `/`, which only forwards to the login screen
    Root,
    Login,
    Register,
    Dashboard,
    BookDetails(i64),
    NewBook,
    EditBook(i64),
    MyBooks,
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Root => "/".to_string(),
            Route::Login => "/login".to_string(),
            Route::Register => "/register".to_string(),
            Route::Dashboard => "/dashboard".to_string(),
            Route::BookDetails(id) => format!("/books/{}", id),
            Route::NewBook => "/books/new".to_string(),
            Route::EditBook(id) => format!("/books/{}/edit", id),
            Route::MyBooks => "/my-books".to_string(),
        }
    }

    /// Match a path against the route table
    pub fn parse(path: &str) -> Option<Route> {
        let trimmed = path.trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [] => Some(Route::Root),
            ["login"] => Some(Route::Login),
            ["register"] => Some(Route::Register),
            ["dashboard"] => Some(Route::Dashboard),
            ["my-books"] => Some(Route::MyBooks),
            ["books", "new"] => Some(Route::NewBook),
            ["books", id] => id.parse().ok().map(Route::BookDetails),
            ["books", id, "edit"] => id.parse().ok().map(Route::EditBook),
            _ => None,
        }
    }

    /// Whether the screen needs an authenticated session
    pub fn is_protected(&self) -> bool {
        !matches!(self, Route::Root | Route::Login | Route::Register)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}

/// Where an action sends the user, and what to tell them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub route: Route,
    pub notice: String,
}

impl Navigation {
    pub fn new(route: Route, notice: impl Into<String>) -> Self {
        Self {
            route,
            notice: notice.into(),
        }
    }
}

/// What to show for a requested route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Identity still being resolved; show a loading indicator
    Loading,
    Redirect(Route),
    Render(Route),
}

/// Decide what the requested route shows in the given session state
pub fn guard(state: &SessionState, route: Route) -> Access {
    if route == Route::Root {
        return Access::Redirect(Route::Login);
    }
    if !route.is_protected() {
        return Access::Render(route);
    }

    match state {
        SessionState::Resolving { .. } => Access::Loading,
        SessionState::Anonymous => Access::Redirect(Route::Login),
        SessionState::Authenticated { .. } => Access::Render(route),
    }
}

/// Wait out identity resolution, then apply [`guard`]
pub async fn guard_settled(session: &mut watch::Receiver<SessionState>, route: Route) -> Access {
    let settled = session
        .wait_for(|state| !state.is_loading())
        .await
        .map(|state| guard(&state, route));

    match settled {
        Ok(access) => access,
        // Store dropped: nothing will resolve any more
        Err(_) => guard(&session.borrow(), route),
    }
}
