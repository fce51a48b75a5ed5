//! Session store: the bearer token, the identity behind it, and the
//! transitions between anonymous and authenticated use.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use validator::Validate;

use crate::{
    api::ApiClient,
    error::{ClientError, ClientResult},
    models::{Credentials, User},
    repository::TokenStore,
    routes::{Navigation, Route},
};

/// Authentication state of the client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No token
    #[default]
    Anonymous,
    /// Token present, identity fetch in flight
    Resolving { token: String },
    /// Token validated against the backend
    Authenticated { token: String, user: User },
}

impl SessionState {
    pub fn token(&self) -> Option<&str> {
        match self {
            SessionState::Anonymous => None,
            SessionState::Resolving { token } | SessionState::Authenticated { token, .. } => {
                Some(token)
            }
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Resolving { .. })
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }
}

/// Data that belongs to one session and must go when it ends
pub trait SessionData: Send + Sync {
    fn purge(&self);
}

struct Inner {
    api: ApiClient,
    tokens: Arc<dyn TokenStore>,
    state: watch::Sender<SessionState>,
    data: Mutex<Vec<Arc<dyn SessionData>>>,
}

/// Owner of the session lifecycle.
///
/// State changes are published on a watch channel; the route guard and the
/// book service read the token from there.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(api: ApiClient, tokens: Arc<dyn TokenStore>) -> Self {
        let (state, _) = watch::channel(SessionState::Anonymous);
        Self {
            inner: Arc::new(Inner {
                api,
                tokens,
                state,
                data: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.state.borrow().token().map(str::to_owned)
    }

    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    /// Register data to purge on logout or when the token turns out invalid
    pub fn register_data(&self, data: Arc<dyn SessionData>) {
        self.inner
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(data);
    }

    /// Pick up the token left by a previous run and resolve its identity.
    ///
    /// Does nothing when a session is already established or resolving.
    pub async fn restore(&self) -> ClientResult<SessionState> {
        if !matches!(self.state(), SessionState::Anonymous) {
            return Ok(self.state());
        }

        let Some(token) = self.inner.tokens.load().await? else {
            tracing::debug!("No stored token, session is anonymous");
            return Ok(SessionState::Anonymous);
        };

        tracing::info!("Restoring session from stored token");
        self.inner.state.send_replace(SessionState::Resolving {
            token: token.clone(),
        });
        self.resolve(token).await?;
        Ok(self.state())
    }

    /// Fetch the identity behind `token` and settle the Resolving state
    async fn resolve(&self, token: String) -> ClientResult<User> {
        let result = self.inner.api.me(&token).await;

        let still_current = |state: &SessionState| {
            matches!(state, SessionState::Resolving { token: current } if *current == token)
        };

        match result {
            Ok(user) => {
                let applied = self.inner.state.send_if_modified(|state| {
                    if still_current(&*state) {
                        *state = SessionState::Authenticated {
                            token: token.clone(),
                            user: user.clone(),
                        };
                        true
                    } else {
                        false
                    }
                });

                if applied {
                    tracing::info!("Authenticated as {}", user.username);
                    Ok(user)
                } else {
                    tracing::debug!("Session changed while resolving identity, result dropped");
                    Err(ClientError::Auth("Session expired".to_string()))
                }
            }
            Err(e) => {
                if still_current(&*self.inner.state.borrow()) {
                    tracing::warn!("Stored token rejected: {}", e);
                    self.end_session().await;
                }
                Err(e.into_auth())
            }
        }
    }

    /// Log in and establish an authenticated session
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<Navigation> {
        let credentials = Credentials::new(username, password);
        credentials.validate()?;

        let response = self.inner.api.login(&credentials).await.map_err(|e| {
            tracing::warn!("Login failed for {}: {}", username, e);
            e.into_auth()
        })?;

        self.inner.tokens.save(&response.access_token).await?;

        // Reads cached under a previous identity do not carry over
        if self.state().token().is_some() {
            self.purge_data();
        }

        self.inner.state.send_replace(SessionState::Resolving {
            token: response.access_token.clone(),
        });
        self.resolve(response.access_token).await?;

        Ok(Navigation::new(Route::Dashboard, "Welcome back!"))
    }

    /// Create an account; the user still has to log in afterwards
    pub async fn register(&self, username: &str, password: &str) -> ClientResult<Navigation> {
        let credentials = Credentials::new(username, password);
        credentials.validate()?;

        let message = self.inner.api.register(&credentials).await.map_err(|e| {
            tracing::warn!("Registration failed for {}: {}", username, e);
            e.into_auth()
        })?;

        tracing::info!(
            "Registered {}: {}",
            username,
            message.text_or("User registered successfully.")
        );

        Ok(Navigation::new(
            Route::Login,
            "You can now log in with your credentials",
        ))
    }

    /// End the session from any state
    pub async fn logout(&self) -> Navigation {
        self.end_session().await;
        tracing::info!("Logged out");
        Navigation::new(Route::Login, "You have been successfully logged out")
    }

    async fn end_session(&self) {
        if let Err(e) = self.inner.tokens.clear().await {
            tracing::warn!("Failed to clear stored token: {}", e);
        }
        self.purge_data();
        self.inner.state.send_replace(SessionState::Anonymous);
    }

    fn purge_data(&self) {
        let data = self
            .inner
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for item in data {
            item.purge();
        }
    }
}
