//! Authentication endpoints

use reqwest::Method;

use super::ApiClient;
use crate::{
    error::ClientResult,
    models::{ApiMessage, Credentials, TokenResponse, User},
};

impl ApiClient {
    /// Exchange credentials for an access token (unauthenticated)
    pub async fn login(&self, credentials: &Credentials) -> ClientResult<TokenResponse> {
        let request = self
            .request(Method::POST, "/auth/login/", None)
            .json(credentials);
        Self::send_json(request, "Invalid credentials").await
    }

    /// Create a new account (unauthenticated)
    pub async fn register(&self, credentials: &Credentials) -> ClientResult<ApiMessage> {
        let request = self
            .request(Method::POST, "/auth/register/", None)
            .json(credentials);
        Self::send_json(request, "Registration failed").await
    }

    /// Identity of the token's owner
    pub async fn me(&self, token: &str) -> ClientResult<User> {
        let request = self.request(Method::GET, "/auth/me/", Some(token));
        Self::send_json(request, "Failed to fetch user").await
    }
}
