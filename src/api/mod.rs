//! HTTP client for the library REST backend
//!
//! One method per backend operation, split by resource in [`auth`] and
//! [`books`]. The client is stateless: callers pass the bearer token on
//! every authenticated call.

pub mod auth;
pub mod books;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::{
    config::ApiConfig,
    error::{ClientError, ClientResult},
    models::ApiMessage,
};

/// Client for the `/api` endpoints of the backend
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for the backend described by `config`
    pub fn new(config: &ApiConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ClientError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: format!("{}/api", config.base_url.trim_end_matches('/')),
        })
    }

    /// Root of every endpoint, e.g. `http://localhost:8000/api`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        tracing::debug!("{} {}", method, path);
        if path.starts_with("/books") {
            tracing::info!("Book operation: {} {}", method, path);
        }

        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send the request, turning any non-success status into an error
    async fn send(builder: RequestBuilder, fallback: &str) -> ClientResult<Response> {
        let response = builder.send().await.map_err(|e| {
            tracing::warn!("Request failed: {}", e);
            ClientError::Network(format!("{}: {}", fallback, e))
        })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response, fallback).await)
        }
    }

    /// Send the request and decode its JSON body
    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder, fallback: &str) -> ClientResult<T> {
        let response = Self::send(builder, fallback).await?;
        response.json::<T>().await.map_err(|e| {
            tracing::warn!("Failed to decode response: {}", e);
            if e.is_decode() {
                ClientError::Request(fallback.to_string())
            } else {
                ClientError::Network(format!("{}: {}", fallback, e))
            }
        })
    }
}

/// Build the error for a non-success response.
///
/// The body's `detail` string is the message; anything else (field error
/// maps, HTML error pages, empty bodies) falls back to `fallback`.
async fn error_from_response(response: Response, fallback: &str) -> ClientError {
    let status = response.status();
    let message = match response.json::<ApiMessage>().await {
        Ok(ApiMessage { detail: Some(detail) }) => detail,
        _ => fallback.to_string(),
    };

    tracing::debug!(status = status.as_u16(), "Request rejected: {}", message);

    if status.is_server_error() {
        ClientError::Network(message)
    } else {
        ClientError::Request(message)
    }
}
