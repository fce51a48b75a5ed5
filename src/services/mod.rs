//! Client-side services: session lifecycle and book queries

pub mod books;
pub mod cache;
pub mod session;

use std::sync::Arc;

use crate::{
    api::ApiClient, config::AppConfig, error::ClientResult, repository::Repository,
};

/// Container for all services
#[derive(Clone, Debug)]
pub struct Services {
    pub session: session::SessionStore,
    pub books: books::BookService,
}

impl Services {
    /// Wire the services from configuration, with file-backed token storage
    pub fn new(config: &AppConfig) -> ClientResult<Self> {
        let api = ApiClient::new(&config.api)?;
        let repository = Repository::new(&config.storage);
        Ok(Self::with_parts(api, repository, cache::RetryPolicy::from(&config.query)))
    }

    /// Wire the services from explicit parts
    pub fn with_parts(api: ApiClient, repository: Repository, retry: cache::RetryPolicy) -> Self {
        let session = session::SessionStore::new(api.clone(), repository.tokens);
        let books = books::BookService::new(api, session.subscribe(), retry);
        session.register_data(Arc::new(books.clone()));

        Self { session, books }
    }
}
