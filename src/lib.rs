//! Library Management System client
//!
//! Session handling, cached book queries and route guarding for the library
//! REST backend, plus the plain-text screens used by the command-line front
//! end.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod routes;
pub mod screens;
pub mod services;

pub use config::AppConfig;
pub use error::{ClientError, ClientResult};
pub use services::Services;
