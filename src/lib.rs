//! Library lending desk
//!
//! REST JSON server for a library's catalog, member roster and book-lending
//! transactions, plus client bindings with a per-book cache of who currently
//! holds each title.

use std::sync::Arc;

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<services::Services>,
}

impl AppState {
    /// Build the state over an already opened store
    pub fn new(config: AppConfig, store: Arc<dyn repository::LendingStore>) -> Self {
        let services = services::Services::new(store, config.lending);
        Self {
            services: Arc::new(services),
        }
    }
}
