//! API handlers for the lending desk REST endpoints

pub mod books;
pub mod health;
pub mod members;
pub mod openapi;
pub mod transactions;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Books (catalog)
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route("/books/:id/issued-members", get(books::get_issued_members))
        // Members
        .route("/members", get(members::list_members).post(members::create_member))
        .route(
            "/members/:id",
            get(members::get_member)
                .put(members::update_member)
                .delete(members::delete_member),
        )
        .route("/members/:id/issued-books", get(members::get_issued_books))
        // Transactions
        .route(
            "/transactions",
            get(transactions::list_transactions).post(transactions::issue_book),
        )
        .route("/transactions/current", get(transactions::list_current))
        .route("/transactions/overdue", get(transactions::list_overdue))
        .route("/transactions/:id/return", post(transactions::return_book))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
