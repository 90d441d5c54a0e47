//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, health, members, transactions};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library Desk API",
        version = "0.1.0",
        description = "Catalog, member roster and lending REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::get_issued_members,
        // Members
        members::list_members,
        members::get_member,
        members::create_member,
        members::update_member,
        members::delete_member,
        members::get_issued_books,
        // Transactions
        transactions::issue_book,
        transactions::return_book,
        transactions::list_transactions,
        transactions::list_current,
        transactions::list_overdue,
    ),
    components(
        schemas(
            // Books
            crate::models::book::Book,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            // Members
            crate::models::member::Member,
            crate::models::member::MemberStatus,
            crate::models::member::CreateMember,
            crate::models::member::UpdateMember,
            // Transactions
            crate::models::transaction::Transaction,
            crate::models::transaction::TransactionStatus,
            crate::models::transaction::TransactionDetails,
            crate::models::transaction::IssuedMember,
            crate::models::transaction::IssueRequest,
            crate::models::transaction::TransactionQuery,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Catalog management"),
        (name = "members", description = "Member roster"),
        (name = "transactions", description = "Issuing, returning and overdue tracking")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
