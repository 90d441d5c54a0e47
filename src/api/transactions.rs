//! Lending endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::transaction::{IssueRequest, Transaction, TransactionDetails, TransactionQuery},
    AppState,
};

/// Issue a book to a member
#[utoipa::path(
    post,
    path = "/transactions",
    tag = "transactions",
    request_body = IssueRequest,
    responses(
        (status = 201, description = "Book issued", body = Transaction),
        (status = 400, description = "Borrow period out of range"),
        (status = 404, description = "Book or member not found"),
        (status = 409, description = "No copies available"),
        (status = 422, description = "Member is not active")
    )
)]
pub async fn issue_book(
    State(state): State<AppState>,
    Json(request): Json<IssueRequest>,
) -> AppResult<(StatusCode, Json<Transaction>)> {
    let transaction = state.services.lending.issue_book(request).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// Return an issued book
#[utoipa::path(
    post,
    path = "/transactions/{id}/return",
    tag = "transactions",
    params(
        ("id" = i32, Path, description = "Transaction ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = Transaction),
        (status = 404, description = "Transaction not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Transaction>> {
    let transaction = state.services.lending.return_book(id).await?;
    Ok(Json(transaction))
}

/// Transaction history, newest first
#[utoipa::path(
    get,
    path = "/transactions",
    tag = "transactions",
    params(TransactionQuery),
    responses(
        (status = 200, description = "Transactions", body = Vec<TransactionDetails>)
    )
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> AppResult<Json<Vec<TransactionDetails>>> {
    let transactions = state.services.lending.history(&query).await?;
    Ok(Json(transactions))
}

/// All books currently out
#[utoipa::path(
    get,
    path = "/transactions/current",
    tag = "transactions",
    responses(
        (status = 200, description = "Issued transactions", body = Vec<TransactionDetails>)
    )
)]
pub async fn list_current(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<TransactionDetails>>> {
    let transactions = state.services.lending.current_transactions().await?;
    Ok(Json(transactions))
}

/// Books past their due date
#[utoipa::path(
    get,
    path = "/transactions/overdue",
    tag = "transactions",
    responses(
        (status = 200, description = "Overdue transactions, most overdue first", body = Vec<TransactionDetails>)
    )
)]
pub async fn list_overdue(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<TransactionDetails>>> {
    let transactions = state.services.lending.overdue().await?;
    Ok(Json(transactions))
}
