//! Member roster endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        member::{CreateMember, Member, UpdateMember},
        transaction::TransactionDetails,
    },
    AppState,
};

/// List all members
#[utoipa::path(
    get,
    path = "/members",
    tag = "members",
    responses(
        (status = 200, description = "The roster", body = Vec<Member>)
    )
)]
pub async fn list_members(State(state): State<AppState>) -> AppResult<Json<Vec<Member>>> {
    let members = state.services.members.list_members().await?;
    Ok(Json(members))
}

/// Get member details by ID
#[utoipa::path(
    get,
    path = "/members/{id}",
    tag = "members",
    params(
        ("id" = i32, Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Member details", body = Member),
        (status = 404, description = "Member not found")
    )
)]
pub async fn get_member(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Member>> {
    let member = state.services.members.get_member(id).await?;
    Ok(Json(member))
}

/// Register a member
#[utoipa::path(
    post,
    path = "/members",
    tag = "members",
    request_body = CreateMember,
    responses(
        (status = 201, description = "Member registered", body = Member),
        (status = 400, description = "Invalid input or email already registered")
    )
)]
pub async fn create_member(
    State(state): State<AppState>,
    Json(member): Json<CreateMember>,
) -> AppResult<(StatusCode, Json<Member>)> {
    let created = state.services.members.create_member(member).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a member (including status)
#[utoipa::path(
    put,
    path = "/members/{id}",
    tag = "members",
    params(
        ("id" = i32, Path, description = "Member ID")
    ),
    request_body = UpdateMember,
    responses(
        (status = 200, description = "Member updated", body = Member),
        (status = 400, description = "Invalid input or email already registered"),
        (status = 404, description = "Member not found")
    )
)]
pub async fn update_member(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(changes): Json<UpdateMember>,
) -> AppResult<Json<Member>> {
    let updated = state.services.members.update_member(id, changes).await?;
    Ok(Json(updated))
}

/// Delete a member
#[utoipa::path(
    delete,
    path = "/members/{id}",
    tag = "members",
    params(
        ("id" = i32, Path, description = "Member ID")
    ),
    responses(
        (status = 204, description = "Member deleted"),
        (status = 404, description = "Member not found"),
        (status = 409, description = "Member still holds books")
    )
)]
pub async fn delete_member(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.members.delete_member(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// A member's outstanding and past transactions
#[utoipa::path(
    get,
    path = "/members/{id}/issued-books",
    tag = "members",
    params(
        ("id" = i32, Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Outstanding transactions first, then returned ones", body = Vec<TransactionDetails>),
        (status = 404, description = "Member not found")
    )
)]
pub async fn get_issued_books(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<TransactionDetails>>> {
    let books = state.services.lending.member_issued_books(id).await?;
    Ok(Json(books))
}
