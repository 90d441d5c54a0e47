//! Members repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::member::{CreateMember, Member, UpdateMember},
};

use super::unique_violation;

const DUPLICATE_EMAIL: &str = "A member with this email already exists";

#[derive(Clone)]
pub struct MembersRepository {
    pool: Pool<Postgres>,
}

impl MembersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> AppResult<Vec<Member>> {
        let members = sqlx::query_as::<_, Member>("SELECT * FROM members ORDER BY member_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(members)
    }

    /// Get member by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Member> {
        sqlx::query_as::<_, Member>("SELECT * FROM members WHERE member_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", id)))
    }

    /// Check if email already exists
    pub async fn email_exists(&self, email: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM members
                WHERE LOWER(email) = LOWER($1) AND ($2::int IS NULL OR member_id != $2)
            )
            "#,
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn create(
        &self,
        member: &CreateMember,
        membership_date: DateTime<Utc>,
    ) -> AppResult<Member> {
        if self.email_exists(&member.email, None).await? {
            return Err(AppError::Validation(DUPLICATE_EMAIL.to_string()));
        }

        // The unique index still catches a registration racing the check above
        sqlx::query_as::<_, Member>(
            r#"
            INSERT INTO members (first_name, last_name, email, phone, address, membership_date, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&member.first_name)
        .bind(&member.last_name)
        .bind(&member.email)
        .bind(&member.phone)
        .bind(&member.address)
        .bind(membership_date)
        .bind(member.status.unwrap_or_default())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, DUPLICATE_EMAIL))
    }

    pub async fn update(&self, id: i32, changes: &UpdateMember) -> AppResult<Member> {
        if let Some(ref email) = changes.email {
            if self.email_exists(email, Some(id)).await? {
                return Err(AppError::Validation(DUPLICATE_EMAIL.to_string()));
            }
        }

        sqlx::query_as::<_, Member>(
            r#"
            UPDATE members SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                address = COALESCE($6, address),
                status = COALESCE($7, status)
            WHERE member_id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(&changes.email)
        .bind(&changes.phone)
        .bind(&changes.address)
        .bind(changes.status)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unique_violation(e, DUPLICATE_EMAIL))?
        .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", id)))
    }

    /// Delete a member unless they still hold a book
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        // Issuing takes a share lock on the member row
        let found: Option<i32> =
            sqlx::query_scalar("SELECT member_id FROM members WHERE member_id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        if found.is_none() {
            return Err(AppError::NotFound(format!("Member with id {} not found", id)));
        }

        let issued: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE member_id = $1 AND status = 'Issued'",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if issued > 0 {
            return Err(AppError::Conflict(format!(
                "Member {} still has {} books issued",
                id, issued
            )));
        }

        sqlx::query("DELETE FROM members WHERE member_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
