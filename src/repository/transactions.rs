//! Transactions repository: issuing and returning copies

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::{
        member::MemberStatus,
        transaction::{NewTransaction, Transaction, TransactionFilter, TransactionRecord},
    },
};

#[derive(Clone)]
pub struct TransactionsRepository {
    pool: Pool<Postgres>,
}

impl TransactionsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Issue a copy. The decrement is conditional on a copy being left, so
    /// two racing issues of the last copy cannot both succeed; any later
    /// failure rolls the decrement back with the transaction.
    pub async fn issue(&self, new: &NewTransaction) -> AppResult<Transaction> {
        let mut tx = self.pool.begin().await?;

        let taken: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE books SET available_copies = available_copies - 1
            WHERE book_id = $1 AND available_copies > 0
            RETURNING book_id
            "#,
        )
        .bind(new.book_id)
        .fetch_optional(&mut *tx)
        .await?;

        if taken.is_none() {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE book_id = $1)")
                    .bind(new.book_id)
                    .fetch_one(&mut *tx)
                    .await?;
            return Err(if exists {
                AppError::Unavailable(format!("No copies of book {} are available", new.book_id))
            } else {
                AppError::NotFound(format!("Book with id {} not found", new.book_id))
            });
        }

        // Share lock keeps the status from changing until the issue commits
        let status: MemberStatus = sqlx::query_scalar(
            "SELECT status FROM members WHERE member_id = $1 FOR SHARE",
        )
        .bind(new.member_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", new.member_id)))?;

        if !status.can_borrow() {
            return Err(AppError::Ineligible(format!(
                "Member {} is {} and cannot borrow books",
                new.member_id, status
            )));
        }

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (book_id, member_id, issue_date, due_date, status)
            VALUES ($1, $2, $3, $4, 'Issued')
            RETURNING *
            "#,
        )
        .bind(new.book_id)
        .bind(new.member_id)
        .bind(new.issue_date)
        .bind(new.due_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(transaction)
    }

    /// Return a transaction. Only the `Issued -> Returned` update that
    /// actually matches a row gives a copy back.
    pub async fn return_transaction(
        &self,
        id: i32,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Transaction> {
        let mut tx = self.pool.begin().await?;

        let returned = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions SET status = 'Returned', return_date = $2
            WHERE transaction_id = $1 AND status = 'Issued'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(returned_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(returned) = returned else {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM transactions WHERE transaction_id = $1)",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
            return Err(if exists {
                AppError::AlreadyReturned(format!("Transaction {} is already returned", id))
            } else {
                AppError::NotFound(format!("Transaction with id {} not found", id))
            });
        };

        sqlx::query(
            r#"
            UPDATE books SET available_copies = available_copies + 1
            WHERE book_id = $1 AND available_copies < total_copies
            "#,
        )
        .bind(returned.book_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(returned)
    }

    /// Find transactions with their book and member labels
    pub async fn find(&self, filter: &TransactionFilter) -> AppResult<Vec<TransactionRecord>> {
        let mut query = QueryBuilder::<Postgres>::new(
            r#"
            SELECT t.*, b.title AS book_title, b.author AS book_author,
                   m.first_name, m.last_name, m.email, m.phone
            FROM transactions t
            LEFT JOIN books b ON b.book_id = t.book_id
            LEFT JOIN members m ON m.member_id = t.member_id
            WHERE TRUE
            "#,
        );

        if let Some(book_id) = filter.book_id {
            query.push(" AND t.book_id = ").push_bind(book_id);
        }
        if let Some(member_id) = filter.member_id {
            query.push(" AND t.member_id = ").push_bind(member_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND t.status = ").push_bind(status);
        }
        query.push(" ORDER BY t.issue_date, t.transaction_id");

        let records = query
            .build_query_as::<TransactionRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }
}
