//! Repository layer for lending data
//!
//! [`LendingStore`] is the storage contract the services rely on. Every
//! mutating method is atomic: it either applies all of its changes or none,
//! and copy counting (`available_copies`) is a compare-and-decrement, never
//! a read-then-write.

pub mod books;
pub mod members;
pub mod memory;
pub mod transactions;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        Book, CreateBook, CreateMember, Member, NewTransaction, Transaction, TransactionFilter,
        TransactionRecord, UpdateBook, UpdateMember,
    },
};

pub use memory::MemoryStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LendingStore: Send + Sync {
    /// Check the backing storage is reachable
    async fn ping(&self) -> AppResult<()>;

    async fn list_books(&self) -> AppResult<Vec<Book>>;
    async fn get_book(&self, book_id: i32) -> AppResult<Book>;
    /// Insert a book with every copy available
    async fn create_book(&self, book: &CreateBook) -> AppResult<Book>;
    /// Apply changes; a new copy count shifts `available_copies` by the same delta
    async fn update_book(&self, book_id: i32, changes: &UpdateBook) -> AppResult<Book>;
    /// Fails with `Conflict` while a transaction on the book is issued
    async fn delete_book(&self, book_id: i32) -> AppResult<()>;

    async fn list_members(&self) -> AppResult<Vec<Member>>;
    async fn get_member(&self, member_id: i32) -> AppResult<Member>;
    /// Fails with `Validation` when the email is already registered
    async fn create_member(
        &self,
        member: &CreateMember,
        membership_date: DateTime<Utc>,
    ) -> AppResult<Member>;
    async fn update_member(&self, member_id: i32, changes: &UpdateMember) -> AppResult<Member>;
    /// Fails with `Conflict` while the member holds an issued transaction
    async fn delete_member(&self, member_id: i32) -> AppResult<()>;

    /// Take one copy and record the transaction.
    /// Checks run in order: book exists, copy available, member exists, member active.
    async fn issue(&self, transaction: &NewTransaction) -> AppResult<Transaction>;
    /// Close an issued transaction and give its copy back
    async fn return_transaction(
        &self,
        transaction_id: i32,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Transaction>;
    async fn transactions(&self, filter: &TransactionFilter) -> AppResult<Vec<TransactionRecord>>;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: books::BooksRepository,
    pub members: members::MembersRepository,
    pub transactions: transactions::TransactionsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            members: members::MembersRepository::new(pool.clone()),
            transactions: transactions::TransactionsRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl LendingStore for Repository {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        self.books.list().await
    }

    async fn get_book(&self, book_id: i32) -> AppResult<Book> {
        self.books.get_by_id(book_id).await
    }

    async fn create_book(&self, book: &CreateBook) -> AppResult<Book> {
        self.books.create(book).await
    }

    async fn update_book(&self, book_id: i32, changes: &UpdateBook) -> AppResult<Book> {
        self.books.update(book_id, changes).await
    }

    async fn delete_book(&self, book_id: i32) -> AppResult<()> {
        self.books.delete(book_id).await
    }

    async fn list_members(&self) -> AppResult<Vec<Member>> {
        self.members.list().await
    }

    async fn get_member(&self, member_id: i32) -> AppResult<Member> {
        self.members.get_by_id(member_id).await
    }

    async fn create_member(
        &self,
        member: &CreateMember,
        membership_date: DateTime<Utc>,
    ) -> AppResult<Member> {
        self.members.create(member, membership_date).await
    }

    async fn update_member(&self, member_id: i32, changes: &UpdateMember) -> AppResult<Member> {
        self.members.update(member_id, changes).await
    }

    async fn delete_member(&self, member_id: i32) -> AppResult<()> {
        self.members.delete(member_id).await
    }

    async fn issue(&self, transaction: &NewTransaction) -> AppResult<Transaction> {
        self.transactions.issue(transaction).await
    }

    async fn return_transaction(
        &self,
        transaction_id: i32,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Transaction> {
        self.transactions.return_transaction(transaction_id, returned_at).await
    }

    async fn transactions(&self, filter: &TransactionFilter) -> AppResult<Vec<TransactionRecord>> {
        self.transactions.find(filter).await
    }
}

/// Turn a unique-constraint violation into a validation error
pub(crate) fn unique_violation(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            AppError::Validation(message.to_string())
        }
        _ => AppError::Database(err),
    }
}
