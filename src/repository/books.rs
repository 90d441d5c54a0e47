//! Books repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, CreateBook, UpdateBook},
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// List the whole catalog
    pub async fn list(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>("SELECT * FROM books ORDER BY book_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE book_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Create a new book, all copies available
    pub async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, isbn, publication_year, publisher, genre,
                               total_copies, available_copies, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7, NOW())
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(book.publication_year)
        .bind(&book.publisher)
        .bind(&book.genre)
        .bind(book.total_copies)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Update a book. The row is locked so a concurrent issue or return
    /// cannot slip between reading the counts and writing them back.
    pub async fn update(&self, id: i32, changes: &UpdateBook) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE book_id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        let total_copies = changes.total_copies.unwrap_or(current.total_copies);
        let issued = current.issued_copies();
        if total_copies < issued {
            return Err(AppError::Validation(format!(
                "Cannot reduce copies to {}: {} currently issued",
                total_copies, issued
            )));
        }

        let updated = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                isbn = COALESCE($4, isbn),
                publication_year = COALESCE($5, publication_year),
                publisher = COALESCE($6, publisher),
                genre = COALESCE($7, genre),
                total_copies = $8,
                available_copies = $9
            WHERE book_id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.author)
        .bind(&changes.isbn)
        .bind(changes.publication_year)
        .bind(&changes.publisher)
        .bind(&changes.genre)
        .bind(total_copies)
        .bind(total_copies - issued)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Delete a book unless a copy is still out
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        // Lock the book row: issuing updates it, so no issue can race the check below
        let found: Option<i32> =
            sqlx::query_scalar("SELECT book_id FROM books WHERE book_id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        if found.is_none() {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        let issued: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE book_id = $1 AND status = 'Issued'",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if issued > 0 {
            return Err(AppError::Conflict(format!(
                "Book {} has {} copies currently issued",
                id, issued
            )));
        }

        sqlx::query("DELETE FROM books WHERE book_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
