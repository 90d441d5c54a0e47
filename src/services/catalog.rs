//! Catalog management service

use std::sync::Arc;

use validator::Validate;

use crate::{
    error::AppResult,
    models::book::{Book, CreateBook, UpdateBook},
    repository::LendingStore,
};

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn LendingStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn LendingStore>) -> Self {
        Self { store }
    }

    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        self.store.list_books().await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.store.get_book(id).await
    }

    /// Create a new book; every copy starts available
    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;
        let created = self.store.create_book(&book).await?;
        tracing::info!(
            "Catalog: created book id={} \"{}\" ({} copies)",
            created.book_id, created.title, created.total_copies
        );
        Ok(created)
    }

    /// Update an existing book
    pub async fn update_book(&self, id: i32, changes: UpdateBook) -> AppResult<Book> {
        changes.validate()?;
        self.store.update_book(id, &changes).await
    }

    /// Delete a book (rejected while copies are issued)
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        match self.store.delete_book(id).await {
            Ok(()) => {
                tracing::info!("Catalog: deleted book id={}", id);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Catalog: delete of book id={} rejected: {}", id, e);
                Err(e)
            }
        }
    }
}
