//! Book (catalog entry) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Book model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub book_id: i32,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub publication_year: Option<i32>,
    pub publisher: Option<String>,
    pub genre: Option<String>,
    /// Number of lendable copies owned by the library
    pub total_copies: i32,
    /// Copies not currently issued, always within `0..=total_copies`
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
}

impl Book {
    /// Copies currently out on an issued transaction
    pub fn issued_copies(&self) -> i32 {
        self.total_copies - self.available_copies
    }
}

/// Create book request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[serde(default)]
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    pub isbn: Option<String>,
    #[validate(range(min = 0, max = 9999, message = "Publication year is out of range"))]
    pub publication_year: Option<i32>,
    pub publisher: Option<String>,
    pub genre: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1, message = "A book needs at least one copy"))]
    pub total_copies: i32,
}

/// Update book request
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Author cannot be empty"))]
    pub author: Option<String>,
    pub isbn: Option<String>,
    #[validate(range(min = 0, max = 9999, message = "Publication year is out of range"))]
    pub publication_year: Option<i32>,
    pub publisher: Option<String>,
    pub genre: Option<String>,
    /// New copy count; must stay at or above the number of issued copies
    #[validate(range(min = 1, message = "A book needs at least one copy"))]
    pub total_copies: Option<i32>,
}
