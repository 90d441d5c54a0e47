//! HTTP client bindings for the lending desk API
//!
//! Errors reported by the server come back as the same [`AppError`] kind
//! the server raised, message untouched.

pub mod issued_members;

use reqwest::{Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::{AppError, AppResult, ErrorResponse},
    models::{
        Book, CreateBook, CreateMember, IssueRequest, IssuedMember, Member, Transaction,
        TransactionDetails, TransactionQuery, UpdateBook, UpdateMember,
    },
};

pub use issued_members::{IssuedMembersCache, IssuedMembersSource, Toggle};

#[derive(Clone, Debug)]
pub struct LibraryClient {
    http: reqwest::Client,
    base_url: String,
}

impl LibraryClient {
    /// `base_url` is the API root, e.g. `http://localhost:3001/api/v1`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let response = self.http.get(self.url(path)).send().await?;
        parse(response).await
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> AppResult<T> {
        let response = self
            .http
            .request(method, self.url(path))
            .json(body)
            .send()
            .await?;
        parse(response).await
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        let response = self.http.delete(self.url(path)).send().await?;
        check(response).await.map(|_| ())
    }

    // Books

    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        self.get("/books").await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.get(&format!("/books/{}", id)).await
    }

    pub async fn create_book(&self, book: &CreateBook) -> AppResult<Book> {
        self.send_json(reqwest::Method::POST, "/books", book).await
    }

    pub async fn update_book(&self, id: i32, changes: &UpdateBook) -> AppResult<Book> {
        self.send_json(reqwest::Method::PUT, &format!("/books/{}", id), changes)
            .await
    }

    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        self.delete(&format!("/books/{}", id)).await
    }

    pub async fn book_issued_members(&self, id: i32) -> AppResult<Vec<IssuedMember>> {
        self.get(&format!("/books/{}/issued-members", id)).await
    }

    // Members

    pub async fn list_members(&self) -> AppResult<Vec<Member>> {
        self.get("/members").await
    }

    pub async fn get_member(&self, id: i32) -> AppResult<Member> {
        self.get(&format!("/members/{}", id)).await
    }

    pub async fn create_member(&self, member: &CreateMember) -> AppResult<Member> {
        self.send_json(reqwest::Method::POST, "/members", member).await
    }

    pub async fn update_member(&self, id: i32, changes: &UpdateMember) -> AppResult<Member> {
        self.send_json(reqwest::Method::PUT, &format!("/members/{}", id), changes)
            .await
    }

    pub async fn delete_member(&self, id: i32) -> AppResult<()> {
        self.delete(&format!("/members/{}", id)).await
    }

    pub async fn member_issued_books(&self, id: i32) -> AppResult<Vec<TransactionDetails>> {
        self.get(&format!("/members/{}/issued-books", id)).await
    }

    // Transactions

    pub async fn issue_book(&self, request: &IssueRequest) -> AppResult<Transaction> {
        self.send_json(reqwest::Method::POST, "/transactions", request)
            .await
    }

    pub async fn return_book(&self, transaction_id: i32) -> AppResult<Transaction> {
        let response = self
            .http
            .post(self.url(&format!("/transactions/{}/return", transaction_id)))
            .send()
            .await?;
        parse(response).await
    }

    pub async fn current_transactions(&self) -> AppResult<Vec<TransactionDetails>> {
        self.get("/transactions/current").await
    }

    pub async fn history(&self, query: &TransactionQuery) -> AppResult<Vec<TransactionDetails>> {
        let response = self
            .http
            .get(self.url("/transactions"))
            .query(query)
            .send()
            .await?;
        parse(response).await
    }

    pub async fn overdue(&self) -> AppResult<Vec<TransactionDetails>> {
        self.get("/transactions/overdue").await
    }
}

/// Turn a non-success response into the error the server reported
async fn check(response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await?;
    match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => Err(AppError::from_response(body)),
        Err(_) => Err(unexpected_status(status, text)),
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> AppResult<T> {
    Ok(check(response).await?.json().await?)
}

fn unexpected_status(status: StatusCode, text: String) -> AppError {
    match status {
        StatusCode::NOT_FOUND => AppError::NotFound(text),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => AppError::Validation(text),
        _ => AppError::Internal(format!("Unexpected response {}: {}", status, text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = LibraryClient::new("http://localhost:3001/api/v1/");
        assert_eq!(client.url("/books"), "http://localhost:3001/api/v1/books");
    }

    #[test]
    fn test_plain_status_fallback() {
        assert!(matches!(
            unexpected_status(StatusCode::NOT_FOUND, String::new()),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            unexpected_status(StatusCode::BAD_GATEWAY, "upstream".to_string()),
            AppError::Internal(m) if m.contains("upstream")
        ));
    }
}
