//! Lending transaction model and related types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::{IntoParams, ToSchema};

/// Transaction lifecycle: `Issued -> Returned`, no way back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum TransactionStatus {
    Issued,
    Returned,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Issued => "Issued",
            TransactionStatus::Returned => "Returned",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "issued" => Ok(TransactionStatus::Issued),
            "returned" => Ok(TransactionStatus::Returned),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

impl sqlx::Type<Postgres> for TransactionStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for TransactionStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for TransactionStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Whole days between the due date and `until`, never negative.
///
/// Returned transactions are measured against their return date so a late
/// return keeps its lateness; issued ones are measured against `today`.
pub fn days_overdue(
    due_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
    today: NaiveDate,
) -> i64 {
    let until = return_date.map(|d| d.date_naive()).unwrap_or(today);
    (until - due_date.date_naive()).num_days().max(0)
}

/// Transaction model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Transaction {
    pub transaction_id: i32,
    pub book_id: i32,
    pub member_id: i32,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: TransactionStatus,
}

impl Transaction {
    pub fn is_issued(&self) -> bool {
        self.status == TransactionStatus::Issued
    }

    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        days_overdue(self.due_date, self.return_date, today)
    }

    /// Overdue means still out and past its due date
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_issued() && self.days_overdue(today) > 0
    }
}

/// Values for a transaction about to be issued
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub book_id: i32,
    pub member_id: i32,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// Transaction joined with the book and member it references.
/// Book or member columns are empty when that row has since been deleted.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct TransactionRecord {
    #[sqlx(flatten)]
    pub transaction: Transaction,
    pub book_title: Option<String>,
    pub book_author: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl TransactionRecord {
    fn member_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(name), None) | (None, Some(name)) => name.clone(),
            (None, None) => String::new(),
        }
    }

    pub fn into_details(self, today: NaiveDate) -> TransactionDetails {
        let member_name = self.member_name();
        let days_overdue = self.transaction.days_overdue(today);
        let is_overdue = self.transaction.is_overdue(today);
        TransactionDetails {
            transaction_id: self.transaction.transaction_id,
            book_id: self.transaction.book_id,
            member_id: self.transaction.member_id,
            issue_date: self.transaction.issue_date,
            due_date: self.transaction.due_date,
            return_date: self.transaction.return_date,
            status: self.transaction.status,
            book_title: self.book_title.unwrap_or_default(),
            book_author: self.book_author.unwrap_or_default(),
            member_name,
            member_email: self.email.unwrap_or_default(),
            days_overdue,
            is_overdue,
        }
    }

    pub fn into_issued_member(self, today: NaiveDate) -> IssuedMember {
        let days_overdue = self.transaction.days_overdue(today);
        let is_overdue = self.transaction.is_overdue(today);
        IssuedMember {
            member_id: self.transaction.member_id,
            first_name: self.first_name.unwrap_or_default(),
            last_name: self.last_name.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            phone: self.phone,
            transaction_id: self.transaction.transaction_id,
            issue_date: self.transaction.issue_date,
            due_date: self.transaction.due_date,
            days_overdue,
            is_overdue,
        }
    }
}

/// Transaction with book/member labels and overdue fields for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransactionDetails {
    pub transaction_id: i32,
    pub book_id: i32,
    pub member_id: i32,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: TransactionStatus,
    pub book_title: String,
    pub book_author: String,
    pub member_name: String,
    pub member_email: String,
    pub days_overdue: i64,
    pub is_overdue: bool,
}

/// A member currently holding a copy of a given book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IssuedMember {
    pub member_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub transaction_id: i32,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub days_overdue: i64,
    pub is_overdue: bool,
}

/// Issue book request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssueRequest {
    pub book_id: i32,
    pub member_id: i32,
    /// Borrow period in days (defaults to the configured period)
    pub borrow_days: Option<i64>,
}

/// Transaction list query parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams, ToSchema)]
pub struct TransactionQuery {
    pub member_id: Option<i32>,
    pub status: Option<TransactionStatus>,
}

/// Store-level selection of transactions.
/// Results are ordered by issue date, then transaction id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    pub book_id: Option<i32>,
    pub member_id: Option<i32>,
    pub status: Option<TransactionStatus>,
}

impl TransactionFilter {
    pub fn issued_for_book(book_id: i32) -> Self {
        Self {
            book_id: Some(book_id),
            status: Some(TransactionStatus::Issued),
            ..Default::default()
        }
    }

    pub fn for_member(member_id: i32) -> Self {
        Self {
            member_id: Some(member_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, transaction: &Transaction) -> bool {
        self.book_id.map_or(true, |id| id == transaction.book_id)
            && self.member_id.map_or(true, |id| id == transaction.member_id)
            && self.status.map_or(true, |s| s == transaction.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn issued(due_date: DateTime<Utc>) -> Transaction {
        Transaction {
            transaction_id: 1,
            book_id: 1,
            member_id: 1,
            issue_date: due_date - Duration::days(14),
            due_date,
            return_date: None,
            status: TransactionStatus::Issued,
        }
    }

    #[test]
    fn test_due_yesterday_is_one_day_overdue() {
        let now = Utc::now();
        let t = issued(now - Duration::days(1));
        assert_eq!(t.days_overdue(now.date_naive()), 1);
        assert!(t.is_overdue(now.date_naive()));
    }

    #[test]
    fn test_due_today_is_not_overdue() {
        let now = Utc::now();
        let t = issued(now);
        assert_eq!(t.days_overdue(now.date_naive()), 0);
        assert!(!t.is_overdue(now.date_naive()));
    }

    #[test]
    fn test_not_yet_due_is_never_negative() {
        let now = Utc::now();
        let t = issued(now + Duration::days(10));
        assert_eq!(t.days_overdue(now.date_naive()), 0);
    }

    #[test]
    fn test_returned_late_keeps_lateness_but_is_not_overdue() {
        let now = Utc::now();
        let mut t = issued(now - Duration::days(10));
        t.return_date = Some(now - Duration::days(7));
        t.status = TransactionStatus::Returned;
        assert_eq!(t.days_overdue(now.date_naive()), 3);
        assert!(!t.is_overdue(now.date_naive()));
    }

    #[test]
    fn test_returned_on_time_has_no_overdue_days() {
        let now = Utc::now();
        let mut t = issued(now - Duration::days(2));
        t.return_date = Some(now - Duration::days(5));
        t.status = TransactionStatus::Returned;
        assert_eq!(t.days_overdue(now.date_naive()), 0);
    }

    #[test]
    fn test_filter_matches() {
        let t = issued(Utc::now());
        assert!(TransactionFilter::issued_for_book(1).matches(&t));
        assert!(!TransactionFilter::issued_for_book(2).matches(&t));
        assert!(TransactionFilter::for_member(1).matches(&t));
        let returned_only = TransactionFilter {
            status: Some(TransactionStatus::Returned),
            ..Default::default()
        };
        assert!(!returned_only.matches(&t));
    }
}
