//! Lending service: issuing, returning and overdue tracking

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    config::LendingConfig,
    error::{AppError, AppResult},
    models::transaction::{
        IssueRequest, IssuedMember, NewTransaction, Transaction, TransactionDetails,
        TransactionFilter, TransactionQuery, TransactionStatus,
    },
    repository::LendingStore,
};

#[derive(Clone)]
pub struct LendingService {
    store: Arc<dyn LendingStore>,
    config: LendingConfig,
}

impl LendingService {
    pub fn new(store: Arc<dyn LendingStore>, config: LendingConfig) -> Self {
        Self { store, config }
    }

    /// Issue a copy of a book to a member
    pub async fn issue_book(&self, request: IssueRequest) -> AppResult<Transaction> {
        let borrow_days = self.config.borrow_days(request.borrow_days).ok_or_else(|| {
            AppError::Validation(format!(
                "Borrow period must be between {} and {} days",
                self.config.min_borrow_days, self.config.max_borrow_days
            ))
        })?;

        let now = Utc::now();
        let due_date = Duration::try_days(borrow_days)
            .and_then(|period| now.checked_add_signed(period))
            .ok_or_else(|| {
                AppError::Validation(format!("Borrow period of {} days is out of range", borrow_days))
            })?;
        let new = NewTransaction {
            book_id: request.book_id,
            member_id: request.member_id,
            issue_date: now,
            due_date,
        };

        match self.store.issue(&new).await {
            Ok(transaction) => {
                tracing::info!(
                    "Lending: issued book {} to member {} (transaction {}, due {})",
                    transaction.book_id,
                    transaction.member_id,
                    transaction.transaction_id,
                    transaction.due_date.date_naive()
                );
                Ok(transaction)
            }
            Err(e) => {
                tracing::warn!(
                    "Lending: issue of book {} to member {} rejected: {}",
                    request.book_id, request.member_id, e
                );
                Err(e)
            }
        }
    }

    /// Return an issued transaction
    pub async fn return_book(&self, transaction_id: i32) -> AppResult<Transaction> {
        let returned = self
            .store
            .return_transaction(transaction_id, Utc::now())
            .await
            .map_err(|e| {
                tracing::warn!("Lending: return of transaction {} rejected: {}", transaction_id, e);
                e
            })?;

        tracing::info!(
            "Lending: transaction {} returned, book {} copy back on shelf",
            returned.transaction_id, returned.book_id
        );
        Ok(returned)
    }

    /// Members currently holding a copy of the book, oldest issue first
    pub async fn book_issued_members(&self, book_id: i32) -> AppResult<Vec<IssuedMember>> {
        self.store.get_book(book_id).await?;
        let today = Utc::now().date_naive();
        let records = self
            .store
            .transactions(&TransactionFilter::issued_for_book(book_id))
            .await?;
        Ok(records
            .into_iter()
            .map(|r| r.into_issued_member(today))
            .collect())
    }

    /// A member's outstanding and past transactions, outstanding first
    pub async fn member_issued_books(&self, member_id: i32) -> AppResult<Vec<TransactionDetails>> {
        self.store.get_member(member_id).await?;
        let mut details = self.details(&TransactionFilter::for_member(member_id)).await?;
        // stable: keeps issue-date order inside each group
        details.sort_by_key(|d| d.status != TransactionStatus::Issued);
        Ok(details)
    }

    /// All transactions still out
    pub async fn current_transactions(&self) -> AppResult<Vec<TransactionDetails>> {
        self.details(&TransactionFilter {
            status: Some(TransactionStatus::Issued),
            ..Default::default()
        })
        .await
    }

    /// Transaction history, newest first
    pub async fn history(&self, query: &TransactionQuery) -> AppResult<Vec<TransactionDetails>> {
        let mut details = self
            .details(&TransactionFilter {
                member_id: query.member_id,
                status: query.status,
                ..Default::default()
            })
            .await?;
        details.reverse();
        Ok(details)
    }

    /// Issued transactions past their due date, most overdue first
    pub async fn overdue(&self) -> AppResult<Vec<TransactionDetails>> {
        let mut details: Vec<_> = self
            .current_transactions()
            .await?
            .into_iter()
            .filter(|d| d.is_overdue)
            .collect();
        details.sort_by_key(|d| std::cmp::Reverse(d.days_overdue));
        Ok(details)
    }

    async fn details(&self, filter: &TransactionFilter) -> AppResult<Vec<TransactionDetails>> {
        let today = Utc::now().date_naive();
        let records = self.store.transactions(filter).await?;
        Ok(records.into_iter().map(|r| r.into_details(today)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{CreateBook, CreateMember, MemberStatus, UpdateMember},
        repository::{MemoryStore, MockLendingStore},
    };

    struct Fixture {
        store: Arc<MemoryStore>,
        service: LendingService,
        book_id: i32,
        member_id: i32,
    }

    async fn fixture(total_copies: i32) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let book = store
            .create_book(&CreateBook {
                title: "Children of Dune".to_string(),
                author: "Frank Herbert".to_string(),
                isbn: None,
                publication_year: Some(1976),
                publisher: None,
                genre: None,
                total_copies,
            })
            .await
            .unwrap();
        let member = store
            .create_member(
                &CreateMember {
                    first_name: "Leto".to_string(),
                    last_name: "Atreides".to_string(),
                    email: "leto@arrakis.org".to_string(),
                    phone: None,
                    address: None,
                    status: None,
                },
                Utc::now(),
            )
            .await
            .unwrap();
        Fixture {
            service: LendingService::new(store.clone(), LendingConfig::default()),
            store,
            book_id: book.book_id,
            member_id: member.member_id,
        }
    }

    fn request(f: &Fixture, borrow_days: Option<i64>) -> IssueRequest {
        IssueRequest {
            book_id: f.book_id,
            member_id: f.member_id,
            borrow_days,
        }
    }

    #[tokio::test]
    async fn test_default_borrow_period_is_fourteen_days() {
        let f = fixture(1).await;
        let t = f.service.issue_book(request(&f, None)).await.unwrap();
        assert_eq!(t.due_date - t.issue_date, Duration::days(14));
        assert_eq!(t.status, TransactionStatus::Issued);
    }

    #[tokio::test]
    async fn test_custom_borrow_period() {
        let f = fixture(1).await;
        let t = f.service.issue_book(request(&f, Some(30))).await.unwrap();
        assert_eq!(t.due_date - t.issue_date, Duration::days(30));
    }

    #[tokio::test]
    async fn test_out_of_range_borrow_period_never_reaches_store() {
        let service = LendingService::new(Arc::new(MockLendingStore::new()), LendingConfig::default());
        for days in [0, 31, -3] {
            let result = service
                .issue_book(IssueRequest {
                    book_id: 1,
                    member_id: 1,
                    borrow_days: Some(days),
                })
                .await;
            assert!(matches!(result, Err(AppError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn test_unrepresentable_due_date_is_a_validation_error() {
        // bounds that skipped AppConfig::load
        let config = LendingConfig {
            max_borrow_days: i64::MAX,
            ..Default::default()
        };
        let service = LendingService::new(Arc::new(MockLendingStore::new()), config);
        let result = service
            .issue_book(IssueRequest {
                book_id: 1,
                member_id: 1,
                borrow_days: Some(100_000_000_000_000),
            })
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_book_issued_members() {
        let f = fixture(2).await;
        let t = f.service.issue_book(request(&f, None)).await.unwrap();

        let holders = f.service.book_issued_members(f.book_id).await.unwrap();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].member_id, f.member_id);
        assert_eq!(holders[0].first_name, "Leto");
        assert_eq!(holders[0].transaction_id, t.transaction_id);
        assert!(!holders[0].is_overdue);

        f.service.return_book(t.transaction_id).await.unwrap();
        assert!(f.service.book_issued_members(f.book_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_issued_members_of_unknown_book() {
        let f = fixture(1).await;
        assert!(matches!(
            f.service.book_issued_members(404).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_member_issued_books_lists_outstanding_first() {
        let f = fixture(2).await;
        let first = f.service.issue_book(request(&f, None)).await.unwrap();
        let second = f.service.issue_book(request(&f, None)).await.unwrap();
        f.service.return_book(first.transaction_id).await.unwrap();

        let books = f.service.member_issued_books(f.member_id).await.unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].transaction_id, second.transaction_id);
        assert_eq!(books[0].status, TransactionStatus::Issued);
        assert_eq!(books[1].status, TransactionStatus::Returned);
        assert_eq!(books[0].book_title, "Children of Dune");
        assert_eq!(books[0].member_name, "Leto Atreides");
    }

    #[tokio::test]
    async fn test_overdue_tracking() {
        let f = fixture(3).await;
        let now = Utc::now();
        for days_late in [1, 4] {
            f.store
                .issue(&NewTransaction {
                    book_id: f.book_id,
                    member_id: f.member_id,
                    issue_date: now - Duration::days(14 + days_late),
                    due_date: now - Duration::days(days_late),
                })
                .await
                .unwrap();
        }
        f.service.issue_book(request(&f, None)).await.unwrap();

        let overdue = f.service.overdue().await.unwrap();
        let days: Vec<i64> = overdue.iter().map(|d| d.days_overdue).collect();
        assert_eq!(days, vec![4, 1]);
        assert_eq!(f.service.current_transactions().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_history_newest_first_and_filtered() {
        let f = fixture(2).await;
        let first = f.service.issue_book(request(&f, None)).await.unwrap();
        let second = f.service.issue_book(request(&f, None)).await.unwrap();
        f.service.return_book(first.transaction_id).await.unwrap();

        let all = f.service.history(&TransactionQuery::default()).await.unwrap();
        let ids: Vec<i32> = all.iter().map(|d| d.transaction_id).collect();
        assert_eq!(ids, vec![second.transaction_id, first.transaction_id]);

        let returned = f
            .service
            .history(&TransactionQuery {
                member_id: Some(f.member_id),
                status: Some(TransactionStatus::Returned),
            })
            .await
            .unwrap();
        assert_eq!(returned.len(), 1);
        assert_eq!(returned[0].transaction_id, first.transaction_id);
    }

    #[tokio::test]
    async fn test_suspension_blocks_new_issues_only() {
        let f = fixture(2).await;
        let t = f.service.issue_book(request(&f, None)).await.unwrap();

        f.store
            .update_member(
                f.member_id,
                &UpdateMember {
                    status: Some(MemberStatus::Suspended),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            f.service.issue_book(request(&f, None)).await,
            Err(AppError::Ineligible(_))
        ));
        // an existing loan can still come back
        f.service.return_book(t.transaction_id).await.unwrap();
        assert_eq!(f.store.get_book(f.book_id).await.unwrap().available_copies, 2);
    }
}
