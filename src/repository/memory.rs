//! In-memory store
//!
//! Every operation runs under one write lock over the whole state, which
//! serializes issues and returns the same way a database transaction would.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{
        Book, CreateBook, CreateMember, Member, NewTransaction, Transaction, TransactionFilter,
        TransactionRecord, TransactionStatus, UpdateBook, UpdateMember,
    },
};

use super::LendingStore;

const DUPLICATE_EMAIL: &str = "A member with this email already exists";

#[derive(Debug, Default)]
struct MemoryState {
    books: BTreeMap<i32, Book>,
    members: BTreeMap<i32, Member>,
    transactions: BTreeMap<i32, Transaction>,
    last_book_id: i32,
    last_member_id: i32,
    last_transaction_id: i32,
}

impl MemoryState {
    fn book(&self, id: i32) -> AppResult<&Book> {
        self.books
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    fn member(&self, id: i32) -> AppResult<&Member> {
        self.members
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", id)))
    }

    fn email_taken(&self, email: &str, exclude_id: Option<i32>) -> bool {
        self.members.values().any(|m| {
            Some(m.member_id) != exclude_id && m.email.eq_ignore_ascii_case(email)
        })
    }

    fn issued_count(&self, pred: impl Fn(&Transaction) -> bool) -> usize {
        self.transactions
            .values()
            .filter(|t| t.is_issued() && pred(t))
            .count()
    }

    fn record(&self, transaction: &Transaction) -> TransactionRecord {
        let book = self.books.get(&transaction.book_id);
        let member = self.members.get(&transaction.member_id);
        TransactionRecord {
            transaction: transaction.clone(),
            book_title: book.map(|b| b.title.clone()),
            book_author: book.map(|b| b.author.clone()),
            first_name: member.map(|m| m.first_name.clone()),
            last_name: member.map(|m| m.last_name.clone()),
            email: member.map(|m| m.email.clone()),
            phone: member.and_then(|m| m.phone.clone()),
        }
    }
}

/// Store keeping everything in process memory; contents are lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LendingStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        Ok(self.state.read().await.books.values().cloned().collect())
    }

    async fn get_book(&self, book_id: i32) -> AppResult<Book> {
        self.state.read().await.book(book_id).cloned()
    }

    async fn create_book(&self, book: &CreateBook) -> AppResult<Book> {
        let mut state = self.state.write().await;
        state.last_book_id += 1;
        let created = Book {
            book_id: state.last_book_id,
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            publication_year: book.publication_year,
            publisher: book.publisher.clone(),
            genre: book.genre.clone(),
            total_copies: book.total_copies,
            available_copies: book.total_copies,
            created_at: Utc::now(),
        };
        state.books.insert(created.book_id, created.clone());
        Ok(created)
    }

    async fn update_book(&self, book_id: i32, changes: &UpdateBook) -> AppResult<Book> {
        let mut state = self.state.write().await;
        let current = state.book(book_id)?.clone();

        let total_copies = changes.total_copies.unwrap_or(current.total_copies);
        let issued = current.issued_copies();
        if total_copies < issued {
            return Err(AppError::Validation(format!(
                "Cannot reduce copies to {}: {} currently issued",
                total_copies, issued
            )));
        }

        let updated = Book {
            title: changes.title.clone().unwrap_or(current.title),
            author: changes.author.clone().unwrap_or(current.author),
            isbn: changes.isbn.clone().or(current.isbn),
            publication_year: changes.publication_year.or(current.publication_year),
            publisher: changes.publisher.clone().or(current.publisher),
            genre: changes.genre.clone().or(current.genre),
            total_copies,
            available_copies: total_copies - issued,
            ..current
        };
        state.books.insert(book_id, updated.clone());
        Ok(updated)
    }

    async fn delete_book(&self, book_id: i32) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.book(book_id)?;

        let issued = state.issued_count(|t| t.book_id == book_id);
        if issued > 0 {
            return Err(AppError::Conflict(format!(
                "Book {} has {} copies currently issued",
                book_id, issued
            )));
        }

        state.books.remove(&book_id);
        Ok(())
    }

    async fn list_members(&self) -> AppResult<Vec<Member>> {
        Ok(self.state.read().await.members.values().cloned().collect())
    }

    async fn get_member(&self, member_id: i32) -> AppResult<Member> {
        self.state.read().await.member(member_id).cloned()
    }

    async fn create_member(
        &self,
        member: &CreateMember,
        membership_date: DateTime<Utc>,
    ) -> AppResult<Member> {
        let mut state = self.state.write().await;
        if state.email_taken(&member.email, None) {
            return Err(AppError::Validation(DUPLICATE_EMAIL.to_string()));
        }

        state.last_member_id += 1;
        let created = Member {
            member_id: state.last_member_id,
            first_name: member.first_name.clone(),
            last_name: member.last_name.clone(),
            email: member.email.clone(),
            phone: member.phone.clone(),
            address: member.address.clone(),
            membership_date,
            status: member.status.unwrap_or_default(),
        };
        state.members.insert(created.member_id, created.clone());
        Ok(created)
    }

    async fn update_member(&self, member_id: i32, changes: &UpdateMember) -> AppResult<Member> {
        let mut state = self.state.write().await;
        let current = state.member(member_id)?.clone();

        if let Some(ref email) = changes.email {
            if state.email_taken(email, Some(member_id)) {
                return Err(AppError::Validation(DUPLICATE_EMAIL.to_string()));
            }
        }

        let updated = Member {
            first_name: changes.first_name.clone().unwrap_or(current.first_name),
            last_name: changes.last_name.clone().unwrap_or(current.last_name),
            email: changes.email.clone().unwrap_or(current.email),
            phone: changes.phone.clone().or(current.phone),
            address: changes.address.clone().or(current.address),
            status: changes.status.unwrap_or(current.status),
            ..current
        };
        state.members.insert(member_id, updated.clone());
        Ok(updated)
    }

    async fn delete_member(&self, member_id: i32) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.member(member_id)?;

        let issued = state.issued_count(|t| t.member_id == member_id);
        if issued > 0 {
            return Err(AppError::Conflict(format!(
                "Member {} still has {} books issued",
                member_id, issued
            )));
        }

        state.members.remove(&member_id);
        Ok(())
    }

    async fn issue(&self, new: &NewTransaction) -> AppResult<Transaction> {
        let mut state = self.state.write().await;

        if state.book(new.book_id)?.available_copies <= 0 {
            return Err(AppError::Unavailable(format!(
                "No copies of book {} are available",
                new.book_id
            )));
        }

        let status = state.member(new.member_id)?.status;
        if !status.can_borrow() {
            return Err(AppError::Ineligible(format!(
                "Member {} is {} and cannot borrow books",
                new.member_id, status
            )));
        }

        state.last_transaction_id += 1;
        let transaction = Transaction {
            transaction_id: state.last_transaction_id,
            book_id: new.book_id,
            member_id: new.member_id,
            issue_date: new.issue_date,
            due_date: new.due_date,
            return_date: None,
            status: TransactionStatus::Issued,
        };

        if let Some(book) = state.books.get_mut(&new.book_id) {
            book.available_copies -= 1;
        }
        state
            .transactions
            .insert(transaction.transaction_id, transaction.clone());

        Ok(transaction)
    }

    async fn return_transaction(
        &self,
        transaction_id: i32,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Transaction> {
        let mut state = self.state.write().await;

        let transaction = state.transactions.get_mut(&transaction_id).ok_or_else(|| {
            AppError::NotFound(format!("Transaction with id {} not found", transaction_id))
        })?;

        if !transaction.is_issued() {
            return Err(AppError::AlreadyReturned(format!(
                "Transaction {} is already returned",
                transaction_id
            )));
        }

        transaction.status = TransactionStatus::Returned;
        transaction.return_date = Some(returned_at);
        let returned = transaction.clone();

        if let Some(book) = state.books.get_mut(&returned.book_id) {
            if book.available_copies < book.total_copies {
                book.available_copies += 1;
            }
        }

        Ok(returned)
    }

    async fn transactions(&self, filter: &TransactionFilter) -> AppResult<Vec<TransactionRecord>> {
        let state = self.state.read().await;
        let mut matching: Vec<&Transaction> = state
            .transactions
            .values()
            .filter(|t| filter.matches(t))
            .collect();
        matching.sort_by_key(|t| (t.issue_date, t.transaction_id));
        Ok(matching.into_iter().map(|t| state.record(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemberStatus;
    use chrono::Duration;
    use std::sync::Arc;

    fn new_book(total_copies: i32) -> CreateBook {
        CreateBook {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            isbn: Some("978-0441013593".to_string()),
            publication_year: Some(1965),
            publisher: None,
            genre: Some("Science Fiction".to_string()),
            total_copies,
        }
    }

    fn new_member(email: &str, status: MemberStatus) -> CreateMember {
        CreateMember {
            first_name: "Paul".to_string(),
            last_name: "Atreides".to_string(),
            email: email.to_string(),
            phone: None,
            address: None,
            status: Some(status),
        }
    }

    fn issue_of(book_id: i32, member_id: i32) -> NewTransaction {
        let now = Utc::now();
        NewTransaction {
            book_id,
            member_id,
            issue_date: now,
            due_date: now + Duration::days(14),
        }
    }

    async fn seeded(total_copies: i32) -> (MemoryStore, Book, Member) {
        let store = MemoryStore::new();
        let book = store.create_book(&new_book(total_copies)).await.unwrap();
        let member = store
            .create_member(&new_member("paul@arrakis.org", MemberStatus::Active), Utc::now())
            .await
            .unwrap();
        (store, book, member)
    }

    #[tokio::test]
    async fn test_new_book_has_every_copy_available() {
        let (_, book, _) = seeded(3).await;
        assert_eq!(book.total_copies, 3);
        assert_eq!(book.available_copies, 3);
    }

    #[tokio::test]
    async fn test_issue_and_return_scenario() {
        let (store, book, member) = seeded(2).await;

        let first = store.issue(&issue_of(book.book_id, member.member_id)).await.unwrap();
        assert_eq!(first.status, TransactionStatus::Issued);
        assert_eq!(first.due_date - first.issue_date, Duration::days(14));
        assert_eq!(store.get_book(book.book_id).await.unwrap().available_copies, 1);

        store.issue(&issue_of(book.book_id, member.member_id)).await.unwrap();
        assert_eq!(store.get_book(book.book_id).await.unwrap().available_copies, 0);

        let third = store.issue(&issue_of(book.book_id, member.member_id)).await;
        assert!(matches!(third, Err(AppError::Unavailable(_))));
        assert_eq!(store.get_book(book.book_id).await.unwrap().available_copies, 0);

        let returned = store
            .return_transaction(first.transaction_id, Utc::now())
            .await
            .unwrap();
        assert_eq!(returned.status, TransactionStatus::Returned);
        assert!(returned.return_date.is_some());
        assert_eq!(store.get_book(book.book_id).await.unwrap().available_copies, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_issues_of_last_copy() {
        let (store, book, member) = seeded(1).await;
        let store = Arc::new(store);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let new = issue_of(book.book_id, member.member_id);
                tokio::spawn(async move { store.issue(&new).await })
            })
            .collect();

        let mut successes = 0;
        let mut unavailable = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AppError::Unavailable(_)) => unavailable += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(unavailable, 1);
        assert_eq!(store.get_book(book.book_id).await.unwrap().available_copies, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_copy_count_stays_in_bounds_under_load() {
        let (store, book, member) = seeded(3).await;
        let store = Arc::new(store);

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                let new = issue_of(book.book_id, member.member_id);
                tokio::spawn(async move { store.issue(&new).await })
            })
            .collect();

        let mut issued = Vec::new();
        for handle in handles {
            if let Ok(t) = handle.await.unwrap() {
                issued.push(t);
            }
        }
        assert_eq!(issued.len(), 3);

        let returns: Vec<_> = issued
            .iter()
            .flat_map(|t| [t.transaction_id, t.transaction_id])
            .map(|id| {
                let store = store.clone();
                tokio::spawn(async move { store.return_transaction(id, Utc::now()).await })
            })
            .collect();
        let mut ok = 0;
        for handle in returns {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 3);

        let book = store.get_book(book.book_id).await.unwrap();
        assert_eq!(book.available_copies, book.total_copies);
    }

    #[tokio::test]
    async fn test_double_return_is_rejected() {
        let (store, book, member) = seeded(1).await;
        let t = store.issue(&issue_of(book.book_id, member.member_id)).await.unwrap();

        store.return_transaction(t.transaction_id, Utc::now()).await.unwrap();
        assert_eq!(store.get_book(book.book_id).await.unwrap().available_copies, 1);

        let again = store.return_transaction(t.transaction_id, Utc::now()).await;
        assert!(matches!(again, Err(AppError::AlreadyReturned(_))));
        assert_eq!(store.get_book(book.book_id).await.unwrap().available_copies, 1);
    }

    #[tokio::test]
    async fn test_return_unknown_transaction() {
        let store = MemoryStore::new();
        let result = store.return_transaction(42, Utc::now()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_inactive_member_cannot_borrow_and_nothing_changes() {
        let (store, book, _) = seeded(1).await;
        let suspended = store
            .create_member(&new_member("feyd@giedi.org", MemberStatus::Suspended), Utc::now())
            .await
            .unwrap();

        let result = store.issue(&issue_of(book.book_id, suspended.member_id)).await;
        assert!(matches!(result, Err(AppError::Ineligible(_))));
        assert_eq!(store.get_book(book.book_id).await.unwrap().available_copies, 1);
        assert!(store
            .transactions(&TransactionFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_is_reported_before_eligibility() {
        let (store, book, member) = seeded(1).await;
        let pending = store
            .create_member(&new_member("alia@arrakis.org", MemberStatus::Pending), Utc::now())
            .await
            .unwrap();
        store.issue(&issue_of(book.book_id, member.member_id)).await.unwrap();

        let result = store.issue(&issue_of(book.book_id, pending.member_id)).await;
        assert!(matches!(result, Err(AppError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_issue_unknown_book_or_member() {
        let (store, book, member) = seeded(1).await;
        assert!(matches!(
            store.issue(&issue_of(99, member.member_id)).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.issue(&issue_of(book.book_id, 99)).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(store.get_book(book.book_id).await.unwrap().available_copies, 1);
    }

    #[tokio::test]
    async fn test_delete_book_blocked_while_issued() {
        let (store, book, member) = seeded(1).await;
        let t = store.issue(&issue_of(book.book_id, member.member_id)).await.unwrap();

        let blocked = store.delete_book(book.book_id).await;
        assert!(matches!(blocked, Err(AppError::Conflict(_))));

        store.return_transaction(t.transaction_id, Utc::now()).await.unwrap();
        store.delete_book(book.book_id).await.unwrap();
        assert!(matches!(
            store.get_book(book.book_id).await,
            Err(AppError::NotFound(_))
        ));

        // the audit trail survives the book
        let history = store.transactions(&TransactionFilter::default()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].book_title, None);
    }

    #[tokio::test]
    async fn test_delete_member_blocked_while_issued() {
        let (store, book, member) = seeded(1).await;
        let t = store.issue(&issue_of(book.book_id, member.member_id)).await.unwrap();

        assert!(matches!(
            store.delete_member(member.member_id).await,
            Err(AppError::Conflict(_))
        ));

        store.return_transaction(t.transaction_id, Utc::now()).await.unwrap();
        store.delete_member(member.member_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_email_is_a_validation_error() {
        let (store, _, _) = seeded(1).await;
        let result = store
            .create_member(&new_member("PAUL@arrakis.org", MemberStatus::Active), Utc::now())
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_member_email_clash() {
        let (store, _, paul) = seeded(1).await;
        let other = store
            .create_member(&new_member("chani@sietch.org", MemberStatus::Active), Utc::now())
            .await
            .unwrap();

        let clash = UpdateMember {
            email: Some(paul.email.clone()),
            ..Default::default()
        };
        assert!(matches!(
            store.update_member(other.member_id, &clash).await,
            Err(AppError::Validation(_))
        ));

        // keeping your own email is fine
        let same = UpdateMember {
            email: Some(paul.email.clone()),
            status: Some(MemberStatus::Inactive),
            ..Default::default()
        };
        let updated = store.update_member(paul.member_id, &same).await.unwrap();
        assert_eq!(updated.status, MemberStatus::Inactive);
        assert_eq!(updated.membership_date, paul.membership_date);
    }

    #[tokio::test]
    async fn test_update_copies_keeps_issued_count() {
        let (store, book, member) = seeded(3).await;
        store.issue(&issue_of(book.book_id, member.member_id)).await.unwrap();
        store.issue(&issue_of(book.book_id, member.member_id)).await.unwrap();

        let grow = UpdateBook {
            total_copies: Some(5),
            ..Default::default()
        };
        let grown = store.update_book(book.book_id, &grow).await.unwrap();
        assert_eq!((grown.total_copies, grown.available_copies), (5, 3));

        let shrink = UpdateBook {
            total_copies: Some(2),
            ..Default::default()
        };
        let shrunk = store.update_book(book.book_id, &shrink).await.unwrap();
        assert_eq!((shrunk.total_copies, shrunk.available_copies), (2, 0));

        let too_far = UpdateBook {
            total_copies: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            store.update_book(book.book_id, &too_far).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(store.get_book(book.book_id).await.unwrap().total_copies, 2);
    }

    #[tokio::test]
    async fn test_transactions_ordered_by_issue_date() {
        let (store, book, member) = seeded(3).await;
        let now = Utc::now();
        for days_ago in [1, 5, 3] {
            store
                .issue(&NewTransaction {
                    book_id: book.book_id,
                    member_id: member.member_id,
                    issue_date: now - Duration::days(days_ago),
                    due_date: now - Duration::days(days_ago) + Duration::days(14),
                })
                .await
                .unwrap();
        }

        let records = store
            .transactions(&TransactionFilter::issued_for_book(book.book_id))
            .await
            .unwrap();
        let ids: Vec<i32> = records.iter().map(|r| r.transaction.transaction_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(records[0].first_name.as_deref(), Some("Paul"));
    }
}
