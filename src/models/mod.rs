//! Data models for the lending desk

pub mod book;
pub mod member;
pub mod transaction;

// Re-export commonly used types
pub use book::{Book, CreateBook, UpdateBook};
pub use member::{CreateMember, Member, MemberStatus, UpdateMember};
pub use transaction::{
    IssueRequest, IssuedMember, NewTransaction, Transaction, TransactionDetails,
    TransactionFilter, TransactionQuery, TransactionRecord, TransactionStatus,
};
