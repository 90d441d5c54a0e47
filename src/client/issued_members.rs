//! Per-book cache of the members currently holding a copy
//!
//! Backs an expandable book list: each book's holders are fetched once per
//! session, every book has its own loading flag, and at most one book row is
//! expanded at a time. Expansion only changes once the holders are in hand.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::{error::AppResult, models::IssuedMember};

use super::LibraryClient;

/// Read contract the cache is built on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IssuedMembersSource: Send + Sync {
    async fn book_issued_members(&self, book_id: i32) -> AppResult<Vec<IssuedMember>>;
}

#[async_trait]
impl IssuedMembersSource for LibraryClient {
    async fn book_issued_members(&self, book_id: i32) -> AppResult<Vec<IssuedMember>> {
        LibraryClient::book_issued_members(self, book_id).await
    }
}

/// Outcome of [`IssuedMembersCache::toggle_book_expand`]
#[derive(Debug, Clone, PartialEq)]
pub enum Toggle {
    /// The book is now the expanded row
    Expanded(Vec<IssuedMember>),
    /// The book was the expanded row and is now collapsed
    Collapsed,
    /// Another toggle happened while this one was loading; nothing changed
    Superseded,
}

#[derive(Debug, Default)]
struct CacheState {
    members: HashMap<i32, Vec<IssuedMember>>,
    // fetches currently running per book
    in_flight: HashMap<i32, usize>,
    // bumped by clear_book_members so fetches started before it are not stored
    generations: HashMap<i32, u64>,
    expanded: Option<i32>,
    // bumped on every toggle so a slow load can tell it has been overtaken
    toggles: u64,
}

pub struct IssuedMembersCache<S> {
    source: S,
    state: Mutex<CacheState>,
}

impl<S: IssuedMembersSource> IssuedMembersCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        // the state holds no invariant a panicking writer could break halfway
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Holders of `book_id`, fetched on first use and served from memory after.
    ///
    /// Two calls for the same book racing before the first fetch resolves
    /// both fetch; the reads are idempotent so the later result simply wins.
    /// A failed fetch is not cached, so the next call retries.
    pub async fn load_issued_members(&self, book_id: i32) -> AppResult<Vec<IssuedMember>> {
        if let Some(cached) = self.cached(book_id) {
            return Ok(cached);
        }

        let generation = {
            let mut state = self.state();
            *state.in_flight.entry(book_id).or_default() += 1;
            state.generations.get(&book_id).copied().unwrap_or(0)
        };
        let result = self.source.book_issued_members(book_id).await;

        let mut state = self.state();
        if let Some(count) = state.in_flight.get_mut(&book_id) {
            *count -= 1;
            if *count == 0 {
                state.in_flight.remove(&book_id);
            }
        }
        match result {
            Ok(members) => {
                if state.generations.get(&book_id).copied().unwrap_or(0) == generation {
                    state.members.insert(book_id, members.clone());
                } else {
                    tracing::debug!("Dropping issued members of book {} fetched before a clear", book_id);
                }
                Ok(members)
            }
            Err(e) => {
                tracing::warn!("Error loading issued members for book {}: {}", book_id, e);
                Err(e)
            }
        }
    }

    /// Collapse `book_id` if it is the expanded row, otherwise load its
    /// holders and then make it the expanded row. A failed load leaves the
    /// expanded row as it was.
    pub async fn toggle_book_expand(&self, book_id: i32) -> AppResult<Toggle> {
        let ticket = {
            let mut state = self.state();
            state.toggles += 1;
            if state.expanded == Some(book_id) {
                state.expanded = None;
                return Ok(Toggle::Collapsed);
            }
            state.toggles
        };

        let members = self.load_issued_members(book_id).await?;

        let mut state = self.state();
        if state.toggles != ticket {
            tracing::debug!("Expand of book {} superseded by a later toggle", book_id);
            return Ok(Toggle::Superseded);
        }
        state.expanded = Some(book_id);
        Ok(Toggle::Expanded(members))
    }

    /// Forget the holders of `book_id`, e.g. after the book was deleted or
    /// a copy was issued or returned. Collapses the row if it was expanded,
    /// and a fetch still running for the book will not repopulate it.
    pub fn clear_book_members(&self, book_id: i32) {
        let mut state = self.state();
        state.members.remove(&book_id);
        *state.generations.entry(book_id).or_default() += 1;
        if state.expanded == Some(book_id) {
            state.expanded = None;
        }
    }

    pub fn is_loading(&self, book_id: i32) -> bool {
        self.state().in_flight.contains_key(&book_id)
    }

    pub fn expanded_book_id(&self) -> Option<i32> {
        self.state().expanded
    }

    /// Cached holders without fetching
    pub fn cached(&self, book_id: i32) -> Option<Vec<IssuedMember>> {
        self.state().members.get(&book_id).cloned()
    }
}
