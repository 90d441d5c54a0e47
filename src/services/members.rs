//! Member roster service

use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use crate::{
    error::AppResult,
    models::member::{CreateMember, Member, UpdateMember},
    repository::LendingStore,
};

#[derive(Clone)]
pub struct MembersService {
    store: Arc<dyn LendingStore>,
}

impl MembersService {
    pub fn new(store: Arc<dyn LendingStore>) -> Self {
        Self { store }
    }

    pub async fn list_members(&self) -> AppResult<Vec<Member>> {
        self.store.list_members().await
    }

    pub async fn get_member(&self, id: i32) -> AppResult<Member> {
        self.store.get_member(id).await
    }

    /// Register a member; membership starts now, status defaults to Active
    pub async fn create_member(&self, member: CreateMember) -> AppResult<Member> {
        member.validate()?;
        let created = self.store.create_member(&member, Utc::now()).await?;
        tracing::info!(
            "Members: registered id={} ({}) as {}",
            created.member_id, created.email, created.status
        );
        Ok(created)
    }

    /// Update a member; the membership date never changes
    pub async fn update_member(&self, id: i32, changes: UpdateMember) -> AppResult<Member> {
        changes.validate()?;
        let updated = self.store.update_member(id, &changes).await?;
        if changes.status.is_some() {
            tracing::info!("Members: id={} status is now {}", id, updated.status);
        }
        Ok(updated)
    }

    /// Delete a member (rejected while they hold a book)
    pub async fn delete_member(&self, id: i32) -> AppResult<()> {
        self.store.delete_member(id).await.map_err(|e| {
            tracing::warn!("Members: delete of id={} rejected: {}", id, e);
            e
        })?;
        tracing::info!("Members: deleted id={}", id);
        Ok(())
    }
}
