//! Persistence boundary.
//!
//! The store is an external collaborator: the engine reads from and writes
//! through it on every state transition but does not own its bookkeeping.
//! `InMemoryStore` is the default backend; a database-backed implementation
//! only needs to provide the same trait.

use crate::model::{InviteId, InviteRecord, MatchId, MatchRecord, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("match {0} not found")]
    MatchNotFound(MatchId),

    #[error("invite {0} not found")]
    InviteNotFound(InviteId),

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Audit record written together with every balance change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditEntry {
    pub user: UserId,
    pub amount: i64,
    pub reason: String,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// Persistence operations the engine depends on.
///
/// `credit` is assumed atomic with its audit record; the engine's
/// responsibility is to call it exactly once per payable outcome.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn create_match(&self, record: MatchRecord) -> Result<(), StoreError>;
    async fn fetch_match(&self, id: MatchId) -> Result<Option<MatchRecord>, StoreError>;
    async fn update_match(&self, record: &MatchRecord) -> Result<(), StoreError>;

    async fn create_invite(&self, record: InviteRecord) -> Result<(), StoreError>;
    async fn fetch_invite(&self, id: InviteId) -> Result<Option<InviteRecord>, StoreError>;
    async fn update_invite(&self, record: &InviteRecord) -> Result<(), StoreError>;
    async fn find_pending_invite(
        &self,
        from: UserId,
        to: UserId,
    ) -> Result<Option<InviteRecord>, StoreError>;
    async fn invites_for(&self, user: UserId) -> Result<Vec<InviteRecord>, StoreError>;

    async fn credit(&self, user: UserId, amount: i64, reason: &str) -> Result<i64, StoreError>;
    async fn balance(&self, user: UserId) -> Result<i64, StoreError>;
}

/// In-process store backed by concurrent maps.
#[derive(Default)]
pub struct InMemoryStore {
    matches: DashMap<MatchId, MatchRecord>,
    invites: DashMap<InviteId, InviteRecord>,
    balances: DashMap<UserId, i64>,
    ledger: Mutex<Vec<CreditEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the credit audit trail, newest last.
    pub fn ledger(&self) -> Vec<CreditEntry> {
        self.ledger.lock().expect("ledger lock poisoned").clone()
    }
}

#[async_trait]
impl MatchStore for InMemoryStore {
    async fn create_match(&self, record: MatchRecord) -> Result<(), StoreError> {
        self.matches.insert(record.id, record);
        Ok(())
    }

    async fn fetch_match(&self, id: MatchId) -> Result<Option<MatchRecord>, StoreError> {
        Ok(self.matches.get(&id).map(|r| r.clone()))
    }

    async fn update_match(&self, record: &MatchRecord) -> Result<(), StoreError> {
        match self.matches.get_mut(&record.id) {
            Some(mut existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::MatchNotFound(record.id)),
        }
    }

    async fn create_invite(&self, record: InviteRecord) -> Result<(), StoreError> {
        self.invites.insert(record.id, record);
        Ok(())
    }

    async fn fetch_invite(&self, id: InviteId) -> Result<Option<InviteRecord>, StoreError> {
        Ok(self.invites.get(&id).map(|r| r.clone()))
    }

    async fn update_invite(&self, record: &InviteRecord) -> Result<(), StoreError> {
        match self.invites.get_mut(&record.id) {
            Some(mut existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::InviteNotFound(record.id)),
        }
    }

    async fn find_pending_invite(
        &self,
        from: UserId,
        to: UserId,
    ) -> Result<Option<InviteRecord>, StoreError> {
        use crate::model::InviteStatus;
        Ok(self
            .invites
            .iter()
            .find(|entry| {
                entry.from_user == from
                    && entry.to_user == to
                    && entry.status == InviteStatus::Pending
            })
            .map(|entry| entry.clone()))
    }

    async fn invites_for(&self, user: UserId) -> Result<Vec<InviteRecord>, StoreError> {
        let mut result: Vec<InviteRecord> = self
            .invites
            .iter()
            .filter(|entry| entry.from_user == user || entry.to_user == user)
            .map(|entry| entry.clone())
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn credit(&self, user: UserId, amount: i64, reason: &str) -> Result<i64, StoreError> {
        // The balance entry guard keeps the update and its audit record a
        // single unit with respect to other credits for the same user.
        let mut balance = self.balances.entry(user).or_insert(0);
        *balance += amount;
        let new_balance = *balance;
        self.ledger
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger lock poisoned".to_string()))?
            .push(CreditEntry {
                user,
                amount,
                reason: reason.to_string(),
                balance_after: new_balance,
                created_at: Utc::now(),
            });
        Ok(new_balance)
    }

    async fn balance(&self, user: UserId) -> Result<i64, StoreError> {
        Ok(self.balances.get(&user).map(|b| *b).unwrap_or(0))
    }
}
