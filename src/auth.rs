//! Identity boundary.
//!
//! Authentication is owned by an external collaborator; the engine only
//! needs to turn a connection's token into a participant identity.

use crate::errors::{EngineError, EngineResult};
use crate::model::UserId;
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve a token to an authenticated participant.
    async fn authenticate(&self, token: &str) -> EngineResult<UserId>;
}

/// Token-to-user map loaded from configuration.
pub struct StaticTokenAuth {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenAuth {
    pub fn new(tokens: HashMap<String, UserId>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
    async fn authenticate(&self, token: &str) -> EngineResult<UserId> {
        self.tokens
            .get(token)
            .copied()
            .ok_or(EngineError::Unauthenticated)
    }
}
