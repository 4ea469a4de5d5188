//! Player-versus-player challenge flow.
//!
//! An invite moves PENDING -> ACCEPTED | DECLINED | EXPIRED, one way only.
//! Acceptance assigns white uniformly at random, creates the match, and
//! starts its session and timer through the registry.

use crate::errors::{EngineError, EngineResult};
use crate::model::{InviteId, InviteRecord, InviteStatus, MatchRecord, MatchStatus, UserId};
use crate::registry::SessionRegistry;
use crate::session::MatchSession;
use crate::store::MatchStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Pending and live invites from a participant's point of view.
#[derive(Debug, Clone)]
pub struct InviteInbox {
    pub incoming: Vec<InviteRecord>,
    pub outgoing: Vec<InviteRecord>,
}

pub struct InviteService {
    store: Arc<dyn MatchStore>,
    registry: Arc<SessionRegistry>,
}

impl InviteService {
    pub fn new(store: Arc<dyn MatchStore>, registry: Arc<SessionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Challenge another participant.
    pub async fn create(&self, challenger: UserId, target: UserId) -> EngineResult<InviteRecord> {
        if challenger == target {
            return Err(EngineError::InvalidTarget);
        }
        if self
            .store
            .find_pending_invite(challenger, target)
            .await?
            .is_some()
        {
            return Err(EngineError::DuplicateInvite);
        }

        let invite = InviteRecord::new(challenger, target);
        self.store.create_invite(invite.clone()).await?;
        info!(invite_id = %invite.id, challenger, target, "invite created");
        Ok(invite)
    }

    /// Accept or decline. Only the addressed participant may respond, and
    /// only while the invite is still pending.
    pub async fn respond(
        &self,
        invite_id: InviteId,
        responder: UserId,
        accept: bool,
    ) -> EngineResult<(InviteRecord, Option<Arc<MatchSession>>)> {
        let mut invite = self
            .store
            .fetch_invite(invite_id)
            .await?
            .ok_or(EngineError::InviteNotFound(invite_id))?;
        if invite.status != InviteStatus::Pending || invite.to_user != responder {
            return Err(EngineError::InviteNotFound(invite_id));
        }

        if !accept {
            invite.status = InviteStatus::Declined;
            invite.updated_at = Utc::now();
            self.store.update_invite(&invite).await?;
            return Ok((invite, None));
        }

        // Coin toss for white; the assignment is fixed for the whole match.
        let white_user = if rand::random::<bool>() {
            invite.from_user
        } else {
            invite.to_user
        };
        let record = MatchRecord::new_pvp(
            invite.from_user,
            invite.to_user,
            white_user,
            self.registry.game_config().initial_clock_secs,
        );
        let session = self.registry.start_match(record).await?;

        invite.status = InviteStatus::Accepted;
        invite.match_id = Some(session.id());
        invite.updated_at = Utc::now();
        self.store.update_invite(&invite).await?;
        info!(invite_id = %invite.id, match_id = %session.id(), "invite accepted");

        Ok((invite, Some(session)))
    }

    /// Withdraw a pending challenge. Challenger only.
    pub async fn cancel(&self, invite_id: InviteId, challenger: UserId) -> EngineResult<InviteRecord> {
        let mut invite = self
            .store
            .fetch_invite(invite_id)
            .await?
            .ok_or(EngineError::InviteNotFound(invite_id))?;
        if invite.status != InviteStatus::Pending || invite.from_user != challenger {
            return Err(EngineError::InviteNotFound(invite_id));
        }

        invite.status = InviteStatus::Expired;
        invite.updated_at = Utc::now();
        self.store.update_invite(&invite).await?;
        Ok(invite)
    }

    /// Invites worth showing: pending ones, plus accepted ones whose match
    /// is still running.
    pub async fn inbox(&self, user: UserId) -> EngineResult<InviteInbox> {
        let mut incoming = Vec::new();
        let mut outgoing = Vec::new();

        for invite in self.store.invites_for(user).await? {
            let live = match invite.status {
                InviteStatus::Pending => true,
                InviteStatus::Accepted => match invite.match_id {
                    Some(match_id) => self
                        .store
                        .fetch_match(match_id)
                        .await?
                        .map(|m| m.status == MatchStatus::InProgress)
                        .unwrap_or(false),
                    None => false,
                },
                _ => false,
            };
            if !live {
                continue;
            }
            if invite.to_user == user {
                incoming.push(invite);
            } else {
                outgoing.push(invite);
            }
        }

        Ok(InviteInbox { incoming, outgoing })
    }
}
