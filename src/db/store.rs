//! Session store abstraction
//!
//! The store is the only shared mutable resource of the service. Every
//! mutation that more than one caller can race on (cursor increments, build
//! claims, first writes, status flips) is a conditional operation executed
//! atomically by the backend, never a read-modify-write in the caller.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt::Display;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{CursorAdvance, ParticipantDecision, SequencedItem, SessionMetadata},
};

/// Key layout shared by keyed backends
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Metadata(String),
    Items(String),
    BuildClaim(String),
    Participants(String),
    Decisions { session_id: String, participant_id: String },
}

impl Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKey::Metadata(id) => write!(f, "session:{}:meta", id),
            SessionKey::Items(id) => write!(f, "session:{}:items", id),
            SessionKey::BuildClaim(id) => write!(f, "session:{}:build", id),
            SessionKey::Participants(id) => write!(f, "session:{}:participants", id),
            SessionKey::Decisions {
                session_id,
                participant_id,
            } => write!(f, "session:{}:decisions:{}", session_id, participant_id),
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_metadata(&self, session_id: &str) -> AppResult<Option<SessionMetadata>>;

    /// Single-writer guard for builds. Returns true only for the caller that
    /// created the claim; the claim lapses after `ttl` if never released.
    async fn try_claim_build(&self, session_id: &str, token: &str, ttl: Duration)
        -> AppResult<bool>;

    /// Releases a claim if `token` still owns it
    async fn release_build(&self, session_id: &str, token: &str) -> AppResult<()>;

    /// Writes a first content set only when the session has no metadata yet.
    /// Returns false, writing nothing, when another build stored one first.
    async fn create_content_set_if_absent(
        &self,
        metadata: &SessionMetadata,
        items: &[SequencedItem],
    ) -> AppResult<bool>;

    /// Atomically drops any existing items, writes `items` and then writes
    /// `metadata`, whose cursor is taken as-is (0 for refreshed sets).
    async fn replace_content_set(
        &self,
        metadata: &SessionMetadata,
        items: &[SequencedItem],
    ) -> AppResult<()>;

    async fn get_item(&self, session_id: &str, index: u32) -> AppResult<Option<SequencedItem>>;

    /// All items ordered by sequence index
    async fn list_items(&self, session_id: &str) -> AppResult<Vec<SequencedItem>>;

    /// Removes metadata and items in one step. Returns whether metadata existed.
    async fn delete_content_set(&self, session_id: &str) -> AppResult<bool>;

    /// Increment-if-exists on the shared cursor, bounded by the item count.
    /// The served item is read in the same atomic step as the increment.
    async fn advance_cursor(&self, session_id: &str, now: DateTime<Utc>)
        -> AppResult<CursorAdvance>;

    /// Flips status to EXPIRED. Returns false when the session does not exist.
    async fn mark_expired(&self, session_id: &str, now: DateTime<Utc>) -> AppResult<bool>;

    /// Flips a READY session to EXPIRED only while its expiry marker still
    /// equals `expires_at`. Returns whether the flip happened.
    async fn mark_expired_if(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Stores the expiry marker. Returns false when the session does not exist.
    async fn set_expiry(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Records a decision; returns false if the participant already decided on the item
    async fn record_decision(&self, decision: &ParticipantDecision) -> AppResult<bool>;

    /// Ids of the items a participant has decided on
    async fn decided_items(&self, session_id: &str, participant_id: &str)
        -> AppResult<HashSet<u64>>;

    async fn delete_decisions(&self, session_id: &str) -> AppResult<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Checks that `items` form the contiguous sequence `0..metadata.item_count`
pub fn ensure_contiguous(metadata: &SessionMetadata, items: &[SequencedItem]) -> AppResult<()> {
    if items.len() != metadata.item_count as usize {
        return Err(AppError::BusinessRule(format!(
            "session {} declares {} items but {} were supplied",
            metadata.session_id,
            metadata.item_count,
            items.len()
        )));
    }

    for (position, item) in items.iter().enumerate() {
        if item.sequence_index as usize != position {
            return Err(AppError::BusinessRule(format!(
                "session {} has sequence index {} at position {}",
                metadata.session_id, item.sequence_index, position
            )));
        }
    }

    Ok(())
}
