use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::{FilterCriteria, SequencedItem};

/// Remaining-item threshold at which consumers get a low-remaining hint
pub const LOW_REMAINING_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Ready,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Ready => "READY",
            SessionStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "READY" => Some(SessionStatus::Ready),
            "EXPIRED" => Some(SessionStatus::Expired),
            _ => None,
        }
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle record of a session's content set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMetadata {
    pub session_id: String,
    pub status: SessionStatus,
    /// Items actually stored
    pub item_count: u32,
    /// Items the build aimed for; larger than `item_count` only when supply ran short
    pub requested_count: u32,
    pub criteria: FilterCriteria,
    /// Next index served by the shared walk
    pub cursor: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub refreshed_count: u32,
}

impl SessionMetadata {
    pub fn new(
        session_id: &str,
        criteria: FilterCriteria,
        item_count: u32,
        requested_count: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            status: SessionStatus::Ready,
            item_count,
            requested_count,
            criteria,
            cursor: 0,
            created_at: now,
            updated_at: now,
            expires_at: None,
            refreshed_count: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == SessionStatus::Ready
    }

    pub fn remaining(&self) -> u32 {
        self.item_count.saturating_sub(self.cursor)
    }

    /// Some(missing) when the catalog could not supply the requested count
    pub fn shortfall(&self) -> Option<u32> {
        (self.item_count < self.requested_count).then(|| self.requested_count - self.item_count)
    }

    /// True when an expiry marker exists and has passed
    pub fn expiry_due(&self, now: DateTime<Utc>) -> bool {
        self.is_ready() && self.expires_at.is_some_and(|at| at <= now)
    }
}

/// One participant's decision about one item of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantDecision {
    pub session_id: String,
    pub participant_id: String,
    pub item_id: u64,
}

/// Result of the store-level conditional cursor increment
#[derive(Debug, Clone, PartialEq)]
pub enum CursorAdvance {
    /// Cursor moved past `item`, read in the same step as the increment
    Advanced { item: SequencedItem, item_count: u32 },
    /// Cursor already at the end; nothing was mutated
    Exhausted { cursor: u32, item_count: u32 },
    Expired,
    Missing,
}

/// What a consumer receives when walking a content set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    Item {
        item: SequencedItem,
        remaining: u32,
        low_remaining: bool,
    },
    Exhausted {
        total_shown: u32,
        total_available: u32,
    },
}

impl AdvanceOutcome {
    /// Item of the shared walk, where everything after it is still unseen
    pub fn item(item: SequencedItem, item_count: u32) -> Self {
        let remaining = item_count.saturating_sub(item.sequence_index + 1);
        Self::with_remaining(item, remaining)
    }

    pub fn with_remaining(item: SequencedItem, remaining: u32) -> Self {
        Self::Item {
            item,
            remaining,
            low_remaining: remaining <= LOW_REMAINING_THRESHOLD,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, AdvanceOutcome::Exhausted { .. })
    }
}
