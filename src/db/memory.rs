use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::{
    db::store::{ensure_contiguous, SessionStore},
    error::{AppError, AppResult},
    models::{CursorAdvance, ParticipantDecision, SequencedItem, SessionMetadata, SessionStatus},
};

#[derive(Default)]
struct MemoryState {
    metadata: HashMap<String, SessionMetadata>,
    /// Vec position == sequence index
    items: HashMap<String, Vec<SequencedItem>>,
    claims: HashMap<String, (String, Instant)>,
    /// (session id, participant id) -> decided item ids
    decisions: HashMap<(String, String), HashSet<u64>>,
}

/// Session store kept in process memory.
///
/// Every operation takes the single lock for its whole duration, which gives
/// the same atomicity the Redis scripts provide. Used for local development
/// and tests; state is lost on restart.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_metadata(&self, session_id: &str) -> AppResult<Option<SessionMetadata>> {
        let state = self.state.read().await;
        Ok(state.metadata.get(session_id).cloned())
    }

    async fn try_claim_build(
        &self,
        session_id: &str,
        token: &str,
        ttl: Duration,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let now = Instant::now();

        if let Some((_, expires)) = state.claims.get(session_id) {
            if *expires > now {
                return Ok(false);
            }
        }

        state
            .claims
            .insert(session_id.to_string(), (token.to_string(), now + ttl));
        Ok(true)
    }

    async fn release_build(&self, session_id: &str, token: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state
            .claims
            .get(session_id)
            .is_some_and(|(owner, _)| owner == token)
        {
            state.claims.remove(session_id);
        }
        Ok(())
    }

    async fn create_content_set_if_absent(
        &self,
        metadata: &SessionMetadata,
        items: &[SequencedItem],
    ) -> AppResult<bool> {
        ensure_contiguous(metadata, items)?;

        let mut state = self.state.write().await;
        if state.metadata.contains_key(&metadata.session_id) {
            return Ok(false);
        }
        state
            .items
            .insert(metadata.session_id.clone(), items.to_vec());
        state
            .metadata
            .insert(metadata.session_id.clone(), metadata.clone());
        Ok(true)
    }

    async fn replace_content_set(
        &self,
        metadata: &SessionMetadata,
        items: &[SequencedItem],
    ) -> AppResult<()> {
        ensure_contiguous(metadata, items)?;

        let mut state = self.state.write().await;
        state
            .items
            .insert(metadata.session_id.clone(), items.to_vec());
        state
            .metadata
            .insert(metadata.session_id.clone(), metadata.clone());
        Ok(())
    }

    async fn get_item(&self, session_id: &str, index: u32) -> AppResult<Option<SequencedItem>> {
        let state = self.state.read().await;
        Ok(state
            .items
            .get(session_id)
            .and_then(|items| items.get(index as usize))
            .cloned())
    }

    async fn list_items(&self, session_id: &str) -> AppResult<Vec<SequencedItem>> {
        let state = self.state.read().await;
        Ok(state.items.get(session_id).cloned().unwrap_or_default())
    }

    async fn delete_content_set(&self, session_id: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        state.items.remove(session_id);
        Ok(state.metadata.remove(session_id).is_some())
    }

    async fn advance_cursor(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<CursorAdvance> {
        let mut state = self.state.write().await;
        let MemoryState {
            metadata, items, ..
        } = &mut *state;
        let Some(metadata) = metadata.get_mut(session_id) else {
            return Ok(CursorAdvance::Missing);
        };

        if metadata.status == SessionStatus::Expired {
            return Ok(CursorAdvance::Expired);
        }

        if metadata.cursor >= metadata.item_count {
            return Ok(CursorAdvance::Exhausted {
                cursor: metadata.cursor,
                item_count: metadata.item_count,
            });
        }

        let index = metadata.cursor;
        let item = items
            .get(session_id)
            .and_then(|items| items.get(index as usize))
            .cloned()
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "session {} has no item at index {}",
                    session_id, index
                ))
            })?;
        metadata.cursor += 1;
        metadata.updated_at = now;

        Ok(CursorAdvance::Advanced {
            item,
            item_count: metadata.item_count,
        })
    }

    async fn mark_expired(&self, session_id: &str, now: DateTime<Utc>) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.metadata.get_mut(session_id) {
            Some(metadata) => {
                metadata.status = SessionStatus::Expired;
                metadata.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_expired_if(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.metadata.get_mut(session_id) {
            Some(metadata) if metadata.is_ready() && metadata.expires_at == Some(expires_at) => {
                metadata.status = SessionStatus::Expired;
                metadata.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_expiry(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.metadata.get_mut(session_id) {
            Some(metadata) => {
                metadata.expires_at = Some(expires_at);
                metadata.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_decision(&self, decision: &ParticipantDecision) -> AppResult<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .decisions
            .entry((
                decision.session_id.clone(),
                decision.participant_id.clone(),
            ))
            .or_default()
            .insert(decision.item_id))
    }

    async fn decided_items(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> AppResult<HashSet<u64>> {
        let state = self.state.read().await;
        Ok(state
            .decisions
            .get(&(session_id.to_string(), participant_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_decisions(&self, session_id: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.decisions.retain(|(session, _), _| session != session_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::candidate::fixtures::candidate;
    use crate::models::{FilterCriteria, FilterCriteriaRequest};

    fn metadata(session_id: &str, count: u32) -> SessionMetadata {
        let criteria = FilterCriteria::validate(&FilterCriteriaRequest {
            media_type: "movie".to_string(),
            genre_ids: vec![28],
            capacity: None,
        })
        .unwrap();
        SessionMetadata::new(session_id, criteria, count, count, Utc::now())
    }

    fn items(count: u32) -> Vec<SequencedItem> {
        (0..count)
            .map(|i| SequencedItem {
                sequence_index: i,
                item: candidate(1000 + i as u64, &[28]),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_replace_and_point_lookup() {
        let store = InMemorySessionStore::new();
        store
            .replace_content_set(&metadata("room-1", 3), &items(3))
            .await
            .unwrap();

        let item = store.get_item("room-1", 2).await.unwrap().unwrap();
        assert_eq!(item.sequence_index, 2);
        assert_eq!(item.item.id, 1002);
        assert!(store.get_item("room-1", 3).await.unwrap().is_none());
        assert_eq!(store.list_items("room-1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_replace_rejects_gapped_sequence() {
        let store = InMemorySessionStore::new();
        let mut gapped = items(3);
        gapped[2].sequence_index = 5;

        assert!(store
            .replace_content_set(&metadata("room-1", 3), &gapped)
            .await
            .is_err());
        assert!(store.get_metadata("room-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_advance_cursor_until_exhausted() {
        let store = InMemorySessionStore::new();
        store
            .replace_content_set(&metadata("room-1", 2), &items(2))
            .await
            .unwrap();

        let now = Utc::now();
        for expected in items(2) {
            assert_eq!(
                store.advance_cursor("room-1", now).await.unwrap(),
                CursorAdvance::Advanced {
                    item: expected,
                    item_count: 2
                }
            );
        }
        for _ in 0..3 {
            assert_eq!(
                store.advance_cursor("room-1", now).await.unwrap(),
                CursorAdvance::Exhausted {
                    cursor: 2,
                    item_count: 2
                }
            );
        }
    }

    #[tokio::test]
    async fn test_advance_cursor_missing_does_not_create() {
        let store = InMemorySessionStore::new();
        assert_eq!(
            store.advance_cursor("ghost", Utc::now()).await.unwrap(),
            CursorAdvance::Missing
        );
        assert!(store.get_metadata("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_build_claim_single_winner() {
        let store = InMemorySessionStore::new();
        let ttl = Duration::from_secs(30);

        assert!(store.try_claim_build("room-1", "a", ttl).await.unwrap());
        assert!(!store.try_claim_build("room-1", "b", ttl).await.unwrap());

        // only the owner can release
        store.release_build("room-1", "b").await.unwrap();
        assert!(!store.try_claim_build("room-1", "c", ttl).await.unwrap());

        store.release_build("room-1", "a").await.unwrap();
        assert!(store.try_claim_build("room-1", "c", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_lapsed_claim_can_be_taken() {
        let store = InMemorySessionStore::new();
        assert!(store
            .try_claim_build("room-1", "a", Duration::from_millis(0))
            .await
            .unwrap());
        assert!(store
            .try_claim_build("room-1", "b", Duration::from_secs(30))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_decisions_are_distinct_per_participant() {
        let store = InMemorySessionStore::new();
        let decision = |participant: &str, item_id| ParticipantDecision {
            session_id: "room-1".to_string(),
            participant_id: participant.to_string(),
            item_id,
        };

        assert!(store.record_decision(&decision("alice", 1)).await.unwrap());
        assert!(!store.record_decision(&decision("alice", 1)).await.unwrap());
        assert!(store.record_decision(&decision("alice", 2)).await.unwrap());
        assert!(store.record_decision(&decision("bob", 1)).await.unwrap());

        assert_eq!(
            store.decided_items("room-1", "alice").await.unwrap(),
            HashSet::from([1, 2])
        );
        assert_eq!(store.decided_items("room-1", "bob").await.unwrap().len(), 1);

        store.delete_decisions("room-1").await.unwrap();
        assert!(store.decided_items("room-1", "alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_updates_require_existing_session() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        assert!(!store.mark_expired("ghost", now).await.unwrap());
        assert!(!store.set_expiry("ghost", now, now).await.unwrap());

        store
            .replace_content_set(&metadata("room-1", 1), &items(1))
            .await
            .unwrap();
        assert!(store.set_expiry("room-1", now, now).await.unwrap());
        assert!(store.mark_expired("room-1", now).await.unwrap());

        let meta = store.get_metadata("room-1").await.unwrap().unwrap();
        assert_eq!(meta.status, SessionStatus::Expired);
        assert_eq!(meta.expires_at, Some(now));
        assert_eq!(
            store.advance_cursor("room-1", now).await.unwrap(),
            CursorAdvance::Expired
        );
    }

    #[tokio::test]
    async fn test_advance_serves_item_of_the_set_it_counted_against() {
        let store = InMemorySessionStore::new();
        store
            .replace_content_set(&metadata("room-1", 2), &items(2))
            .await
            .unwrap();
        store.advance_cursor("room-1", Utc::now()).await.unwrap();

        let mut replacement = items(2);
        replacement.reverse();
        for (index, item) in replacement.iter_mut().enumerate() {
            item.sequence_index = index as u32;
        }
        store
            .replace_content_set(&metadata("room-1", 2), &replacement)
            .await
            .unwrap();

        let CursorAdvance::Advanced { item, .. } =
            store.advance_cursor("room-1", Utc::now()).await.unwrap()
        else {
            panic!("expected an item");
        };
        assert_eq!(item, replacement[0]);
    }

    #[tokio::test]
    async fn test_first_write_only_lands_once() {
        let store = InMemorySessionStore::new();
        let first = metadata("room-1", 2);
        assert!(store
            .create_content_set_if_absent(&first, &items(2))
            .await
            .unwrap());

        let mut other = items(1);
        other[0].item.id = 42;
        assert!(!store
            .create_content_set_if_absent(&metadata("room-1", 1), &other)
            .await
            .unwrap());

        assert_eq!(store.get_metadata("room-1").await.unwrap(), Some(first));
        assert_eq!(store.list_items("room-1").await.unwrap(), items(2));
    }

    #[tokio::test]
    async fn test_conditional_expiry_checks_marker() {
        let store = InMemorySessionStore::new();
        store
            .replace_content_set(&metadata("room-1", 1), &items(1))
            .await
            .unwrap();
        let now = Utc::now();
        let marker = now + chrono::Duration::seconds(30);

        // no marker stored yet
        assert!(!store.mark_expired_if("room-1", marker, now).await.unwrap());

        store.set_expiry("room-1", marker, now).await.unwrap();
        let other = marker + chrono::Duration::seconds(1);
        assert!(!store.mark_expired_if("room-1", other, now).await.unwrap());
        assert!(store.mark_expired_if("room-1", marker, now).await.unwrap());
        assert!(!store.mark_expired_if("room-1", marker, now).await.unwrap());
        assert!(!store.mark_expired_if("ghost", marker, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_content_set_removes_both_parts() {
        let store = InMemorySessionStore::new();
        store
            .replace_content_set(&metadata("room-1", 2), &items(2))
            .await
            .unwrap();

        assert!(store.delete_content_set("room-1").await.unwrap());
        assert!(store.get_metadata("room-1").await.unwrap().is_none());
        assert!(store.list_items("room-1").await.unwrap().is_empty());
        assert!(!store.delete_content_set("room-1").await.unwrap());
    }
}
