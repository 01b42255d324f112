//! Consumption of a session's ordered content set.
//!
//! Two views walk the same sequence:
//! - the shared walk, driven by the session cursor, where every `advance`
//!   hands out the next unseen index exactly once across all callers;
//! - the participant walk, where a participant is served the lowest sequence
//!   index they have not decided on yet, so decisions may arrive in any order.
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::{
    db::SessionStore,
    error::{AppError, AppResult},
    models::{AdvanceOutcome, CursorAdvance, ParticipantDecision, SessionMetadata},
};

/// A participant's position after recording a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantProgress {
    pub participant_id: String,
    /// False when the participant had already decided on this item
    pub recorded: bool,
    pub decided: u32,
    pub total_available: u32,
}

pub struct CursorTracker {
    store: Arc<dyn SessionStore>,
}

impl CursorTracker {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Serves the item at the shared cursor and moves the cursor past it
    pub async fn advance(&self, session_id: &str) -> AppResult<AdvanceOutcome> {
        match self.store.advance_cursor(session_id, Utc::now()).await? {
            CursorAdvance::Missing => Err(AppError::NotFound(format!(
                "no content set for session {}",
                session_id
            ))),
            CursorAdvance::Expired => Err(AppError::Expired(format!(
                "content set for session {} has expired",
                session_id
            ))),
            CursorAdvance::Exhausted { cursor, item_count } => {
                tracing::info!(session_id = %session_id, total_shown = cursor, "Content set exhausted");
                Ok(AdvanceOutcome::Exhausted {
                    total_shown: cursor,
                    total_available: item_count,
                })
            }
            CursorAdvance::Advanced { item, item_count } => {
                Ok(self.outcome(session_id, AdvanceOutcome::item(item, item_count)))
            }
        }
    }

    /// Records a participant's decision on an item of the current set
    pub async fn record_decision(
        &self,
        metadata: &SessionMetadata,
        participant_id: &str,
        item_id: u64,
    ) -> AppResult<ParticipantProgress> {
        let session_id = metadata.session_id.as_str();
        let items = self.store.list_items(session_id).await?;
        if !items.iter().any(|sequenced| sequenced.item.id == item_id) {
            return Err(AppError::Validation(format!(
                "item {} is not part of the content set of session {}",
                item_id, session_id
            )));
        }

        let recorded = self
            .store
            .record_decision(&ParticipantDecision {
                session_id: session_id.to_string(),
                participant_id: participant_id.to_string(),
                item_id,
            })
            .await?;
        let decided = self.store.decided_items(session_id, participant_id).await?.len() as u32;

        tracing::debug!(
            session_id = %session_id,
            participant_id = %participant_id,
            item_id,
            recorded,
            decided,
            "Participant decision recorded"
        );

        Ok(ParticipantProgress {
            participant_id: participant_id.to_string(),
            recorded,
            decided: decided.min(metadata.item_count),
            total_available: metadata.item_count,
        })
    }

    /// Lowest-indexed item the participant has not decided on; never
    /// mutates the shared cursor
    pub async fn next_for_participant(
        &self,
        metadata: &SessionMetadata,
        participant_id: &str,
    ) -> AppResult<AdvanceOutcome> {
        let session_id = metadata.session_id.as_str();
        let decided = self.store.decided_items(session_id, participant_id).await?;

        let mut undecided = self
            .store
            .list_items(session_id)
            .await?
            .into_iter()
            .filter(|sequenced| !decided.contains(&sequenced.item.id));

        let Some(next) = undecided.next() else {
            return Ok(AdvanceOutcome::Exhausted {
                total_shown: metadata.item_count,
                total_available: metadata.item_count,
            });
        };
        let remaining = undecided.count() as u32;

        Ok(self.outcome(session_id, AdvanceOutcome::with_remaining(next, remaining)))
    }

    fn outcome(&self, session_id: &str, outcome: AdvanceOutcome) -> AdvanceOutcome {
        if let AdvanceOutcome::Item {
            remaining,
            low_remaining: true,
            ..
        } = &outcome
        {
            tracing::info!(session_id = %session_id, remaining, "Content set running low");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemorySessionStore;
    use crate::models::candidate::fixtures::candidate;
    use crate::models::{FilterCriteria, FilterCriteriaRequest, SequencedItem};
    use std::collections::HashSet;

    async fn seeded_store(count: u32) -> (Arc<InMemorySessionStore>, SessionMetadata) {
        let store = Arc::new(InMemorySessionStore::new());
        let criteria = FilterCriteria::validate(&FilterCriteriaRequest {
            media_type: "movie".to_string(),
            ..Default::default()
        })
        .unwrap();
        let metadata = SessionMetadata::new("room-1", criteria, count, count, Utc::now());
        let items: Vec<SequencedItem> = (0..count)
            .map(|i| SequencedItem {
                sequence_index: i,
                item: candidate(500 + i as u64, &[]),
            })
            .collect();
        store.replace_content_set(&metadata, &items).await.unwrap();
        (store, metadata)
    }

    #[tokio::test]
    async fn test_advance_walks_in_order_then_exhausts() {
        let (store, _) = seeded_store(3).await;
        let tracker = CursorTracker::new(store.clone());

        for expected in 0..3u32 {
            match tracker.advance("room-1").await.unwrap() {
                AdvanceOutcome::Item { item, remaining, .. } => {
                    assert_eq!(item.sequence_index, expected);
                    assert_eq!(remaining, 2 - expected);
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        for _ in 0..2 {
            assert_eq!(
                tracker.advance("room-1").await.unwrap(),
                AdvanceOutcome::Exhausted {
                    total_shown: 3,
                    total_available: 3
                }
            );
        }
        let metadata = store.get_metadata("room-1").await.unwrap().unwrap();
        assert_eq!(metadata.cursor, 3);
    }

    #[tokio::test]
    async fn test_advance_missing_session_is_not_found() {
        let tracker = CursorTracker::new(Arc::new(InMemorySessionStore::new()));
        let err = tracker.advance("ghost").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_advances_get_distinct_indices() {
        let (store, _) = seeded_store(20).await;
        let tracker = Arc::new(CursorTracker::new(store));

        let handles: Vec<_> = (0..30)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.advance("room-1").await.unwrap() })
            })
            .collect();

        let mut served = HashSet::new();
        let mut exhausted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                AdvanceOutcome::Item { item, .. } => assert!(served.insert(item.sequence_index)),
                AdvanceOutcome::Exhausted { .. } => exhausted += 1,
            }
        }

        assert_eq!(served.len(), 20);
        assert_eq!(exhausted, 10);
    }

    #[tokio::test]
    async fn test_participant_walk_follows_decisions() {
        let (store, metadata) = seeded_store(2).await;
        let tracker = CursorTracker::new(store);

        let first = tracker.next_for_participant(&metadata, "alice").await.unwrap();
        let AdvanceOutcome::Item { item, .. } = first else {
            panic!("expected an item");
        };
        assert_eq!(item.sequence_index, 0);

        let progress = tracker
            .record_decision(&metadata, "alice", item.item.id)
            .await
            .unwrap();
        assert!(progress.recorded);
        assert_eq!(progress.decided, 1);

        // deciding twice on the same item does not move the participant
        let again = tracker
            .record_decision(&metadata, "alice", item.item.id)
            .await
            .unwrap();
        assert!(!again.recorded);
        assert_eq!(again.decided, 1);

        let AdvanceOutcome::Item { item: second, .. } =
            tracker.next_for_participant(&metadata, "alice").await.unwrap()
        else {
            panic!("expected an item");
        };
        assert_eq!(second.sequence_index, 1);

        tracker
            .record_decision(&metadata, "alice", second.item.id)
            .await
            .unwrap();
        assert!(tracker
            .next_for_participant(&metadata, "alice")
            .await
            .unwrap()
            .is_exhausted());

        // bob is unaffected, and so is the shared cursor
        let AdvanceOutcome::Item { item: bob_first, .. } =
            tracker.next_for_participant(&metadata, "bob").await.unwrap()
        else {
            panic!("expected an item");
        };
        assert_eq!(bob_first.sequence_index, 0);
    }

    #[tokio::test]
    async fn test_decision_on_foreign_item_is_rejected() {
        let (store, metadata) = seeded_store(2).await;
        let tracker = CursorTracker::new(store);
        let err = tracker
            .record_decision(&metadata, "alice", 99_999)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_out_of_order_decisions_still_reach_every_item() {
        let (store, metadata) = seeded_store(10).await;
        let tracker = CursorTracker::new(store.clone());
        let items = store.list_items("room-1").await.unwrap();

        tracker
            .record_decision(&metadata, "alice", items[2].item.id)
            .await
            .unwrap();

        let mut served = Vec::new();
        loop {
            match tracker.next_for_participant(&metadata, "alice").await.unwrap() {
                AdvanceOutcome::Item { item, remaining, .. } => {
                    assert!(served.len() < 10, "participant walk did not terminate");
                    assert_eq!(remaining, 8 - served.len() as u32);
                    served.push(item.sequence_index);
                    tracker
                        .record_decision(&metadata, "alice", item.item.id)
                        .await
                        .unwrap();
                }
                AdvanceOutcome::Exhausted { .. } => break,
            }
        }

        assert_eq!(served, vec![0, 1, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[tokio::test]
    async fn test_advance_after_replacement_serves_new_set() {
        let (store, metadata) = seeded_store(3).await;
        let tracker = CursorTracker::new(store.clone());
        tracker.advance("room-1").await.unwrap();

        let replacement: Vec<SequencedItem> = (0..3)
            .map(|i| SequencedItem {
                sequence_index: i,
                item: candidate(900 + i as u64, &[]),
            })
            .collect();
        store
            .replace_content_set(&metadata, &replacement)
            .await
            .unwrap();

        let AdvanceOutcome::Item { item, .. } = tracker.advance("room-1").await.unwrap() else {
            panic!("expected an item");
        };
        assert_eq!(item, replacement[0]);
    }
}
