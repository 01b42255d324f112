use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{
    config::Config,
    db::SessionStore,
    error::{AppError, AppResult},
    models::{
        AdvanceOutcome, CandidateItem, FilterCriteria, FilterCriteriaRequest, MediaKind,
        SequencedItem, SessionMetadata, SessionStatus,
    },
    services::{
        cursor::{CursorTracker, ParticipantProgress},
        lifecycle::LifecycleManager,
        pipeline::ContentPipeline,
        providers::FallbackProvider,
    },
};

const BUILD_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_ID_LEN: usize = 128;

/// Knobs for content-set builds
#[derive(Debug, Clone, Copy)]
pub struct CurationSettings {
    /// N, the number of items a build aims for
    pub content_set_size: u32,
    /// How long a concurrent create waits for another caller's build
    pub build_wait: Duration,
}

impl CurationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            content_set_size: config.content_set_size,
            build_wait: config.build_wait(),
        }
    }
}

/// A session's content set with its metadata
#[derive(Debug, Clone, Serialize)]
pub struct ContentSet {
    pub metadata: SessionMetadata,
    pub items: Vec<SequencedItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentSetStatus {
    #[serde(flatten)]
    pub metadata: SessionMetadata,
    pub remaining: u32,
    /// Items the catalog could not supply, when the build ran short
    pub shortfall: Option<u32>,
}

impl From<SessionMetadata> for ContentSetStatus {
    fn from(metadata: SessionMetadata) -> Self {
        Self {
            remaining: metadata.remaining(),
            shortfall: metadata.shortfall(),
            metadata,
        }
    }
}

/// Either the stored set or unpersisted fallback candidates
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CuratedContent {
    Session(ContentSet),
    Fallback {
        provider: &'static str,
        items: Vec<CandidateItem>,
    },
}

/// Operations on session content sets
pub struct ContentSetService {
    store: Arc<dyn SessionStore>,
    pipeline: ContentPipeline,
    fallback: Arc<dyn FallbackProvider>,
    lifecycle: LifecycleManager,
    cursor: CursorTracker,
    settings: CurationSettings,
}

impl ContentSetService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        pipeline: ContentPipeline,
        fallback: Arc<dyn FallbackProvider>,
        settings: CurationSettings,
    ) -> Self {
        Self {
            lifecycle: LifecycleManager::new(store.clone()),
            cursor: CursorTracker::new(store.clone()),
            store,
            pipeline,
            fallback,
            settings,
        }
    }

    /// Builds the session's content set, or returns the existing READY set
    /// untouched. Concurrent first-time calls produce exactly one build.
    pub async fn create_content_set(
        &self,
        session_id: &str,
        request: &FilterCriteriaRequest,
    ) -> AppResult<ContentSet> {
        validate_id("session_id", session_id)?;
        let criteria = FilterCriteria::validate(request)?;

        let token = uuid::Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.settings.build_wait;

        loop {
            if let Some(existing) = self.lifecycle.current(session_id).await? {
                return self.reuse_existing(existing, &criteria).await;
            }

            if self
                .store
                .try_claim_build(session_id, &token, self.settings.build_wait)
                .await?
            {
                // the previous holder may have finished between our read and our claim
                if let Some(existing) = self.store.get_metadata(session_id).await? {
                    self.store.release_build(session_id, &token).await?;
                    return self.reuse_existing(existing, &criteria).await;
                }

                let result = self.build_first(session_id, &criteria).await;
                self.release_claim(session_id, &token).await;
                return result;
            }

            if Instant::now() >= deadline {
                return Err(AppError::Conflict(format!(
                    "content set for session {} is still being built",
                    session_id
                )));
            }

            tracing::debug!(session_id = %session_id, "Waiting for concurrent build");
            tokio::time::sleep(BUILD_POLL_INTERVAL).await;
        }
    }

    /// The whole set, or only the item at `index`
    pub async fn get_content_set(
        &self,
        session_id: &str,
        index: Option<u32>,
    ) -> AppResult<ContentSet> {
        validate_id("session_id", session_id)?;
        let metadata = self.lifecycle.require(session_id).await?;

        let items = match index {
            None => self.store.list_items(session_id).await?,
            Some(index) if index >= metadata.item_count => {
                return Err(AppError::NotFound(format!(
                    "index {} is outside the content set of session {} ({} items)",
                    index, session_id, metadata.item_count
                )))
            }
            Some(index) => {
                let item = self.store.get_item(session_id, index).await?.ok_or_else(|| {
                    AppError::Internal(format!(
                        "session {} has no item at index {}",
                        session_id, index
                    ))
                })?;
                vec![item]
            }
        };

        Ok(ContentSet { metadata, items })
    }

    /// The stored set when one exists, otherwise fallback candidates for `media_kind`
    pub async fn get_content_set_or_fallback(
        &self,
        session_id: &str,
        media_kind: MediaKind,
    ) -> AppResult<CuratedContent> {
        validate_id("session_id", session_id)?;

        if self.lifecycle.current(session_id).await?.is_some() {
            return self
                .get_content_set(session_id, None)
                .await
                .map(CuratedContent::Session);
        }

        let items = self.fallback.candidates(media_kind).await?;
        tracing::info!(
            session_id = %session_id,
            provider = self.fallback.name(),
            item_count = items.len(),
            "Serving fallback candidates"
        );

        Ok(CuratedContent::Fallback {
            provider: self.fallback.name(),
            items,
        })
    }

    /// Rebuilds the set with the session's locked criteria and rewinds the
    /// cursor. Reactivates an expired session. A failed rebuild leaves the
    /// previous set in place.
    pub async fn refresh_content_set(&self, session_id: &str) -> AppResult<ContentSet> {
        validate_id("session_id", session_id)?;
        let previous = self.lifecycle.require(session_id).await?;

        let token = uuid::Uuid::new_v4().to_string();
        if !self
            .store
            .try_claim_build(session_id, &token, self.settings.build_wait)
            .await?
        {
            return Err(AppError::Conflict(format!(
                "content set for session {} is already being built",
                session_id
            )));
        }

        let criteria = previous.criteria.clone();
        let result = self.build_refresh(session_id, criteria, &previous).await;
        self.release_claim(session_id, &token).await;
        let refreshed = result?;

        // positions of the old sequence mean nothing in the new one
        if let Err(e) = self.store.delete_decisions(session_id).await {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to reset participant decisions");
        }

        Ok(refreshed)
    }

    pub async fn get_content_set_status(&self, session_id: &str) -> AppResult<ContentSetStatus> {
        validate_id("session_id", session_id)?;
        self.lifecycle.require(session_id).await.map(Into::into)
    }

    /// Next item of the shared walk
    pub async fn advance(&self, session_id: &str) -> AppResult<AdvanceOutcome> {
        validate_id("session_id", session_id)?;
        self.lifecycle.require(session_id).await?;
        self.cursor.advance(session_id).await
    }

    pub async fn cleanup(&self, session_id: &str) -> AppResult<bool> {
        validate_id("session_id", session_id)?;
        self.lifecycle.cleanup(session_id).await
    }

    pub async fn schedule_expiry(
        &self,
        session_id: &str,
        delay: Duration,
    ) -> AppResult<SessionMetadata> {
        validate_id("session_id", session_id)?;
        self.lifecycle.schedule_expiry(session_id, delay).await
    }

    pub async fn expire_now(&self, session_id: &str) -> AppResult<SessionMetadata> {
        validate_id("session_id", session_id)?;
        self.lifecycle.expire_now(session_id).await
    }

    pub async fn record_decision(
        &self,
        session_id: &str,
        participant_id: &str,
        item_id: u64,
    ) -> AppResult<ParticipantProgress> {
        let metadata = self.ready_for_participant(session_id, participant_id).await?;
        self.cursor
            .record_decision(&metadata, participant_id, item_id)
            .await
    }

    /// Next item of the participant's own walk
    pub async fn next_for_participant(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> AppResult<AdvanceOutcome> {
        let metadata = self.ready_for_participant(session_id, participant_id).await?;
        self.cursor
            .next_for_participant(&metadata, participant_id)
            .await
    }

    async fn ready_for_participant(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> AppResult<SessionMetadata> {
        validate_id("session_id", session_id)?;
        validate_id("participant_id", participant_id)?;

        let metadata = self.lifecycle.require(session_id).await?;
        if metadata.status == SessionStatus::Expired {
            return Err(AppError::Expired(format!(
                "content set for session {} has expired",
                session_id
            )));
        }
        Ok(metadata)
    }

    async fn reuse_existing(
        &self,
        existing: SessionMetadata,
        requested: &FilterCriteria,
    ) -> AppResult<ContentSet> {
        if existing.status == SessionStatus::Expired {
            return Err(AppError::Expired(format!(
                "content set for session {} has expired; refresh or clean it up",
                existing.session_id
            )));
        }

        if &existing.criteria != requested {
            tracing::debug!(
                session_id = %existing.session_id,
                "Create called with different criteria; keeping locked criteria"
            );
        }

        let items = self.store.list_items(&existing.session_id).await?;
        Ok(ContentSet {
            metadata: existing,
            items,
        })
    }

    /// First build of a session. The write lands only while the session
    /// still has no metadata, so a build whose claim lapsed mid-run cannot
    /// overwrite a set stored by a later claimant; it returns that set instead.
    async fn build_first(
        &self,
        session_id: &str,
        criteria: &FilterCriteria,
    ) -> AppResult<ContentSet> {
        let started = Instant::now();
        let built = self.build(session_id, criteria.clone(), None).await?;

        if self
            .store
            .create_content_set_if_absent(&built.metadata, &built.items)
            .await?
        {
            self.log_stored(&built, false, started);
            return Ok(built);
        }

        tracing::warn!(
            session_id = %session_id,
            "Another build stored this session first; discarding ours"
        );
        match self.store.get_metadata(session_id).await? {
            Some(existing) => self.reuse_existing(existing, criteria).await,
            None => Err(AppError::Conflict(format!(
                "content set for session {} was removed while building",
                session_id
            ))),
        }
    }

    /// Rebuild with locked criteria, swapped in with one atomic replace
    async fn build_refresh(
        &self,
        session_id: &str,
        criteria: FilterCriteria,
        previous: &SessionMetadata,
    ) -> AppResult<ContentSet> {
        let started = Instant::now();
        let built = self.build(session_id, criteria, Some(previous)).await?;

        self.store
            .replace_content_set(&built.metadata, &built.items)
            .await?;
        self.log_stored(&built, true, started);
        Ok(built)
    }

    /// Runs the pipeline and assembles fresh metadata. Writes nothing.
    async fn build(
        &self,
        session_id: &str,
        criteria: FilterCriteria,
        previous: Option<&SessionMetadata>,
    ) -> AppResult<ContentSet> {
        let target = self.settings.content_set_size;

        let built = match self.pipeline.build(&criteria, target).await {
            Ok(built) => built,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Content set build failed");
                return Err(e);
            }
        };

        let mut metadata = SessionMetadata::new(
            session_id,
            criteria,
            built.items.len() as u32,
            target,
            Utc::now(),
        );
        if let Some(previous) = previous {
            metadata.created_at = previous.created_at;
            metadata.refreshed_count = previous.refreshed_count + 1;
        }

        Ok(ContentSet {
            metadata,
            items: built.items,
        })
    }

    fn log_stored(&self, set: &ContentSet, refreshed: bool, started: Instant) {
        tracing::info!(
            session_id = %set.metadata.session_id,
            store = self.store.name(),
            item_count = set.metadata.item_count,
            requested = set.metadata.requested_count,
            shortfall = ?set.metadata.shortfall(),
            refreshed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Content set stored"
        );
    }

    async fn release_claim(&self, session_id: &str, token: &str) {
        if let Err(e) = self.store.release_build(session_id, token).await {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to release build claim");
        }
    }
}

fn validate_id(field: &str, raw: &str) -> AppResult<()> {
    let valid = !raw.is_empty()
        && raw.len() <= MAX_ID_LEN
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{} must be 1-{} characters of letters, digits, '-' or '_'",
            field, MAX_ID_LEN
        )))
    }
}
