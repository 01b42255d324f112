use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    db::SessionStore,
    error::{AppError, AppResult},
    models::{SessionMetadata, SessionStatus},
};

/// Expiry and teardown of session content sets.
///
/// READY -> EXPIRED happens either when a scheduled timer fires or lazily on
/// the first read after `expires_at`, so an expiry survives a restart that
/// loses the timer. Expiry keeps the data; only cleanup deletes it.
#[derive(Clone)]
pub struct LifecycleManager {
    store: Arc<dyn SessionStore>,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Current metadata with any due expiry applied
    pub async fn current(&self, session_id: &str) -> AppResult<Option<SessionMetadata>> {
        let Some(mut metadata) = self.store.get_metadata(session_id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        let Some(expires_at) = metadata.expires_at.filter(|_| metadata.expiry_due(now)) else {
            return Ok(Some(metadata));
        };

        if self.store.mark_expired_if(session_id, expires_at, now).await? {
            tracing::info!(session_id = %session_id, "Content set expired on read");
            metadata.status = SessionStatus::Expired;
            metadata.updated_at = now;
            return Ok(Some(metadata));
        }

        // a refresh, reschedule or cleanup got there first
        self.store.get_metadata(session_id).await
    }

    /// Like [`current`](Self::current) but a missing session is an error
    pub async fn require(&self, session_id: &str) -> AppResult<SessionMetadata> {
        self.current(session_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("no content set for session {}", session_id))
        })
    }

    /// Marks the session to expire after `delay`. A zero delay expires now.
    pub async fn schedule_expiry(
        &self,
        session_id: &str,
        delay: Duration,
    ) -> AppResult<SessionMetadata> {
        if delay.is_zero() {
            return self.expire_now(session_id).await;
        }

        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(delay)
                .map_err(|e| AppError::Validation(format!("expiry delay out of range: {}", e)))?;

        if !self.store.set_expiry(session_id, expires_at, now).await? {
            return Err(AppError::NotFound(format!(
                "no content set for session {}",
                session_id
            )));
        }

        let store = self.store.clone();
        let timer_session = session_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // a refresh or a later schedule replaces the marker; only the
            // marker this timer was armed for may fire
            match store
                .mark_expired_if(&timer_session, expires_at, Utc::now())
                .await
            {
                Ok(true) => tracing::info!(session_id = %timer_session, "Content set expired"),
                Ok(false) => {
                    tracing::debug!(session_id = %timer_session, "Expiry timer superseded")
                }
                Err(e) => tracing::warn!(
                    session_id = %timer_session,
                    error = %e,
                    "Scheduled expiry failed; will apply on next read"
                ),
            }
        });

        tracing::info!(
            session_id = %session_id,
            expires_at = %expires_at,
            "Content set expiry scheduled"
        );

        self.require(session_id).await
    }

    pub async fn expire_now(&self, session_id: &str) -> AppResult<SessionMetadata> {
        if !self.store.mark_expired(session_id, Utc::now()).await? {
            return Err(AppError::NotFound(format!(
                "no content set for session {}",
                session_id
            )));
        }

        tracing::info!(session_id = %session_id, "Content set expired");
        self.require(session_id).await
    }

    /// Deletes everything stored for a session. Idempotent.
    ///
    /// Items and metadata go in one store call; decisions are removed
    /// best-effort. A build claim is left to its owner or its lease. Returns
    /// whether a content set existed.
    pub async fn cleanup(&self, session_id: &str) -> AppResult<bool> {
        let existed = self.store.delete_content_set(session_id).await?;

        if let Err(e) = self.store.delete_decisions(session_id).await {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to delete participant decisions");
        }

        tracing::info!(session_id = %session_id, existed, "Content set cleaned up");
        Ok(existed)
    }
}
