use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::MediaKind;
use crate::error::{AppError, AppResult};

/// Maximum number of genres a session may request
pub const MAX_GENRES: usize = 2;

/// Upper bound for the room capacity hint
pub const MAX_CAPACITY_HINT: u32 = 100;

/// Filter criteria as received from a caller, before validation
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FilterCriteriaRequest {
    pub media_type: String,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
    #[serde(default)]
    pub capacity: Option<i64>,
}

/// Validated criteria, locked to a session once its content set is built.
///
/// Fields are private: after validation nothing can alter the criteria, and
/// refresh always reuses the stored copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterCriteria {
    media_kind: MediaKind,
    genre_ids: BTreeSet<u32>,
    capacity: Option<u32>,
}

impl FilterCriteria {
    /// Validates a raw request. Runs before any I/O.
    pub fn validate(request: &FilterCriteriaRequest) -> AppResult<Self> {
        let media_kind = MediaKind::parse(&request.media_type).ok_or_else(|| {
            AppError::Validation(format!(
                "media_type must be 'movie' or 'tv', got '{}'",
                request.media_type
            ))
        })?;

        let mut genre_ids = BTreeSet::new();
        for raw in &request.genre_ids {
            let id = u32::try_from(*raw)
                .ok()
                .filter(|id| *id > 0)
                .ok_or_else(|| AppError::Validation(format!("invalid genre id {}", raw)))?;
            genre_ids.insert(id);
        }

        if genre_ids.len() > MAX_GENRES {
            return Err(AppError::Validation(format!(
                "at most {} genres may be requested, got {}",
                MAX_GENRES,
                genre_ids.len()
            )));
        }

        let capacity = match request.capacity {
            None => None,
            Some(raw) if raw > 0 && raw <= MAX_CAPACITY_HINT as i64 => Some(raw as u32),
            Some(raw) => {
                return Err(AppError::Validation(format!(
                    "capacity must be between 1 and {}, got {}",
                    MAX_CAPACITY_HINT, raw
                )))
            }
        };

        Ok(Self {
            media_kind,
            genre_ids,
            capacity,
        })
    }

    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    pub fn genre_ids(&self) -> &BTreeSet<u32> {
        &self.genre_ids
    }

    pub fn capacity(&self) -> Option<u32> {
        self.capacity
    }
}
