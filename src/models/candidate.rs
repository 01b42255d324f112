use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;

/// Kind of media a session curates; a session holds exactly one kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    /// Path segment used by the catalog API
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "movie" | "movies" => Some(MediaKind::Movie),
            "tv" | "series" | "tv_series" => Some(MediaKind::Tv),
            _ => None,
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A normalized catalog entry, immutable once ingested
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateItem {
    /// Catalog (TMDB) id
    pub id: u64,
    pub title: String,
    /// Synopsis; may be empty until the description filter runs
    pub overview: String,
    pub release_date: Option<NaiveDate>,
    /// Lowercase ISO-639-1 code, empty when the catalog omitted it
    pub original_language: String,
    pub genre_ids: BTreeSet<u32>,
    pub popularity: f64,
    /// Clamped to 0..=10
    pub vote_average: f64,
    pub vote_count: u64,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub media_kind: MediaKind,
}

impl CandidateItem {
    /// Number of optional fields carrying data, used to pick between duplicates
    pub fn completeness(&self) -> usize {
        [
            !self.overview.trim().is_empty(),
            self.release_date.is_some(),
            !self.original_language.is_empty(),
            !self.genre_ids.is_empty(),
            self.popularity > 0.0,
            self.vote_count > 0,
            self.poster_url.is_some(),
            self.backdrop_url.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// An item at a fixed position of a session's ordered content set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequencedItem {
    pub sequence_index: u32,
    pub item: CandidateItem,
}
