use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::models::{CandidateItem, MediaKind};

const IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";
const MIN_RELEASE_YEAR: i32 = 1900;
const MAX_RELEASE_YEAR: i32 = 2100;
const MAX_VOTE_AVERAGE: f64 = 10.0;

/// Why a raw catalog record was refused
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IngestError {
    #[error("record is not an object")]
    NotAnObject,
    #[error("missing or invalid id")]
    InvalidId,
    #[error("missing title")]
    MissingTitle,
}

/// Maps one untyped catalog record to a [`CandidateItem`].
///
/// Required: a positive id and a non-blank title. Every other field falls
/// back to an explicit default when absent or malformed.
pub fn normalize(raw: &Value, media_kind: MediaKind) -> Result<CandidateItem, IngestError> {
    let record = raw.as_object().ok_or(IngestError::NotAnObject)?;

    let id = record
        .get("id")
        .and_then(as_u64)
        .filter(|id| *id > 0)
        .ok_or(IngestError::InvalidId)?;

    let title = ["title", "name"]
        .iter()
        .filter_map(|field| record.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .find(|title| !title.is_empty())
        .ok_or(IngestError::MissingTitle)?
        .to_string();

    let overview = record
        .get("overview")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let release_date = ["release_date", "first_air_date"]
        .iter()
        .filter_map(|field| record.get(*field).and_then(Value::as_str))
        .find_map(parse_release_date);

    let original_language = record
        .get("original_language")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let popularity = record
        .get("popularity")
        .and_then(Value::as_f64)
        .filter(|p| p.is_finite() && *p >= 0.0)
        .unwrap_or(0.0);

    let vote_average = record
        .get("vote_average")
        .and_then(Value::as_f64)
        .filter(|v| !v.is_nan())
        .map(|v| v.clamp(0.0, MAX_VOTE_AVERAGE))
        .unwrap_or(0.0);

    let vote_count = record.get("vote_count").and_then(as_u64).unwrap_or(0);

    Ok(CandidateItem {
        id,
        title,
        overview,
        release_date,
        original_language,
        genre_ids: genre_ids(record),
        popularity,
        vote_average,
        vote_count,
        poster_url: record.get("poster_path").and_then(image_url),
        backdrop_url: record.get("backdrop_path").and_then(image_url),
        media_kind,
    })
}

/// Accepts numbers and numeric strings
fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Discovery records carry `genre_ids`; detail records carry `genres: [{id, name}]`
fn genre_ids(record: &serde_json::Map<String, Value>) -> BTreeSet<u32> {
    let flat = record
        .get("genre_ids")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(as_u64);

    let nested = record
        .get("genres")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|genre| genre.get("id").and_then(as_u64));

    flat.chain(nested)
        .filter_map(|id| u32::try_from(id).ok())
        .filter(|id| *id > 0)
        .collect()
}

fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .filter(|date| (MIN_RELEASE_YEAR..=MAX_RELEASE_YEAR).contains(&date.year()))
}

fn image_url(value: &Value) -> Option<String> {
    let path = value.as_str()?.trim();
    if path.starts_with('/') {
        Some(format!("{}{}", IMAGE_BASE_URL, path))
    } else if path.starts_with("http://") || path.starts_with("https://") {
        Some(path.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_discovery_record() {
        let raw = json!({
            "id": 27205,
            "title": "  Inception ",
            "overview": "A thief who steals corporate secrets through dream-sharing.",
            "release_date": "2010-07-15",
            "original_language": "EN",
            "genre_ids": [28, 878, "12"],
            "popularity": 83.9,
            "vote_average": 8.4,
            "vote_count": 35000,
            "poster_path": "/oYuLEt3zVCKq57qu2F8dT7NIa6f.jpg",
            "backdrop_path": null
        });

        let item = normalize(&raw, MediaKind::Movie).unwrap();
        assert_eq!(item.id, 27205);
        assert_eq!(item.title, "Inception");
        assert_eq!(item.original_language, "en");
        assert_eq!(item.genre_ids, BTreeSet::from([12, 28, 878]));
        assert_eq!(item.release_date, NaiveDate::from_ymd_opt(2010, 7, 15));
        assert_eq!(
            item.poster_url.as_deref(),
            Some("https://image.tmdb.org/t/p/w500/oYuLEt3zVCKq57qu2F8dT7NIa6f.jpg")
        );
        assert_eq!(item.backdrop_url, None);
    }

    #[test]
    fn test_normalize_tv_record_uses_name_and_first_air_date() {
        let raw = json!({
            "id": "1399",
            "name": "Game of Thrones",
            "first_air_date": "2011-04-17",
            "genres": [{"id": 18, "name": "Drama"}, {"id": 10765, "name": "Sci-Fi & Fantasy"}]
        });

        let item = normalize(&raw, MediaKind::Tv).unwrap();
        assert_eq!(item.id, 1399);
        assert_eq!(item.title, "Game of Thrones");
        assert_eq!(item.release_date, NaiveDate::from_ymd_opt(2011, 4, 17));
        assert_eq!(item.genre_ids, BTreeSet::from([18, 10765]));
        assert_eq!(item.overview, "");
        assert_eq!(item.media_kind, MediaKind::Tv);
    }

    #[test]
    fn test_normalize_rejects_missing_id_or_title() {
        assert_eq!(
            normalize(&json!({"title": "No id"}), MediaKind::Movie),
            Err(IngestError::InvalidId)
        );
        assert_eq!(
            normalize(&json!({"id": 0, "title": "Zero"}), MediaKind::Movie),
            Err(IngestError::InvalidId)
        );
        assert_eq!(
            normalize(&json!({"id": 5, "title": "   "}), MediaKind::Movie),
            Err(IngestError::MissingTitle)
        );
        assert_eq!(
            normalize(&json!([1, 2]), MediaKind::Movie),
            Err(IngestError::NotAnObject)
        );
    }

    #[test]
    fn test_normalize_defaults_malformed_optional_fields() {
        let raw = json!({
            "id": 7,
            "title": "Odd Record",
            "release_date": "1850-01-01",
            "popularity": -4.0,
            "vote_average": 14.2,
            "vote_count": "many",
            "poster_path": "not-a-path",
            "genre_ids": ["x", -3, 35]
        });

        let item = normalize(&raw, MediaKind::Movie).unwrap();
        assert_eq!(item.release_date, None);
        assert_eq!(item.popularity, 0.0);
        assert_eq!(item.vote_average, 10.0);
        assert_eq!(item.vote_count, 0);
        assert_eq!(item.poster_url, None);
        assert_eq!(item.genre_ids, BTreeSet::from([35]));
    }

    #[test]
    fn test_absolute_image_urls_are_kept() {
        let raw = json!({
            "id": 9,
            "title": "Hosted Poster",
            "poster_path": "https://cdn.example.org/poster.jpg"
        });
        let item = normalize(&raw, MediaKind::Movie).unwrap();
        assert_eq!(
            item.poster_url.as_deref(),
            Some("https://cdn.example.org/poster.jpg")
        );
    }
}
