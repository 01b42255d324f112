use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::{
    db::store::{ensure_contiguous, SessionKey, SessionStore},
    error::{AppError, AppResult},
    models::{
        CursorAdvance, FilterCriteria, ParticipantDecision, SequencedItem, SessionMetadata,
        SessionStatus,
    },
};

/// Conditional increment of the shared cursor, reading the served item in
/// the same script. KEYS: metadata, items.
/// Returns {state, cursor, item_count, item}: state -1 missing, -2 expired,
/// -3 item missing, 0 exhausted (no write), 1 advanced (cursor is the
/// pre-increment value and item its JSON).
const ADVANCE_CURSOR_LUA: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return {-1, 0, 0, false}
end
local status = redis.call('HGET', KEYS[1], 'status')
local cursor = tonumber(redis.call('HGET', KEYS[1], 'cursor') or '0')
local count = tonumber(redis.call('HGET', KEYS[1], 'item_count') or '0')
if status == 'EXPIRED' then
    return {-2, cursor, count, false}
end
if cursor >= count then
    return {0, cursor, count, false}
end
local item = redis.call('HGET', KEYS[2], tostring(cursor))
if not item then
    return {-3, cursor, count, false}
end
redis.call('HSET', KEYS[1], 'cursor', cursor + 1, 'updated_at', ARGV[1])
return {1, cursor, count, item}
"#;

/// First write of a session. KEYS: metadata, items.
/// ARGV: ttl, number of metadata args, metadata field/value pairs, then
/// item index/json pairs. Returns 0 without writing when metadata exists.
const CREATE_IF_ABSENT_LUA: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
local ttl = tonumber(ARGV[1])
local meta_end = 2 + tonumber(ARGV[2])
redis.call('DEL', KEYS[2])
for i = meta_end + 1, #ARGV, 2 do
    redis.call('HSET', KEYS[2], ARGV[i], ARGV[i + 1])
end
for i = 3, meta_end, 2 do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
if redis.call('EXISTS', KEYS[2]) == 1 then
    redis.call('EXPIRE', KEYS[2], ttl)
end
redis.call('EXPIRE', KEYS[1], ttl)
return 1
"#;

/// READY -> EXPIRED only while `expires_at` still holds ARGV[1]
const EXPIRE_IF_MARKER_LUA: &str = r#"
if redis.call('HGET', KEYS[1], 'status') ~= 'READY' then
    return 0
end
if redis.call('HGET', KEYS[1], 'expires_at') ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'status', 'EXPIRED', 'updated_at', ARGV[2])
return 1
"#;

/// HSET only when the hash already exists
const SET_IF_EXISTS_LUA: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV))
return 1
"#;

/// DEL only when the claim is still held by the given token
const RELEASE_CLAIM_LUA: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Immutable part of the metadata hash, stored as one JSON field
#[derive(Debug, Serialize, Deserialize)]
struct MetadataDoc {
    session_id: String,
    criteria: FilterCriteria,
    requested_count: u32,
    created_at: DateTime<Utc>,
    refreshed_count: u32,
}

fn corrupt(field: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("Corrupt session field '{}': {}", field, e))
}

/// Session store backed by Redis.
///
/// Layout per session: a metadata hash (`doc`, `status`, `item_count`,
/// `cursor`, `updated_at`, `expires_at`), an items hash keyed by sequence
/// index, a build-claim string, and one set of item ids per participant.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    ttl_secs: i64,
    advance_script: Script,
    create_script: Script,
    expire_if_script: Script,
    set_if_exists_script: Script,
    release_claim_script: Script,
}

impl RedisSessionStore {
    pub async fn new(redis_client: Client, ttl_secs: u64) -> AppResult<Self> {
        let conn = ConnectionManager::new(redis_client).await?;

        tracing::info!(ttl_secs, "Connected Redis session store");

        Ok(Self {
            conn,
            ttl_secs: ttl_secs as i64,
            advance_script: Script::new(ADVANCE_CURSOR_LUA),
            create_script: Script::new(CREATE_IF_ABSENT_LUA),
            expire_if_script: Script::new(EXPIRE_IF_MARKER_LUA),
            set_if_exists_script: Script::new(SET_IF_EXISTS_LUA),
            release_claim_script: Script::new(RELEASE_CLAIM_LUA),
        })
    }

    fn metadata_fields(metadata: &SessionMetadata) -> AppResult<Vec<(&'static str, String)>> {
        let doc = MetadataDoc {
            session_id: metadata.session_id.clone(),
            criteria: metadata.criteria.clone(),
            requested_count: metadata.requested_count,
            created_at: metadata.created_at,
            refreshed_count: metadata.refreshed_count,
        };
        let doc = serde_json::to_string(&doc)
            .map_err(|e| AppError::Internal(format!("Metadata serialization error: {}", e)))?;

        Ok(vec![
            ("doc", doc),
            ("status", metadata.status.as_str().to_string()),
            ("item_count", metadata.item_count.to_string()),
            ("cursor", metadata.cursor.to_string()),
            ("updated_at", metadata.updated_at.to_rfc3339()),
            (
                "expires_at",
                metadata
                    .expires_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_default(),
            ),
        ])
    }

    fn parse_metadata(fields: HashMap<String, String>) -> AppResult<SessionMetadata> {
        let field = |name: &str| {
            fields.get(name).ok_or_else(|| {
                AppError::Internal(format!("Session metadata missing field '{}'", name))
            })
        };
        let doc: MetadataDoc =
            serde_json::from_str(field("doc")?).map_err(|e| corrupt("doc", e))?;
        let status = SessionStatus::parse(field("status")?)
            .ok_or_else(|| corrupt("status", "unknown status"))?;
        let item_count = field("item_count")?
            .parse::<u32>()
            .map_err(|e| corrupt("item_count", e))?;
        let cursor = field("cursor")?
            .parse::<u32>()
            .map_err(|e| corrupt("cursor", e))?;
        let updated_at = DateTime::parse_from_rfc3339(field("updated_at")?)
            .map_err(|e| corrupt("updated_at", e))?
            .with_timezone(&Utc);
        let expires_at = match fields.get("expires_at").map(String::as_str) {
            None | Some("") => None,
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| corrupt("expires_at", e))?
                    .with_timezone(&Utc),
            ),
        };

        Ok(SessionMetadata {
            session_id: doc.session_id,
            status,
            item_count,
            requested_count: doc.requested_count,
            criteria: doc.criteria,
            cursor,
            created_at: doc.created_at,
            updated_at,
            expires_at,
            refreshed_count: doc.refreshed_count,
        })
    }

    fn item_fields(items: &[SequencedItem]) -> AppResult<Vec<(u32, String)>> {
        items
            .iter()
            .map(|item| {
                serde_json::to_string(item)
                    .map(|json| (item.sequence_index, json))
                    .map_err(|e| AppError::Internal(format!("Cache serialization error: {}", e)))
            })
            .collect()
    }

    fn parse_item(json: &str) -> AppResult<SequencedItem> {
        serde_json::from_str(json)
            .map_err(|e| AppError::Internal(format!("Cache deserialization error: {}", e)))
    }

    async fn set_if_exists(&self, key: &SessionKey, fields: &[(&str, String)]) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let mut invocation = self.set_if_exists_script.key(key.to_string());
        for (name, value) in fields {
            invocation.arg(*name).arg(value);
        }
        let updated: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(updated == 1)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get_metadata(&self, session_id: &str) -> AppResult<Option<SessionMetadata>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(SessionKey::Metadata(session_id.to_string()).to_string())
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }
        Self::parse_metadata(fields).map(Some)
    }

    async fn try_claim_build(
        &self,
        session_id: &str,
        token: &str,
        ttl: Duration,
    ) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let claimed: Option<String> = redis::cmd("SET")
            .arg(SessionKey::BuildClaim(session_id.to_string()).to_string())
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;
        Ok(claimed.is_some())
    }

    async fn release_build(&self, session_id: &str, token: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .release_claim_script
            .key(SessionKey::BuildClaim(session_id.to_string()).to_string())
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn create_content_set_if_absent(
        &self,
        metadata: &SessionMetadata,
        items: &[SequencedItem],
    ) -> AppResult<bool> {
        ensure_contiguous(metadata, items)?;

        let meta_fields = Self::metadata_fields(metadata)?;
        let item_fields = Self::item_fields(items)?;

        let mut invocation = self
            .create_script
            .key(SessionKey::Metadata(metadata.session_id.clone()).to_string());
        invocation
            .key(SessionKey::Items(metadata.session_id.clone()).to_string())
            .arg(self.ttl_secs)
            .arg(meta_fields.len() * 2);
        for (name, value) in &meta_fields {
            invocation.arg(*name).arg(value);
        }
        for (index, json) in &item_fields {
            invocation.arg(*index).arg(json);
        }

        let mut conn = self.conn.clone();
        let created: i64 = invocation.invoke_async(&mut conn).await?;

        tracing::debug!(
            session_id = %metadata.session_id,
            item_count = items.len(),
            created = created == 1,
            "First content set write"
        );

        Ok(created == 1)
    }

    async fn replace_content_set(
        &self,
        metadata: &SessionMetadata,
        items: &[SequencedItem],
    ) -> AppResult<()> {
        ensure_contiguous(metadata, items)?;

        let items_key = SessionKey::Items(metadata.session_id.clone()).to_string();
        let meta_key = SessionKey::Metadata(metadata.session_id.clone()).to_string();

        let item_fields = Self::item_fields(items)?;
        let meta_fields = Self::metadata_fields(metadata)?;

        // MULTI/EXEC: readers never observe the new items with the old cursor
        let mut pipe = redis::pipe();
        pipe.atomic().del(&items_key).ignore();
        if !item_fields.is_empty() {
            pipe.hset_multiple(&items_key, item_fields.as_slice())
                .ignore()
                .expire(&items_key, self.ttl_secs)
                .ignore();
        }
        pipe.del(&meta_key)
            .ignore()
            .hset_multiple(&meta_key, meta_fields.as_slice())
            .ignore()
            .expire(&meta_key, self.ttl_secs)
            .ignore();

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;

        tracing::debug!(
            session_id = %metadata.session_id,
            item_count = items.len(),
            "Content set written to Redis"
        );

        Ok(())
    }

    async fn get_item(&self, session_id: &str, index: u32) -> AppResult<Option<SequencedItem>> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn
            .hget(SessionKey::Items(session_id.to_string()).to_string(), index)
            .await?;

        cached.as_deref().map(Self::parse_item).transpose()
    }

    async fn list_items(&self, session_id: &str) -> AppResult<Vec<SequencedItem>> {
        let mut conn = self.conn.clone();
        let raw: HashMap<u32, String> = conn
            .hgetall(SessionKey::Items(session_id.to_string()).to_string())
            .await?;

        let mut items = raw
            .values()
            .map(|json| Self::parse_item(json))
            .collect::<AppResult<Vec<_>>>()?;
        items.sort_by_key(|item| item.sequence_index);
        Ok(items)
    }

    async fn delete_content_set(&self, session_id: &str) -> AppResult<bool> {
        let meta_key = SessionKey::Metadata(session_id.to_string()).to_string();
        let items_key = SessionKey::Items(session_id.to_string()).to_string();

        // one DEL for both keys; the EXISTS in the same transaction reports
        // whether there was metadata to remove
        let mut conn = self.conn.clone();
        let (existed, _): (bool, i64) = redis::pipe()
            .atomic()
            .exists(&meta_key)
            .del(vec![meta_key.clone(), items_key])
            .query_async(&mut conn)
            .await?;
        Ok(existed)
    }

    async fn advance_cursor(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<CursorAdvance> {
        let mut conn = self.conn.clone();
        let (state, cursor, count, item): (i64, i64, i64, Option<String>) = self
            .advance_script
            .key(SessionKey::Metadata(session_id.to_string()).to_string())
            .key(SessionKey::Items(session_id.to_string()).to_string())
            .arg(now.to_rfc3339())
            .invoke_async(&mut conn)
            .await?;
        let (cursor, item_count) = (cursor as u32, count as u32);

        Ok(match (state, item) {
            (-1, _) => CursorAdvance::Missing,
            (-2, _) => CursorAdvance::Expired,
            (0, _) => CursorAdvance::Exhausted { cursor, item_count },
            (1, Some(json)) => CursorAdvance::Advanced {
                item: Self::parse_item(&json)?,
                item_count,
            },
            _ => {
                return Err(AppError::Internal(format!(
                    "session {} has no item at index {}",
                    session_id, cursor
                )))
            }
        })
    }

    async fn mark_expired(&self, session_id: &str, now: DateTime<Utc>) -> AppResult<bool> {
        self.set_if_exists(
            &SessionKey::Metadata(session_id.to_string()),
            &[
                ("status", SessionStatus::Expired.as_str().to_string()),
                ("updated_at", now.to_rfc3339()),
            ],
        )
        .await
    }

    async fn mark_expired_if(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let flipped: i64 = self
            .expire_if_script
            .key(SessionKey::Metadata(session_id.to_string()).to_string())
            .arg(expires_at.to_rfc3339())
            .arg(now.to_rfc3339())
            .invoke_async(&mut conn)
            .await?;
        Ok(flipped == 1)
    }

    async fn set_expiry(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.set_if_exists(
            &SessionKey::Metadata(session_id.to_string()),
            &[
                ("expires_at", expires_at.to_rfc3339()),
                ("updated_at", now.to_rfc3339()),
            ],
        )
        .await
    }

    async fn record_decision(&self, decision: &ParticipantDecision) -> AppResult<bool> {
        let decisions_key = SessionKey::Decisions {
            session_id: decision.session_id.clone(),
            participant_id: decision.participant_id.clone(),
        }
        .to_string();
        let participants_key = SessionKey::Participants(decision.session_id.clone()).to_string();

        let mut conn = self.conn.clone();
        let (added,): (i64,) = redis::pipe()
            .atomic()
            .sadd(&decisions_key, decision.item_id)
            .expire(&decisions_key, self.ttl_secs)
            .ignore()
            .sadd(&participants_key, &decision.participant_id)
            .ignore()
            .expire(&participants_key, self.ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(added == 1)
    }

    async fn decided_items(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> AppResult<HashSet<u64>> {
        let mut conn = self.conn.clone();
        let decided: HashSet<u64> = conn
            .smembers(
                SessionKey::Decisions {
                    session_id: session_id.to_string(),
                    participant_id: participant_id.to_string(),
                }
                .to_string(),
            )
            .await?;
        Ok(decided)
    }

    async fn delete_decisions(&self, session_id: &str) -> AppResult<()> {
        let participants_key = SessionKey::Participants(session_id.to_string()).to_string();
        let mut conn = self.conn.clone();
        let participants: Vec<String> = conn.smembers(&participants_key).await?;

        let mut keys: Vec<String> = participants
            .into_iter()
            .map(|participant_id| {
                SessionKey::Decisions {
                    session_id: session_id.to_string(),
                    participant_id,
                }
                .to_string()
            })
            .collect();
        keys.push(participants_key);

        let _: () = conn.del(keys).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
