//! Server-side session records.
//!
//! Records live in Redis under `session:{id}` with a per-user index set so
//! that access changes can flag every live session of the affected user.
//! Without Redis an in-process map is used, which is enough for tests and
//! single-instance development. Both backends expire a session `ttl_secs`
//! after its last write.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use deadpool_redis::Pool;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::tenancy::SessionRecord;

const SESSION_PREFIX: &str = "session:";
const USER_SESSIONS_PREFIX: &str = "user_sessions:";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Redis connection failed")]
    ConnectionFailed,
    #[error("Redis operation failed: {0}")]
    OperationFailed(#[from] redis::RedisError),
    #[error("Session record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    record: SessionRecord,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

type MemorySessions = Arc<RwLock<HashMap<Uuid, MemoryEntry>>>;

#[derive(Clone)]
pub struct SessionStore {
    pool: Option<Pool>,
    memory: MemorySessions,
    ttl_secs: u64,
}

impl SessionStore {
    pub fn new(pool: Option<Pool>, ttl_secs: u64) -> Self {
        if pool.is_none() {
            warn!("Redis not configured, sessions are kept in process memory");
        }
        Self {
            pool,
            memory: Arc::new(RwLock::new(HashMap::new())),
            ttl_secs,
        }
    }

    pub fn in_memory(ttl_secs: u64) -> Self {
        Self {
            pool: None,
            memory: Arc::new(RwLock::new(HashMap::new())),
            ttl_secs,
        }
    }

    pub fn is_distributed(&self) -> bool {
        self.pool.is_some()
    }

    /// Round trip to Redis. `None` when sessions are kept in memory.
    pub async fn ping(&self) -> Option<Result<(), SessionError>> {
        let pool = self.pool.as_ref()?;
        let result = async {
            let mut conn = self.conn(pool).await?;
            redis::cmd("PING").query_async::<String>(&mut conn).await?;
            Ok(())
        }
        .await;
        Some(result)
    }

    async fn conn(&self, pool: &Pool) -> Result<deadpool_redis::Connection, SessionError> {
        pool.get().await.map_err(|e| {
            error!(error = %e, "Failed to get Redis connection");
            SessionError::ConnectionFailed
        })
    }

    /// Opens a new session for `record.user_id` and returns its id.
    pub async fn create(&self, record: &SessionRecord) -> Result<Uuid, SessionError> {
        let session_id = Uuid::new_v4();
        self.put(session_id, record).await?;
        debug!(session_id = %session_id, user_id = %record.user_id, "Session created");
        Ok(session_id)
    }

    pub async fn get(&self, session_id: Uuid) -> Result<Option<SessionRecord>, SessionError> {
        let Some(pool) = &self.pool else {
            return Ok(self.memory_get(session_id).await);
        };

        let mut conn = self.conn(pool).await?;
        let raw: Option<String> = conn.get(session_key(session_id)).await?;
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(SessionError::from)
    }

    pub async fn put(&self, session_id: Uuid, record: &SessionRecord) -> Result<(), SessionError> {
        let Some(pool) = &self.pool else {
            let now = Instant::now();
            let mut sessions = self.memory.write().await;
            sessions.retain(|_, entry| entry.is_live(now));
            sessions.insert(
                session_id,
                MemoryEntry {
                    record: record.clone(),
                    expires_at: now + Duration::from_secs(self.ttl_secs),
                },
            );
            return Ok(());
        };

        let json = serde_json::to_string(record)?;
        let index = user_sessions_key(record.user_id);
        let mut conn = self.conn(pool).await?;

        redis::pipe()
            .set_ex(session_key(session_id), json, self.ttl_secs)
            .ignore()
            .sadd(&index, session_id.to_string())
            .ignore()
            .expire(&index, self.ttl_secs as i64)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    pub async fn delete(&self, session_id: Uuid) -> Result<(), SessionError> {
        let Some(pool) = &self.pool else {
            self.memory.write().await.remove(&session_id);
            return Ok(());
        };

        let mut conn = self.conn(pool).await?;
        let raw: Option<String> = conn.get(session_key(session_id)).await?;
        if let Some(record) = raw.and_then(|json| serde_json::from_str::<SessionRecord>(&json).ok())
        {
            conn.srem::<_, _, ()>(user_sessions_key(record.user_id), session_id.to_string())
                .await?;
        }
        conn.del::<_, ()>(session_key(session_id)).await?;
        Ok(())
    }

    /// Marks every live session of `user_id` so the next request recomputes
    /// its current company. Returns the number of sessions flagged.
    pub async fn flag_user_refresh(&self, user_id: Uuid) -> Result<usize, SessionError> {
        let Some(pool) = &self.pool else {
            let now = Instant::now();
            let mut sessions = self.memory.write().await;
            sessions.retain(|_, entry| entry.is_live(now));
            let mut flagged = 0;
            for entry in sessions
                .values_mut()
                .filter(|e| e.record.user_id == user_id)
            {
                entry.record.refresh_company = true;
                flagged += 1;
            }
            return Ok(flagged);
        };

        let mut conn = self.conn(pool).await?;
        let ids: Vec<String> = conn.smembers(user_sessions_key(user_id)).await?;
        let mut flagged = 0;

        for id in ids {
            let Ok(session_id) = Uuid::parse_str(&id) else {
                continue;
            };
            let key = session_key(session_id);
            let raw: Option<String> = conn.get(&key).await?;
            let Some(json) = raw else {
                conn.srem::<_, _, ()>(user_sessions_key(user_id), &id).await?;
                continue;
            };

            let mut record: SessionRecord = serde_json::from_str(&json)?;
            record.refresh_company = true;
            let ttl: i64 = conn.ttl(&key).await?;
            let ttl = if ttl > 0 { ttl as u64 } else { self.ttl_secs };
            conn.set_ex::<_, _, ()>(&key, serde_json::to_string(&record)?, ttl)
                .await?;
            flagged += 1;
        }

        debug!(user_id = %user_id, flagged, "Sessions flagged for company refresh");
        Ok(flagged)
    }

    /// Expired entries read as absent and are evicted on the way out.
    async fn memory_get(&self, session_id: Uuid) -> Option<SessionRecord> {
        let now = Instant::now();
        {
            let sessions = self.memory.read().await;
            match sessions.get(&session_id) {
                None => return None,
                Some(entry) if entry.is_live(now) => return Some(entry.record.clone()),
                Some(_) => {}
            }
        }

        let mut sessions = self.memory.write().await;
        if sessions
            .get(&session_id)
            .is_some_and(|entry| !entry.is_live(now))
        {
            sessions.remove(&session_id);
            debug!(session_id = %session_id, "Expired session evicted");
        }
        None
    }
}

fn session_key(session_id: Uuid) -> String {
    format!("{}{}", SESSION_PREFIX, session_id)
}

fn user_sessions_key(user_id: Uuid) -> String {
    format!("{}{}", USER_SESSIONS_PREFIX, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = SessionStore::in_memory(60);
        let record = SessionRecord::new(Uuid::new_v4());

        let id = store.create(&record).await.unwrap();
        assert_eq!(store.get(id).await.unwrap(), Some(record));

        store.delete(id).await.unwrap();
        assert_eq!(store.get(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_flag_user_refresh_only_touches_that_user() {
        let store = SessionStore::in_memory(60);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let a1 = store.create(&SessionRecord::new(alice)).await.unwrap();
        let a2 = store.create(&SessionRecord::new(alice)).await.unwrap();
        let b1 = store.create(&SessionRecord::new(bob)).await.unwrap();

        assert_eq!(store.flag_user_refresh(alice).await.unwrap(), 2);

        assert!(store.get(a1).await.unwrap().unwrap().refresh_company);
        assert!(store.get(a2).await.unwrap().unwrap().refresh_company);
        assert!(!store.get(b1).await.unwrap().unwrap().refresh_company);
    }

    #[tokio::test]
    async fn test_memory_sessions_expire_after_ttl() {
        let store = SessionStore::in_memory(1);
        let user = Uuid::new_v4();
        let id = store.create(&SessionRecord::new(user)).await.unwrap();
        assert!(store.get(id).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(store.get(id).await.unwrap(), None);
        assert_eq!(store.flag_user_refresh(user).await.unwrap(), 0);
        assert!(store.memory.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_write_extends_memory_session() {
        let store = SessionStore::in_memory(1);
        let record = SessionRecord::new(Uuid::new_v4());
        let id = store.create(&record).await.unwrap();

        tokio::time::sleep(Duration::from_millis(600)).await;
        store.put(id, &record).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(store.get(id).await.unwrap(), Some(record));
    }

    #[test]
    fn test_key_layout() {
        let id = Uuid::nil();
        assert_eq!(
            session_key(id),
            "session:00000000-0000-0000-0000-000000000000"
        );
        assert!(user_sessions_key(id).starts_with("user_sessions:"));
    }
}
