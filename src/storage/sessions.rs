/// Session Record Storage
///
/// Durable mapping of session id to the hash of its refresh value. The store
/// is the only synchronization point for issuance: `insert` must fail with
/// `DatabaseError::UniqueConstraintViolation` when the id is already taken.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::auth::constant_time_eq;
use crate::error::{AppError, DatabaseError};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn exists(&self, session_id: &str) -> Result<bool, AppError>;

    /// Fails with `UniqueConstraintViolation` if `session_id` is already live
    async fn insert(&self, session_id: &str, refresh_hash: &str) -> Result<(), AppError>;

    /// False when the record is absent or holds a different hash
    async fn refresh_hash_matches(
        &self,
        session_id: &str,
        refresh_hash: &str,
    ) -> Result<bool, AppError>;

    /// Returns whether a record was actually removed
    async fn delete(&self, session_id: &str) -> Result<bool, AppError>;

    /// Remove every record created before `cutoff`, returning how many went
    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn exists(&self, session_id: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE session_id = $1)",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn insert(&self, session_id: &str, refresh_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, refresh_hash, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(session_id)
        .bind(refresh_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn refresh_hash_matches(
        &self,
        session_id: &str,
        refresh_hash: &str,
    ) -> Result<bool, AppError> {
        let stored = sqlx::query_scalar::<_, String>(
            "SELECT refresh_hash FROM sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stored
            .map(|stored| constant_time_eq(stored.as_bytes(), refresh_hash.as_bytes()))
            .unwrap_or(false))
    }

    async fn delete(&self, session_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

struct SessionRecord {
    refresh_hash: String,
    created_at: DateTime<Utc>,
}

/// Process-local store for tests and single-node development
#[derive(Default)]
pub struct InMemorySessionStore {
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<String, SessionRecord>>, AppError> {
        self.records.lock().map_err(|_| {
            AppError::Database(DatabaseError::UnexpectedError(
                "session store lock poisoned".to_string(),
            ))
        })
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn exists(&self, session_id: &str) -> Result<bool, AppError> {
        Ok(self.records()?.contains_key(session_id))
    }

    async fn insert(&self, session_id: &str, refresh_hash: &str) -> Result<(), AppError> {
        let mut records = self.records()?;
        if records.contains_key(session_id) {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "sessions_pkey".to_string(),
            )));
        }
        records.insert(
            session_id.to_string(),
            SessionRecord {
                refresh_hash: refresh_hash.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn refresh_hash_matches(
        &self,
        session_id: &str,
        refresh_hash: &str,
    ) -> Result<bool, AppError> {
        Ok(self
            .records()?
            .get(session_id)
            .map(|record| {
                constant_time_eq(record.refresh_hash.as_bytes(), refresh_hash.as_bytes())
            })
            .unwrap_or(false))
    }

    async fn delete(&self, session_id: &str) -> Result<bool, AppError> {
        Ok(self.records()?.remove(session_id).is_some())
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|_, record| record.created_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_then_exists() {
        let store = InMemorySessionStore::new();
        assert!(!store.exists("sid-1").await.unwrap());

        store.insert("sid-1", "hash-1").await.unwrap();
        assert!(store.exists("sid-1").await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_insert_is_distinguishable() {
        let store = InMemorySessionStore::new();
        store.insert("sid-1", "hash-1").await.unwrap();

        let err = store.insert("sid-1", "hash-2").await.unwrap_err();
        assert!(err.is_duplicate());
        // The original record is untouched
        assert!(store.refresh_hash_matches("sid-1", "hash-1").await.unwrap());
    }

    #[tokio::test]
    async fn hash_match_requires_record_and_equal_hash() {
        let store = InMemorySessionStore::new();
        store.insert("sid-1", "hash-1").await.unwrap();

        assert!(store.refresh_hash_matches("sid-1", "hash-1").await.unwrap());
        assert!(!store.refresh_hash_matches("sid-1", "hash-2").await.unwrap());
        assert!(!store.refresh_hash_matches("sid-2", "hash-1").await.unwrap());
    }

    #[tokio::test]
    async fn delete_reports_whether_a_record_was_removed() {
        let store = InMemorySessionStore::new();
        store.insert("sid-1", "hash-1").await.unwrap();

        assert!(store.delete("sid-1").await.unwrap());
        assert!(!store.delete("sid-1").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_created_before_keeps_newer_records() {
        let store = InMemorySessionStore::new();
        store.insert("old", "hash-1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let cutoff = Utc::now();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        store.insert("new", "hash-2").await.unwrap();

        assert_eq!(store.delete_created_before(cutoff).await.unwrap(), 1);
        assert!(!store.exists("old").await.unwrap());
        assert!(store.exists("new").await.unwrap());
        assert_eq!(store.delete_created_before(cutoff).await.unwrap(), 0);
    }
}
