/// Identity Record Storage
///
/// Identities are created on registration and never updated. Absence is
/// always reported as `DatabaseError::NotFound`, never as an empty value.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sqlx::PgPool;

use crate::auth::constant_time_eq;
use crate::error::{AppError, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub guid: String,
    pub email: String,
    pub password_hash: String,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fails with `UniqueConstraintViolation` on a taken guid or email
    async fn create(&self, identity: &Identity) -> Result<(), AppError>;

    /// The identity owning `guid` whose stored hash equals `password_hash`
    async fn lookup(&self, guid: &str, password_hash: &str) -> Result<Identity, AppError>;

    async fn email_of(&self, guid: &str) -> Result<String, AppError>;
}

fn not_found(what: &str) -> AppError {
    AppError::Database(DatabaseError::NotFound(what.to_string()))
}

pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn create(&self, identity: &Identity) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (guid, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&identity.guid)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn lookup(&self, guid: &str, password_hash: &str) -> Result<Identity, AppError> {
        let row = sqlx::query_as::<_, (String, String, String)>(
            "SELECT guid, email, password_hash FROM users WHERE guid = $1",
        )
        .bind(guid)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((guid, email, stored_hash))
                if constant_time_eq(stored_hash.as_bytes(), password_hash.as_bytes()) =>
            {
                Ok(Identity {
                    guid,
                    email,
                    password_hash: stored_hash,
                })
            }
            _ => Err(not_found("identity")),
        }
    }

    async fn email_of(&self, guid: &str) -> Result<String, AppError> {
        sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE guid = $1")
            .bind(guid)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("identity"))
    }
}

/// Process-local store for tests and single-node development
#[derive(Default)]
pub struct InMemoryIdentityStore {
    identities: Mutex<HashMap<String, Identity>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn identities(&self) -> Result<MutexGuard<'_, HashMap<String, Identity>>, AppError> {
        self.identities.lock().map_err(|_| {
            AppError::Database(DatabaseError::UnexpectedError(
                "identity store lock poisoned".to_string(),
            ))
        })
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn create(&self, identity: &Identity) -> Result<(), AppError> {
        let mut identities = self.identities()?;

        let taken = identities.contains_key(&identity.guid)
            || identities.values().any(|existing| existing.email == identity.email);
        if taken {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "users_email_key".to_string(),
            )));
        }

        identities.insert(identity.guid.clone(), identity.clone());
        Ok(())
    }

    async fn lookup(&self, guid: &str, password_hash: &str) -> Result<Identity, AppError> {
        self.identities()?
            .get(guid)
            .filter(|identity| {
                constant_time_eq(identity.password_hash.as_bytes(), password_hash.as_bytes())
            })
            .cloned()
            .ok_or_else(|| not_found("identity"))
    }

    async fn email_of(&self, guid: &str) -> Result<String, AppError> {
        self.identities()?
            .get(guid)
            .map(|identity| identity.email.clone())
            .ok_or_else(|| not_found("identity"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(guid: &str, email: &str) -> Identity {
        Identity {
            guid: guid.to_string(),
            email: email.to_string(),
            password_hash: "a".repeat(64),
        }
    }

    #[tokio::test]
    async fn create_then_lookup() {
        let store = InMemoryIdentityStore::new();
        let alice = identity("guid-1", "alice@example.com");
        store.create(&alice).await.unwrap();

        assert_eq!(store.lookup("guid-1", &alice.password_hash).await.unwrap(), alice);
        assert_eq!(store.email_of("guid-1").await.unwrap(), "alice@example.com");
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryIdentityStore::new();
        store.create(&identity("guid-1", "alice@example.com")).await.unwrap();

        let err = store
            .create(&identity("guid-2", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn wrong_password_hash_is_not_found() {
        let store = InMemoryIdentityStore::new();
        store.create(&identity("guid-1", "alice@example.com")).await.unwrap();

        let err = store.lookup("guid-1", &"b".repeat(64)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn unknown_guid_is_not_found() {
        let store = InMemoryIdentityStore::new();

        assert!(store.lookup("nobody", "hash").await.unwrap_err().is_not_found());
        assert!(store.email_of("nobody").await.unwrap_err().is_not_found());
    }
}
