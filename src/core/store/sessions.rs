use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use sha2::{Digest, Sha256};

use super::types::SessionRecord;
use super::{Store, now_timestamp};

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_raw_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

impl Store {
    /// Create a session and return the raw token. Only its hash is stored.
    pub async fn create_session(&self, user_id: &str, expires_at: DateTime<Utc>) -> Result<String> {
        let raw_token = generate_raw_token();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO sessions (token_hash, user_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                hash_token(&raw_token),
                user_id,
                expires_at.timestamp(),
                now_timestamp()
            ],
        )?;
        Ok(raw_token)
    }

    /// Look up a live session. Expired sessions are removed and reported as absent.
    pub async fn find_session(
        &self,
        raw_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>> {
        let token_hash = hash_token(raw_token);
        let db = self.db.lock().await;
        let row: Option<(String, i64)> = db
            .query_row(
                "SELECT user_id, expires_at FROM sessions WHERE token_hash = ?1",
                params![token_hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((user_id, expires_secs)) = row else {
            return Ok(None);
        };
        if expires_secs <= now.timestamp() {
            db.execute(
                "DELETE FROM sessions WHERE token_hash = ?1",
                params![token_hash],
            )?;
            return Ok(None);
        }
        Ok(DateTime::<Utc>::from_timestamp(expires_secs, 0)
            .map(|expires_at| SessionRecord { user_id, expires_at }))
    }

    pub async fn delete_session(&self, raw_token: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "DELETE FROM sessions WHERE token_hash = ?1",
            params![hash_token(raw_token)],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::test_store;
    use chrono::Duration;

    #[tokio::test]
    async fn session_create_and_find() {
        let store = test_store();
        let now = Utc::now();
        let token = store
            .create_session("user-1", now + Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(token.len(), 64);

        let session = store.find_session(&token, now).await.unwrap().unwrap();
        assert_eq!(session.user_id, "user-1");
    }

    #[tokio::test]
    async fn raw_token_is_not_stored() {
        let store = test_store();
        let token = store
            .create_session("user-1", Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        let db = store.db.lock().await;
        let count: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM sessions WHERE token_hash = ?1",
                params![token],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn expired_session_is_absent_and_removed() {
        let store = test_store();
        let now = Utc::now();
        let token = store
            .create_session("user-1", now - Duration::seconds(1))
            .await
            .unwrap();
        assert!(store.find_session(&token, now).await.unwrap().is_none());
        assert!(!store.delete_session(&token).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_token_is_absent() {
        let store = test_store();
        assert!(
            store
                .find_session("not-a-session", Utc::now())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn delete_session_logs_out() {
        let store = test_store();
        let now = Utc::now();
        let token = store
            .create_session("user-1", now + Duration::hours(1))
            .await
            .unwrap();
        assert!(store.delete_session(&token).await.unwrap());
        assert!(store.find_session(&token, now).await.unwrap().is_none());
    }
}
