use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use tracing::warn;

use super::types::{SignIn, UserRecord};
use super::{Store, now_timestamp};

struct RawUser {
    id: String,
    azure_id: String,
    email: String,
    name: String,
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_expires_at: Option<i64>,
    created_at: String,
    updated_at: String,
}

const USER_COLUMNS: &str = "id, azure_id, email, name, access_token, refresh_token, \
                            token_expires_at, created_at, updated_at";

fn raw_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawUser> {
    Ok(RawUser {
        id: row.get(0)?,
        azure_id: row.get(1)?,
        email: row.get(2)?,
        name: row.get(3)?,
        access_token: row.get(4)?,
        refresh_token: row.get(5)?,
        token_expires_at: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl Store {
    /// A stored token the current key cannot decrypt (rotated `SESSION_SECRET`)
    /// is treated as absent so the user is sent back through sign-in.
    fn readable_token(&self, user_id: &str, kind: &str, stored: Option<&str>) -> Option<String> {
        match self.cipher.decrypt_opt(stored) {
            Ok(token) => token,
            Err(e) => {
                warn!("Discarding unreadable {} token for user {}: {}", kind, user_id, e);
                None
            }
        }
    }

    fn decrypt_user(&self, raw: RawUser) -> UserRecord {
        UserRecord {
            access_token: self.readable_token(&raw.id, "access", raw.access_token.as_deref()),
            refresh_token: self.readable_token(&raw.id, "refresh", raw.refresh_token.as_deref()),
            token_expires_at: raw
                .token_expires_at
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
            id: raw.id,
            azure_id: raw.azure_id,
            email: raw.email,
            name: raw.name,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        }
    }

    /// Create the user on first sign-in, otherwise refresh profile and tokens.
    /// An absent refresh token keeps the one already stored, unless that one
    /// no longer decrypts.
    pub async fn upsert_user(&self, sign_in: &SignIn) -> Result<UserRecord> {
        let access = self.cipher.encrypt(&sign_in.access_token)?;
        let refresh = self.cipher.encrypt_opt(sign_in.refresh_token.as_deref())?;
        let expires = sign_in.token_expires_at.map(|t| t.timestamp());
        let now = now_timestamp();

        let raw = {
            let db = self.db.lock().await;
            let existing: Option<(String, Option<String>)> = db
                .query_row(
                    "SELECT id, refresh_token FROM users WHERE azure_id = ?1",
                    params![sign_in.azure_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let id = match existing {
                Some((id, stored_refresh)) => {
                    let refresh = refresh.or_else(|| {
                        stored_refresh.filter(|old| self.cipher.decrypt(old).is_ok())
                    });
                    db.execute(
                        "UPDATE users SET email = ?1, name = ?2, access_token = ?3,
                         refresh_token = ?4, token_expires_at = ?5,
                         updated_at = ?6 WHERE id = ?7",
                        params![sign_in.email, sign_in.name, access, refresh, expires, now, id],
                    )?;
                    id
                }
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    db.execute(
                        "INSERT INTO users (id, azure_id, email, name, access_token, refresh_token,
                         token_expires_at, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                        params![
                            id,
                            sign_in.azure_id,
                            sign_in.email,
                            sign_in.name,
                            access,
                            refresh,
                            expires,
                            now
                        ],
                    )?;
                    id
                }
            };

            db.query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![id],
                raw_user,
            )?
        };
        Ok(self.decrypt_user(raw))
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        let raw = {
            let db = self.db.lock().await;
            db.query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![user_id],
                raw_user,
            )
            .optional()?
        };
        Ok(raw.map(|r| self.decrypt_user(r)))
    }

    /// Persist a refreshed token set. `refresh_token = None` leaves the stored one untouched.
    pub async fn update_user_tokens(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let access = self.cipher.encrypt(access_token)?;
        let refresh = self.cipher.encrypt_opt(refresh_token)?;
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE users SET access_token = ?1, refresh_token = COALESCE(?2, refresh_token),
             token_expires_at = ?3, updated_at = ?4 WHERE id = ?5",
            params![
                access,
                refresh,
                expires_at.map(|t| t.timestamp()),
                now_timestamp(),
                user_id
            ],
        )?;
        Ok(rows > 0)
    }
}
