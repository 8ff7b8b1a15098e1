use chrono::Utc;
use hackermap_types::error::Conflict;
use hackermap_types::forms::ProfileChanges;
use hackermap_types::models::{Profile, PublicUser, User};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::info;
use uuid::Uuid;

use super::{exists, opt_uuid_at, uploads::ensure_owned_upload, uuid_at};
use crate::models::UserRow;
use crate::{Database, Result, StoreError};

const USER_COLUMNS: &str = "id, username, email, is_active, is_staff, date_joined";

/// Public view of a user. Expects `users u LEFT JOIN profiles p`.
pub(crate) const PUBLIC_USER_COLUMNS: &str =
    "u.id, u.username, COALESCE(p.display_name, u.username), p.avatar_id";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_at(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        is_active: row.get(3)?,
        is_staff: row.get(4)?,
        date_joined: row.get(5)?,
    })
}

/// Reads a `PUBLIC_USER_COLUMNS` projection starting at `offset`.
pub(crate) fn public_user_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<PublicUser> {
    Ok(PublicUser {
        id: uuid_at(row, offset)?,
        username: row.get(offset + 1)?,
        display_name: row.get(offset + 2)?,
        avatar: opt_uuid_at(row, offset + 3)?,
    })
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        user_id: uuid_at(row, 0)?,
        display_name: row.get(1)?,
        bio: row.get(2)?,
        avatar: opt_uuid_at(row, 3)?,
        time_zone: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub(crate) fn query_public_user(conn: &Connection, id: Uuid) -> Result<Option<PublicUser>> {
    let sql = format!(
        "SELECT {} FROM users u LEFT JOIN profiles p ON p.user_id = u.id WHERE u.id = ?1",
        PUBLIC_USER_COLUMNS
    );
    Ok(conn
        .query_row(&sql, [id.to_string()], |row| public_user_from_row(row, 0))
        .optional()?)
}

pub(crate) fn user_exists(conn: &Connection, id: Uuid) -> Result<bool> {
    exists(conn, "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)", [id.to_string()])
}

fn query_profile(conn: &Connection, user_id: Uuid) -> Result<Option<Profile>> {
    Ok(conn
        .query_row(
            "SELECT user_id, display_name, bio, avatar_id, time_zone, created_at, updated_at
             FROM profiles WHERE user_id = ?1",
            [user_id.to_string()],
            profile_from_row,
        )
        .optional()?)
}

impl Database {
    // -- Accounts --

    /// Creates the account and its profile. The display name starts out as
    /// the username.
    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> Result<User> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if exists(&tx, "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)", [username])? {
                return Err(Conflict::UsernameTaken.into());
            }
            if exists(&tx, "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)", [email])? {
                return Err(Conflict::EmailTaken.into());
            }

            let user = User {
                id: Uuid::new_v4(),
                username: username.to_string(),
                email: email.to_string(),
                is_active: true,
                is_staff: false,
                date_joined: Utc::now(),
            };

            tx.execute(
                "INSERT INTO users (id, username, email, password, is_active, is_staff, date_joined)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.id.to_string(),
                    user.username,
                    user.email,
                    password_hash,
                    user.is_active,
                    user.is_staff,
                    user.date_joined,
                ],
            )?;
            tx.execute(
                "INSERT INTO profiles (user_id, display_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![user.id.to_string(), user.username, user.date_joined],
            )?;
            tx.commit()?;

            info!("Created user {} ({})", user.username, user.id);
            Ok(user)
        })
    }

    /// Looks up an account by username, falling back to email.
    pub fn find_login(&self, login: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, password FROM users
                 WHERE username = ?1 OR email = ?1
                 ORDER BY (username = ?1) DESC
                 LIMIT 1",
                USER_COLUMNS
            );
            Ok(conn
                .query_row(&sql, [login], |row| {
                    Ok(UserRow {
                        user: user_from_row(row)?,
                        password: row.get(6)?,
                    })
                })
                .optional()?)
        })
    }

    pub fn get_public_user(&self, id: Uuid) -> Result<Option<PublicUser>> {
        self.with_conn(|conn| query_public_user(conn, id))
    }

    pub fn set_user_active(&self, id: Uuid, active: bool) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_active = ?2 WHERE id = ?1",
                params![id.to_string(), active],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("user"));
            }
            Ok(())
        })
    }

    /// False for deactivated and deleted accounts.
    pub fn is_user_active(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            exists(
                conn,
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1 AND is_active = 1)",
                [id.to_string()],
            )
        })
    }

    // -- Profiles --

    pub fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        self.with_conn(|conn| query_profile(conn, user_id))
    }

    pub fn update_profile(&self, user_id: Uuid, changes: &ProfileChanges) -> Result<Profile> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if let Some(avatar) = changes.avatar {
                ensure_owned_upload(&tx, avatar, user_id, "avatar")?;
            }
            let changed = tx.execute(
                "UPDATE profiles
                 SET display_name = ?2, bio = ?3, time_zone = ?4, avatar_id = ?5, updated_at = ?6
                 WHERE user_id = ?1",
                params![
                    user_id.to_string(),
                    changes.display_name,
                    changes.bio,
                    changes.time_zone,
                    changes.avatar.map(|id| id.to_string()),
                    Utc::now(),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("profile"));
            }
            let profile = query_profile(&tx, user_id)?.ok_or(StoreError::NotFound("profile"))?;
            tx.commit()?;
            Ok(profile)
        })
    }

    // -- Revoked tokens --

    /// Records a logged-out token id. Expired entries are pruned on the way.
    pub fn revoke_token(&self, jti: Uuid, expires_at: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM revoked_tokens WHERE expires_at < ?1",
                [Utc::now().timestamp()],
            )?;
            conn.execute(
                "INSERT OR IGNORE INTO revoked_tokens (jti, expires_at) VALUES (?1, ?2)",
                params![jti.to_string(), expires_at],
            )?;
            Ok(())
        })
    }

    pub fn is_token_revoked(&self, jti: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            exists(
                conn,
                "SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE jti = ?1)",
                [jti.to_string()],
            )
        })
    }
}
