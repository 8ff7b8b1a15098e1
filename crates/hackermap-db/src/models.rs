//! Rows that never leave the server as-is. Everything else maps straight to
//! `hackermap_types::models`.

use chrono::{DateTime, Utc};
use hackermap_types::models::User;
use uuid::Uuid;

/// Account row including the password hash, used only for login.
pub struct UserRow {
    pub user: User,
    pub password: String,
}

pub struct UploadRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

/// How a user relates to a house.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HouseRole {
    pub is_host: bool,
    pub is_member: bool,
}

impl HouseRole {
    pub fn can_post_events(&self) -> bool {
        self.is_host || self.is_member
    }
}
