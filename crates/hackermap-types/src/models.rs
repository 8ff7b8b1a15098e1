use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account record without credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

/// What other users get to see of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub display_name: String,
    pub bio: String,
    /// Upload id of the avatar image.
    pub avatar: Option<Uuid>,
    pub time_zone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct House {
    pub id: Uuid,
    pub host_id: Uuid,
    pub title: String,
    pub description: String,
    pub address: String,
    pub capacity: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseSummary {
    pub id: Uuid,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseImage {
    pub id: Uuid,
    pub house_id: Uuid,
    /// Upload id of the stored blob.
    pub image: Uuid,
    pub caption: String,
    pub uploaded_at: DateTime<Utc>,
}

/// The thing a follow row points at. Exactly one per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum FollowTarget {
    User(Uuid),
    House(Uuid),
}

impl FollowTarget {
    pub fn id(&self) -> Uuid {
        match self {
            Self::User(id) | Self::House(id) => *id,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User(_))
    }

    pub fn is_house(&self) -> bool {
        matches!(self, Self::House(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    pub id: Uuid,
    pub follower_id: Uuid,
    pub target: FollowTarget,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_by: Uuid,
    /// Cleared when the house is deleted.
    pub house_id: Option<Uuid>,
    pub location: String,
    pub is_public: bool,
    pub external_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Calendar entry: an event plus the names needed to display it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEvent {
    #[serde(flatten)]
    pub event: Event,
    pub creator_username: String,
    pub house_title: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub followers_count: u64,
    pub following_count: u64,
}

/// A user the viewer follows, with the houses that user belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowedUser {
    pub user: PublicUser,
    pub houses: Vec<HouseSummary>,
    pub followed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follow_target_serializes_tagged() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(FollowTarget::House(id)).unwrap();
        assert_eq!(json["type"], "house");
        assert_eq!(json["id"], id.to_string());

        let back: FollowTarget = serde_json::from_value(json).unwrap();
        assert_eq!(back, FollowTarget::House(id));
        assert!(back.is_house());
        assert!(!back.is_user());
    }
}
