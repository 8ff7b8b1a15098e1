use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::forms::{FieldSpec, FormErrors};
use crate::models::{
    Event, FeedEvent, FollowedUser, House, HouseImage, HouseSummary, Profile, PublicUser,
};

// -- JWT Claims --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    /// Token id, recorded on logout so the token stops working.
    pub jti: Uuid,
    pub exp: usize,
}

// -- Notices --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// One-shot message shown to the user after an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

/// Body returned by every side-effecting route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub notices: Vec<Notice>,
    pub redirect: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub notice: Notice,
    pub redirect: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<FormErrors>,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    /// Username or email address.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Houses --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseListItem {
    #[serde(flatten)]
    pub house: House,
    pub images: Vec<HouseImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseDetail {
    #[serde(flatten)]
    pub house: House,
    pub host: PublicUser,
    pub images: Vec<HouseImage>,
    pub members: Vec<PublicUser>,
    pub events: Vec<Event>,
    pub followers_count: u64,
    pub is_member: bool,
    pub is_host: bool,
    pub is_following: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HouseEditContext {
    pub house: House,
    pub existing_images: Vec<HouseImage>,
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house: Option<HouseSummary>,
    pub fields: Vec<FieldSpec>,
}

// -- Users --

#[derive(Debug, Default, Deserialize)]
pub struct FromHouseQuery {
    /// Kept as a string so a malformed id degrades to "no referral house".
    pub from_house: Option<String>,
}

impl FromHouseQuery {
    pub fn house_id(&self) -> Option<Uuid> {
        self.from_house.as_deref().and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfileResponse {
    pub user: PublicUser,
    pub profile: Profile,
    pub followers_count: u64,
    pub following_count: u64,
    pub is_following: bool,
    pub is_own_profile: bool,
    pub from_house: Option<HouseSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowingsResponse {
    pub followed_users: Vec<FollowedUser>,
    pub following_count: usize,
}

// -- Events --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCalendarResponse {
    pub events: Vec<FeedEvent>,
}

// -- Uploads --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: Uuid,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
}
