use serde::Serialize;
use thiserror::Error;

/// A request that is well-formed but clashes with the current state of a
/// house, a follow relationship or an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Conflict {
    #[error("already a member of this house")]
    AlreadyMember,

    #[error("not a member of this house")]
    NotMember,

    #[error("house is at full capacity")]
    HouseFull,

    #[error("house is not accepting new members")]
    HouseInactive,

    #[error("the host cannot leave their own house")]
    IsHost,

    #[error("users cannot follow themselves")]
    SelfFollow,

    #[error("username is already taken")]
    UsernameTaken,

    #[error("email is already registered")]
    EmailTaken,
}

impl Conflict {
    /// Stable machine-readable code used in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyMember => "already_member",
            Self::NotMember => "not_member",
            Self::HouseFull => "house_full",
            Self::HouseInactive => "house_inactive",
            Self::IsHost => "is_host",
            Self::SelfFollow => "self_follow",
            Self::UsernameTaken => "username_taken",
            Self::EmailTaken => "email_taken",
        }
    }
}
