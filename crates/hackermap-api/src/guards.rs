//! Role checks for house routes. Each guard returns a proof value carrying
//! the house, so a handler holding one has already been authorized.

use uuid::Uuid;

use hackermap_types::models::House;

use crate::auth::AppState;
use crate::db_call;
use crate::error::{AppError, ErrorKind};
use crate::paths;

/// The caller hosts this house.
#[derive(Debug)]
pub struct HostOf(pub House);

/// The caller hosts or has joined this house.
#[derive(Debug)]
pub struct MemberOrHostOf(pub House);

pub async fn host_of(state: &AppState, house_id: Uuid, user_id: Uuid) -> Result<HostOf, AppError> {
    let (house, role) = db_call(state, move |db| db.house_role(house_id, user_id)).await?;
    if !role.is_host {
        return Err(AppError::from(ErrorKind::PermissionDenied)
            .denied_with("You don't have permission to edit this house.")
            .redirect_to(paths::house(house_id)));
    }
    Ok(HostOf(house))
}

pub async fn member_or_host_of(
    state: &AppState,
    house_id: Uuid,
    user_id: Uuid,
) -> Result<MemberOrHostOf, AppError> {
    let (house, role) = db_call(state, move |db| db.house_role(house_id, user_id)).await?;
    if !role.can_post_events() {
        return Err(AppError::from(ErrorKind::PermissionDenied)
            .denied_with("Only house members can create events.")
            .redirect_to(paths::house(house_id)));
    }
    Ok(MemberOrHostOf(house))
}
