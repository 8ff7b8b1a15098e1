use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use hackermap_db::StoreError;
use hackermap_types::api::{
    ActionResponse, FollowingsResponse, FromHouseQuery, Notice, UserProfileResponse,
};
use hackermap_types::forms::ProfileForm;
use hackermap_types::models::FollowTarget;

use crate::auth::AppState;
use crate::error::{AppError, ResultExt};
use crate::extract::AppJson;
use crate::middleware::{CurrentUser, Viewer};
use crate::{action, db_call, paths};

/// GET /users/{user_id}?from_house=
pub async fn profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<FromHouseQuery>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Json<UserProfileResponse>, AppError> {
    let viewer_id = viewer.user_id();
    let from_house_id = query.house_id();

    let response = db_call(&state, move |db| {
        let user = db.get_public_user(user_id)?.ok_or(StoreError::NotFound("user"))?;
        let profile = db.get_profile(user_id)?.ok_or(StoreError::NotFound("profile"))?;
        let stats = db.profile_stats(user_id)?;
        let is_following = match viewer_id {
            Some(id) => db.is_following(id, FollowTarget::User(user_id))?,
            None => false,
        };
        let from_house = match from_house_id {
            Some(id) => db.get_house_summary(id)?,
            None => None,
        };

        Ok(UserProfileResponse {
            user,
            profile,
            followers_count: stats.followers_count,
            following_count: stats.following_count,
            is_following,
            is_own_profile: viewer_id == Some(user_id),
            from_house,
        })
    })
    .await?;
    Ok(Json(response))
}

#[derive(Debug, Default, Deserialize)]
pub struct FollowUserBody {
    #[serde(default)]
    pub from_house: Option<String>,
}

/// POST /users/{user_id}/follow. `from_house` may come in the query string or
/// the body and is carried over to the redirect.
pub async fn toggle_follow(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<FromHouseQuery>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
    body: Option<Json<FollowUserBody>>,
) -> Result<Json<ActionResponse>, AppError> {
    let from_house = body
        .and_then(|Json(b)| b.from_house)
        .or(query.from_house);
    let redirect = paths::user_from_house(user_id, from_house.as_deref());

    let follower = claims.sub;
    let (name, following) = db_call(&state, move |db| {
        let following = db.toggle_follow(follower, FollowTarget::User(user_id))?;
        let target = db.get_public_user(user_id)?.ok_or(StoreError::NotFound("user"))?;
        Ok((target.display_name, following))
    })
    .await
    .redirect_to(redirect.clone())?;

    let notice = if following {
        Notice::success(format!("You are now following {}!", name))
    } else {
        Notice::success(format!("You have unfollowed {}.", name))
    };
    let mut response = action(notice, redirect);
    response.data = Some(json!({ "following": following }));
    Ok(Json(response))
}

/// GET /followings
pub async fn followings(
    State(state): State<AppState>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
) -> Result<Json<FollowingsResponse>, AppError> {
    let user_id = claims.sub;
    let followed_users = db_call(&state, move |db| db.followings(user_id)).await?;
    Ok(Json(FollowingsResponse {
        following_count: followed_users.len(),
        followed_users,
    }))
}

/// POST /profile
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
    AppJson(form): AppJson<ProfileForm>,
) -> Result<Json<ActionResponse>, AppError> {
    let user_id = claims.sub;
    let redirect = paths::user(user_id);
    let changes = form.validate().redirect_to(redirect.clone())?;
    let profile = db_call(&state, move |db| db.update_profile(user_id, &changes))
        .await
        .redirect_to(redirect.clone())?;

    let mut response = action(Notice::success("Your profile has been updated."), redirect);
    response.data = Some(json!(profile));
    Ok(Json(response))
}
