use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use hackermap_db::StoreError;
use hackermap_types::api::{
    ActionResponse, FormContext, HouseDetail, HouseEditContext, HouseListItem, Notice,
};
use hackermap_types::forms::{HouseCreateForm, HouseEditForm};
use hackermap_types::models::FollowTarget;

use crate::auth::AppState;
use crate::error::{AppError, ResultExt};
use crate::extract::AppJson;
use crate::guards::{HostOf, host_of};
use crate::middleware::{CurrentUser, Viewer};
use crate::{action, db_call, paths};

/// GET /houses
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<HouseListItem>>, AppError> {
    let houses = db_call(&state, |db| db.list_houses_with_images()).await?;
    Ok(Json(
        houses
            .into_iter()
            .map(|(house, images)| HouseListItem { house, images })
            .collect(),
    ))
}

/// GET /houses/{house_id}
pub async fn detail(
    State(state): State<AppState>,
    Path(house_id): Path<Uuid>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Json<HouseDetail>, AppError> {
    let viewer_id = viewer.user_id();
    let detail = db_call(&state, move |db| {
        let (house, role) = match viewer_id {
            Some(id) => {
                let (house, role) = db.house_role(house_id, id)?;
                (house, Some(role))
            }
            None => (db.get_house(house_id)?.ok_or(StoreError::NotFound("house"))?, None),
        };
        let host = db.get_public_user(house.host_id)?.ok_or(StoreError::NotFound("user"))?;
        let is_following = match viewer_id {
            Some(id) => db.is_following(id, FollowTarget::House(house_id))?,
            None => false,
        };
        let role = role.unwrap_or_default();

        Ok(HouseDetail {
            host,
            images: db.list_images(house_id)?,
            members: db.list_members(house_id)?,
            events: db.house_events(house_id)?,
            followers_count: db.follower_count(FollowTarget::House(house_id))?,
            is_member: role.is_member,
            is_host: role.is_host,
            is_following,
            house,
        })
    })
    .await?;
    Ok(Json(detail))
}

/// GET /houses/new
pub async fn create_form() -> Json<FormContext> {
    Json(FormContext { house: None, fields: HouseCreateForm::schema() })
}

/// POST /houses/new
pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
    AppJson(form): AppJson<HouseCreateForm>,
) -> Result<impl IntoResponse, AppError> {
    let new = form.validate().redirect_to("/houses/new")?;
    let host_id = claims.sub;
    let house = db_call(&state, move |db| db.create_house(host_id, &new))
        .await
        .redirect_to("/houses/new")?;

    let mut response = action(
        Notice::success(format!("'{}' has been created!", house.title)),
        paths::house(house.id),
    );
    response.data = Some(json!(house));
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /houses/{house_id}/edit
pub async fn edit_form(
    State(state): State<AppState>,
    Path(house_id): Path<Uuid>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
) -> Result<Json<HouseEditContext>, AppError> {
    let HostOf(house) = host_of(&state, house_id, claims.sub).await?;
    let existing_images = db_call(&state, move |db| db.list_images(house_id)).await?;
    Ok(Json(HouseEditContext { house, existing_images, fields: HouseEditForm::schema() }))
}

/// POST /houses/{house_id}/edit. A new image is appended, never replacing
/// the gallery.
pub async fn edit(
    State(state): State<AppState>,
    Path(house_id): Path<Uuid>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
    AppJson(form): AppJson<HouseEditForm>,
) -> Result<Json<ActionResponse>, AppError> {
    host_of(&state, house_id, claims.sub).await?;
    let changes = form.validate().redirect_to(paths::edit_house(house_id))?;

    let actor = claims.sub;
    let (house, image) = db_call(&state, move |db| db.update_house(actor, house_id, &changes))
        .await
        .denied_with("You don't have permission to edit this house.")
        .redirect_to(paths::edit_house(house_id))?;

    let mut notices = Vec::new();
    if image.is_some() {
        notices.push(Notice::success("Image added successfully!"));
    }
    notices.push(Notice::success(format!("'{}' has been updated!", house.title)));
    info!("House {} updated by {}", house.id, claims.username);

    Ok(Json(ActionResponse {
        notices,
        redirect: paths::house(house.id),
        data: Some(json!(house)),
    }))
}

/// POST /houses/{house_id}/delete
pub async fn delete(
    State(state): State<AppState>,
    Path(house_id): Path<Uuid>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
) -> Result<Json<ActionResponse>, AppError> {
    let actor = claims.sub;
    let house = db_call(&state, move |db| db.delete_house(actor, house_id))
        .await
        .denied_with("You don't have permission to delete this house.")
        .redirect_to(paths::house(house_id))?;

    Ok(Json(action(
        Notice::success(format!("'{}' has been deleted.", house.title)),
        paths::HOUSES,
    )))
}

/// POST /houses/{house_id}/images/{image_id}/delete
pub async fn delete_image(
    State(state): State<AppState>,
    Path((house_id, image_id)): Path<(Uuid, Uuid)>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
) -> Result<Json<ActionResponse>, AppError> {
    let actor = claims.sub;
    db_call(&state, move |db| db.delete_image(actor, house_id, image_id))
        .await
        .denied_with("You don't have permission to delete this image.")
        .redirect_to(paths::edit_house(house_id))?;

    Ok(Json(action(
        Notice::success("Image deleted successfully!"),
        paths::edit_house(house_id),
    )))
}

/// POST /houses/{house_id}/join
pub async fn join(
    State(state): State<AppState>,
    Path(house_id): Path<Uuid>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
) -> Result<Json<ActionResponse>, AppError> {
    let user_id = claims.sub;
    let house = db_call(&state, move |db| db.join_house(house_id, user_id))
        .await
        .redirect_to(paths::house(house_id))?;

    Ok(Json(action(
        Notice::success(format!("You have joined {}!", house.title)),
        paths::house(house_id),
    )))
}

/// POST /houses/{house_id}/leave
pub async fn leave(
    State(state): State<AppState>,
    Path(house_id): Path<Uuid>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
) -> Result<Json<ActionResponse>, AppError> {
    let user_id = claims.sub;
    let house = db_call(&state, move |db| db.leave_house(house_id, user_id))
        .await
        .redirect_to(paths::house(house_id))?;

    Ok(Json(action(
        Notice::success(format!("You have left {}.", house.title)),
        paths::house(house_id),
    )))
}

/// POST /houses/{house_id}/follow
pub async fn toggle_follow(
    State(state): State<AppState>,
    Path(house_id): Path<Uuid>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
) -> Result<Json<ActionResponse>, AppError> {
    let follower = claims.sub;
    let (title, following) = db_call(&state, move |db| {
        let following = db.toggle_follow(follower, FollowTarget::House(house_id))?;
        let house = db.get_house(house_id)?.ok_or(StoreError::NotFound("house"))?;
        Ok((house.title, following))
    })
    .await
    .redirect_to(paths::house(house_id))?;

    let notice = if following {
        Notice::success(format!("You are now following {}!", title))
    } else {
        Notice::success(format!("You have unfollowed {}.", title))
    };
    let mut response = action(notice, paths::house(house_id));
    response.data = Some(json!({ "following": following }));
    Ok(Json(response))
}
