pub mod auth;
pub mod error;
pub mod events;
pub mod extract;
pub mod guards;
pub mod houses;
pub mod middleware;
pub mod paths;
pub mod uploads;
pub mod users;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use serde_json::json;
use tracing::error;

use hackermap_db::Database;
use hackermap_types::api::{ActionResponse, Notice};

pub use auth::{AppState, AppStateInner};
pub use error::{AppError, ErrorKind, ResultExt};

/// Runs a blocking store call off the async runtime.
pub async fn db_call<T, F>(state: &AppState, f: F) -> Result<T, AppError>
where
    F: FnOnce(&Database) -> hackermap_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            AppError::from(ErrorKind::Internal)
        })?
        .map_err(AppError::from)
}

pub(crate) fn action(notice: Notice, redirect: impl Into<String>) -> ActionResponse {
    ActionResponse { notices: vec![notice], redirect: redirect.into(), data: None }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Every HTTP route. Callers add CORS and tracing layers.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/create_account", post(auth::create_account))
        .route("/login", post(auth::login))
        .route("/uploads/{upload_id}", get(uploads::fetch))
        .route("/health", get(health));

    let viewer_aware = Router::new()
        .route("/houses", get(houses::list))
        .route("/houses/{house_id}", get(houses::detail))
        .route("/users/{user_id}", get(users::profile))
        .route("/events", get(events::calendar))
        .layer(from_fn_with_state(state.clone(), middleware::optional_auth));

    let protected = Router::new()
        .route("/houses/new", get(houses::create_form).post(houses::create))
        .route("/houses/{house_id}/edit", get(houses::edit_form).post(houses::edit))
        .route("/houses/{house_id}/delete", post(houses::delete))
        .route(
            "/houses/{house_id}/images/{image_id}/delete",
            post(houses::delete_image),
        )
        .route("/houses/{house_id}/join", post(houses::join))
        .route("/houses/{house_id}/leave", post(houses::leave))
        .route("/houses/{house_id}/follow", post(houses::toggle_follow))
        .route(
            "/houses/{house_id}/events/create",
            get(events::create_form).post(events::create),
        )
        .route("/users/{user_id}/follow", post(users::toggle_follow))
        .route("/followings", get(users::followings))
        .route("/profile", post(users::update_profile))
        .route("/logout", post(auth::logout))
        .route(
            "/uploads",
            post(uploads::upload).layer(DefaultBodyLimit::max(uploads::MAX_UPLOAD_SIZE)),
        )
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public)
        .merge(viewer_aware)
        .merge(protected)
        .with_state(state)
}
