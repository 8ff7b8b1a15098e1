use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use hackermap_types::api::{EventCalendarResponse, FormContext, Notice};
use hackermap_types::forms::EventCreateForm;
use hackermap_types::models::HouseSummary;

use crate::auth::AppState;
use crate::error::{AppError, ResultExt};
use crate::extract::AppJson;
use crate::guards::{MemberOrHostOf, member_or_host_of};
use crate::middleware::{CurrentUser, Viewer};
use crate::{action, db_call, paths};

/// GET /events. Anonymous visitors get an empty calendar.
pub async fn calendar(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Json<EventCalendarResponse>, AppError> {
    let events = match viewer.user_id() {
        Some(user_id) => db_call(&state, move |db| db.event_feed(user_id)).await?,
        None => Vec::new(),
    };
    Ok(Json(EventCalendarResponse { events }))
}

/// GET /houses/{house_id}/events/create
pub async fn create_form(
    State(state): State<AppState>,
    Path(house_id): Path<Uuid>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
) -> Result<Json<FormContext>, AppError> {
    let MemberOrHostOf(house) = member_or_host_of(&state, house_id, claims.sub).await?;
    Ok(Json(FormContext {
        house: Some(HouseSummary { id: house.id, title: house.title }),
        fields: EventCreateForm::schema(),
    }))
}

/// POST /houses/{house_id}/events/create. Permission is checked before the
/// form is looked at.
pub async fn create(
    State(state): State<AppState>,
    Path(house_id): Path<Uuid>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
    AppJson(form): AppJson<EventCreateForm>,
) -> Result<impl IntoResponse, AppError> {
    member_or_host_of(&state, house_id, claims.sub).await?;
    let form_page = format!("/houses/{}/events/create", house_id);
    let new = form.validate().redirect_to(form_page.clone())?;

    let actor = claims.sub;
    let event = db_call(&state, move |db| db.create_event(actor, house_id, &new))
        .await
        .denied_with("Only house members can create events.")
        .redirect_to(form_page)?;

    let mut response = action(
        Notice::success(format!("Event '{}' has been created!", event.title)),
        paths::house(house_id),
    );
    response.data = Some(json!(event));
    Ok((StatusCode::CREATED, Json(response)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::testing;

    fn event(start: &str, end: &str) -> Value {
        json!({
            "title": "Demo Night",
            "start_time": start,
            "end_time": end,
            "location": "Living room",
        })
    }

    #[tokio::test]
    async fn outsiders_are_denied_before_validation() {
        let app = testing::app();
        let (_, host) = app.signup("host").await;
        let (_, outsider) = app.signup("outsider").await;
        let house = app.house(&host, 5).await;

        // Invalid range, but permission wins.
        let (status, body) = app
            .post(
                &format!("/houses/{}/events/create", house),
                &outsider,
                event("2024-12-08T22:00", "2024-12-08T19:00"),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["notice"]["message"], "Only house members can create events.");
        assert_eq!(body["redirect"], format!("/houses/{}", house));

        let (status, _) = app
            .get(&format!("/houses/{}/events/create", house), Some(&outsider))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn end_before_start_is_rejected() {
        let app = testing::app();
        let (_, host) = app.signup("host").await;
        let house = app.house(&host, 5).await;

        let (status, body) = app
            .post(
                &format!("/houses/{}/events/create", house),
                &host,
                event("2024-12-08T22:00", "2024-12-08T22:00"),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"]["__all__"][0], "End time must be after start time.");
    }

    #[tokio::test]
    async fn followers_see_house_events_in_calendar() {
        let app = testing::app();
        let (_, host) = app.signup("host").await;
        let (_, fan) = app.signup("fan").await;
        let house = app.house(&host, 5).await;

        let (status, ctx) = app
            .get(&format!("/houses/{}/events/create", house), Some(&host))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ctx["house"]["title"], "Neural Nexus");

        let (status, body) = app
            .post(
                &format!("/houses/{}/events/create", house),
                &host,
                event("2024-12-08T19:00", "2024-12-08T22:00"),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["notices"][0]["message"], "Event 'Demo Night' has been created!");
        assert_eq!(body["data"]["is_public"], true);

        let (_, calendar) = app.get("/events", Some(&fan)).await;
        assert!(calendar["events"].as_array().unwrap().is_empty());

        app.post(&format!("/houses/{}/follow", house), &fan, json!({})).await;
        let (_, calendar) = app.get("/events", Some(&fan)).await;
        let events = calendar["events"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["creator_username"], "host");
        assert_eq!(events[0]["house_title"], "Neural Nexus");

        let (status, calendar) = app.get("/events", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(calendar["events"].as_array().unwrap().is_empty());
    }
}
