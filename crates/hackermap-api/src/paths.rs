//! Redirect targets handed back to the client.

use uuid::Uuid;

pub const LOGIN: &str = "/login";
pub const HOUSES: &str = "/houses";
pub const EVENTS: &str = "/events";

pub fn house(id: Uuid) -> String {
    format!("/houses/{}", id)
}

pub fn edit_house(id: Uuid) -> String {
    format!("/houses/{}/edit", id)
}

pub fn user(id: Uuid) -> String {
    format!("/users/{}", id)
}

/// Profile link that remembers which house page the visitor came from.
/// Anything that is not a house id is dropped.
pub fn user_from_house(id: Uuid, from_house: Option<&str>) -> String {
    match from_house.and_then(|h| h.parse::<Uuid>().ok()) {
        Some(house) => format!("/users/{}?from_house={}", id, house),
        None => user(id),
    }
}
