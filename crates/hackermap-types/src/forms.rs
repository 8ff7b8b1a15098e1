//! Input forms and their validation.
//!
//! Each form deserializes straight from a request body and is turned into a
//! cleaned value by `validate`. All problems are collected before returning
//! so the client can show every field error at once.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Key used for errors that concern more than one field.
pub const NON_FIELD_ERRORS: &str = "__all__";

/// `datetime-local` input format.
pub const DATETIME_INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";

const MIN_PASSWORD_LENGTH: usize = 8;

/// Field name -> messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// First message, for one-line notices.
    pub fn first_message(&self) -> Option<&str> {
        self.0.get(NON_FIELD_ERRORS)
            .or_else(|| self.0.values().next())
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, FormErrors> {
        if self.is_empty() { Ok(value()) } else { Err(self) }
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FormErrors {}

/// Describes one input so a client can render the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    TextArea,
    Number,
    DateTime,
    Checkbox,
    Url,
    Image,
}

const fn field(name: &'static str, label: &'static str, kind: FieldKind, required: bool) -> FieldSpec {
    FieldSpec { name, label, kind, required }
}

// -- Field helpers --

fn required_text(errors: &mut FormErrors, field: &str, value: &str, max_chars: usize) -> String {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, "This field is required.");
    } else {
        max_length(errors, field, value, max_chars);
    }
    value.to_string()
}

fn optional_text(errors: &mut FormErrors, field: &str, value: &str, max_chars: usize) -> String {
    let value = value.trim();
    max_length(errors, field, value, max_chars);
    value.to_string()
}

fn max_length(errors: &mut FormErrors, field: &str, value: &str, max_chars: usize) {
    let len = value.chars().count();
    if len > max_chars {
        errors.add(
            field,
            format!("Ensure this value has at most {} characters (it has {}).", max_chars, len),
        );
    }
}

fn positive_capacity(errors: &mut FormErrors, field: &str, value: i64) -> u32 {
    if value < 1 {
        errors.add(field, "Ensure this value is greater than or equal to 1.");
        return 0;
    }
    u32::try_from(value).unwrap_or_else(|_| {
        errors.add(field, format!("Ensure this value is less than or equal to {}.", u32::MAX));
        0
    })
}

fn parse_datetime(errors: &mut FormErrors, field: &str, value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, "This field is required.");
        return None;
    }
    match NaiveDateTime::parse_from_str(value, DATETIME_INPUT_FORMAT) {
        Ok(naive) => Some(naive.and_utc()),
        Err(_) => {
            errors.add(field, "Enter a valid date/time.");
            None
        }
    }
}

pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() || local.chars().any(|c| c.is_whitespace() || c == '@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}

/// Lowercases the domain part, leaving the local part as typed.
pub fn normalize_email(email: &str) -> String {
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

fn is_web_url(value: &str) -> bool {
    Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

// -- Accounts --

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountForm {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl CreateAccountForm {
    pub fn validate(self) -> Result<NewAccount, FormErrors> {
        let mut errors = FormErrors::new();

        let username = required_text(&mut errors, "username", &self.username, 150);
        if !username.is_empty() && !is_valid_username(&username) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }

        let email = required_text(&mut errors, "email", &self.email, 254);
        if !email.is_empty() && !is_valid_email(&email) {
            errors.add("email", "Enter a valid email address.");
        }

        if self.password1.is_empty() {
            errors.add("password1", "This field is required.");
        }
        if self.password2.is_empty() {
            errors.add("password2", "This field is required.");
        }
        if !self.password1.is_empty() && !self.password2.is_empty() {
            if self.password1 != self.password2 {
                errors.add("password2", "The two password fields didn't match.");
            } else {
                let password = &self.password1;
                if password.chars().count() < MIN_PASSWORD_LENGTH {
                    errors.add(
                        "password2",
                        format!(
                            "This password is too short. It must contain at least {} characters.",
                            MIN_PASSWORD_LENGTH
                        ),
                    );
                }
                if password.chars().all(|c| c.is_ascii_digit()) {
                    errors.add("password2", "This password is entirely numeric.");
                }
                if !username.is_empty() && password.eq_ignore_ascii_case(&username) {
                    errors.add("password2", "The password is too similar to the username.");
                }
            }
        }

        let password = self.password1;
        errors.finish(|| NewAccount {
            username,
            email: normalize_email(&email),
            password,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileForm {
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default)]
    pub avatar: Option<Uuid>,
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone)]
pub struct ProfileChanges {
    pub display_name: String,
    pub bio: String,
    pub time_zone: String,
    pub avatar: Option<Uuid>,
}

impl ProfileForm {
    pub fn validate(self) -> Result<ProfileChanges, FormErrors> {
        let mut errors = FormErrors::new();
        let display_name = required_text(&mut errors, "display_name", &self.display_name, 150);
        let time_zone = required_text(&mut errors, "time_zone", &self.time_zone, 50);
        let bio = self.bio.trim().to_string();
        let avatar = self.avatar;
        errors.finish(|| ProfileChanges { display_name, bio, time_zone, avatar })
    }
}

// -- Houses --

/// Gallery image to attach, referencing an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    pub upload_id: Uuid,
    pub caption: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HouseCreateForm {
    pub title: String,
    pub address: String,
    #[serde(default)]
    pub description: String,
    pub capacity: i64,
    #[serde(default)]
    pub house_image: Option<Uuid>,
    #[serde(default)]
    pub image_caption: String,
}

#[derive(Debug, Clone)]
pub struct NewHouse {
    pub title: String,
    pub address: String,
    pub description: String,
    pub capacity: u32,
    pub image: Option<NewImage>,
}

impl HouseCreateForm {
    pub fn schema() -> Vec<FieldSpec> {
        vec![
            field("title", "House Name", FieldKind::Text, true),
            field("address", "Address", FieldKind::Text, true),
            field("description", "Description", FieldKind::TextArea, false),
            field("capacity", "Member Capacity", FieldKind::Number, true),
            field("house_image", "House Image", FieldKind::Image, false),
            field("image_caption", "Image Caption", FieldKind::Text, false),
        ]
    }

    pub fn validate(self) -> Result<NewHouse, FormErrors> {
        let mut errors = FormErrors::new();
        let title = required_text(&mut errors, "title", &self.title, 255);
        let address = required_text(&mut errors, "address", &self.address, 255);
        let description = self.description.trim().to_string();
        let capacity = positive_capacity(&mut errors, "capacity", self.capacity);
        let caption = optional_text(&mut errors, "image_caption", &self.image_caption, 255);
        let image = self.house_image.map(|upload_id| NewImage { upload_id, caption });

        errors.finish(|| NewHouse { title, address, description, capacity, image })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HouseEditForm {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub capacity: i64,
    #[serde(default)]
    pub new_image: Option<Uuid>,
    #[serde(default)]
    pub image_caption: String,
}

#[derive(Debug, Clone)]
pub struct HouseChanges {
    pub title: String,
    pub description: String,
    pub capacity: u32,
    pub image: Option<NewImage>,
}

impl HouseEditForm {
    pub fn schema() -> Vec<FieldSpec> {
        vec![
            field("title", "House Name", FieldKind::Text, true),
            field("description", "Description", FieldKind::TextArea, false),
            field("capacity", "Member Capacity", FieldKind::Number, true),
            field("new_image", "Add New Image", FieldKind::Image, false),
            field("image_caption", "Image Caption", FieldKind::Text, false),
        ]
    }

    pub fn validate(self) -> Result<HouseChanges, FormErrors> {
        let mut errors = FormErrors::new();
        let title = required_text(&mut errors, "title", &self.title, 255);
        let description = self.description.trim().to_string();
        let capacity = positive_capacity(&mut errors, "capacity", self.capacity);
        let caption = optional_text(&mut errors, "image_caption", &self.image_caption, 255);
        let image = self.new_image.map(|upload_id| NewImage { upload_id, caption });

        errors.finish(|| HouseChanges { title, description, capacity, image })
    }
}

// -- Events --

#[derive(Debug, Clone, Deserialize)]
pub struct EventCreateForm {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_time: String,
    pub end_time: String,
    pub location: String,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    pub partiful_link: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: String,
    pub is_public: bool,
    pub external_link: Option<String>,
}

impl EventCreateForm {
    pub fn schema() -> Vec<FieldSpec> {
        vec![
            field("title", "Event Title", FieldKind::Text, true),
            field("description", "Description", FieldKind::TextArea, false),
            field("start_time", "Start Time", FieldKind::DateTime, true),
            field("end_time", "End Time", FieldKind::DateTime, true),
            field("location", "Location", FieldKind::Text, true),
            field("is_public", "Public Event", FieldKind::Checkbox, false),
            field("partiful_link", "Partiful Link (optional)", FieldKind::Url, false),
        ]
    }

    pub fn validate(self) -> Result<NewEvent, FormErrors> {
        let mut errors = FormErrors::new();
        let title = required_text(&mut errors, "title", &self.title, 255);
        let description = self.description.trim().to_string();
        let start_time = parse_datetime(&mut errors, "start_time", &self.start_time);
        let end_time = parse_datetime(&mut errors, "end_time", &self.end_time);
        let location = required_text(&mut errors, "location", &self.location, 255);

        let link = optional_text(&mut errors, "partiful_link", &self.partiful_link, 200);
        if !link.is_empty() && !is_web_url(&link) {
            errors.add("partiful_link", "Enter a valid URL.");
        }

        if let (Some(start), Some(end)) = (start_time, end_time) {
            if end <= start {
                errors.add(NON_FIELD_ERRORS, "End time must be after start time.");
            }
        }

        match (start_time, end_time) {
            (Some(start_time), Some(end_time)) if errors.is_empty() => Ok(NewEvent {
                title,
                description,
                start_time,
                end_time,
                location,
                is_public: self.is_public,
                external_link: (!link.is_empty()).then_some(link),
            }),
            _ => Err(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_form(start: &str, end: &str) -> EventCreateForm {
        EventCreateForm {
            title: "Demo night".into(),
            description: String::new(),
            start_time: start.into(),
            end_time: end.into(),
            location: "Living room".into(),
            is_public: true,
            partiful_link: String::new(),
        }
    }

    #[test]
    fn event_end_must_follow_start() {
        let errors = event_form("2024-12-08T19:00", "2024-12-08T19:00").validate().unwrap_err();
        assert_eq!(errors.get(NON_FIELD_ERRORS), ["End time must be after start time."]);

        let errors = event_form("2024-12-08T19:00", "2024-12-08T18:59").validate().unwrap_err();
        assert!(errors.has(NON_FIELD_ERRORS));

        let event = event_form("2024-12-08T19:00", "2024-12-08T21:30").validate().unwrap();
        assert!(event.end_time > event.start_time);
        assert_eq!(event.external_link, None);
    }

    #[test]
    fn event_rejects_bad_datetime_and_link() {
        let mut form = event_form("tomorrow", "2024-12-08T21:30");
        form.partiful_link = "ftp://partiful.com/e/1".into();
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("start_time"), ["Enter a valid date/time."]);
        assert_eq!(errors.get("partiful_link"), ["Enter a valid URL."]);
        assert!(!errors.has(NON_FIELD_ERRORS));
    }

    #[test]
    fn event_keeps_valid_link() {
        let mut form = event_form("2024-12-08T19:00", "2024-12-08T21:30");
        form.partiful_link = " https://partiful.com/e/abc ".into();
        let event = form.validate().unwrap();
        assert_eq!(event.external_link.as_deref(), Some("https://partiful.com/e/abc"));
    }

    #[test]
    fn house_capacity_must_be_positive() {
        let form = HouseCreateForm {
            title: "Quantum Loft".into(),
            address: "100 Market St, San Francisco".into(),
            description: String::new(),
            capacity: 0,
            house_image: None,
            image_caption: String::new(),
        };
        let errors = form.clone().validate().unwrap_err();
        assert!(errors.has("capacity"));

        let house = HouseCreateForm { capacity: 6, ..form }.validate().unwrap();
        assert_eq!(house.capacity, 6);
        assert!(house.image.is_none());
    }

    #[test]
    fn house_edit_requires_title() {
        let form = HouseEditForm {
            title: "   ".into(),
            description: "cozy".into(),
            capacity: -3,
            new_image: Some(Uuid::new_v4()),
            image_caption: "x".repeat(256),
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("title"), ["This field is required."]);
        assert!(errors.has("capacity"));
        assert!(errors.has("image_caption"));
    }

    #[test]
    fn account_passwords_must_match() {
        let form = CreateAccountForm {
            username: "ada".into(),
            email: "ada@Example.COM".into(),
            password1: "correct horse".into(),
            password2: "correct horsf".into(),
        };
        let errors = form.clone().validate().unwrap_err();
        assert_eq!(errors.get("password2"), ["The two password fields didn't match."]);

        let account = CreateAccountForm { password2: "correct horse".into(), ..form }
            .validate()
            .unwrap();
        assert_eq!(account.email, "ada@example.com");
    }

    #[test]
    fn account_rejects_weak_password_and_bad_identity() {
        let errors = CreateAccountForm {
            username: "bad name!".into(),
            email: "not-an-email".into(),
            password1: "1234".into(),
            password2: "1234".into(),
        }
        .validate()
        .unwrap_err();
        assert!(errors.has("username"));
        assert!(errors.has("email"));
        assert_eq!(errors.get("password2").len(), 2);
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("host@example.com"));
        assert!(is_valid_email("first.last+tag@mail.example.org"));
        assert!(!is_valid_email("host@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("host@-example.com"));
    }
}
