use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use hackermap_db::StoreError;
use hackermap_types::api::{ErrorResponse, Notice};
use hackermap_types::error::Conflict;
use hackermap_types::forms::FormErrors;

use crate::paths;

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("permission denied")]
    PermissionDenied,

    #[error(transparent)]
    Conflict(Conflict),

    #[error("invalid input: {0}")]
    Invalid(FormErrors),

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("internal error")]
    Internal,
}

/// Every failure a handler can produce. Rendered as a status code, an error
/// code, a user-facing notice and a page to go back to.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct AppError {
    pub kind: ErrorKind,
    redirect: Option<String>,
    message: Option<String>,
}

impl AppError {
    pub fn internal(context: impl std::fmt::Display) -> Self {
        error!("Internal error: {}", context);
        ErrorKind::Internal.into()
    }

    /// Page to send the user back to. Missing resources and missing login
    /// keep their own destination.
    pub fn redirect_to(mut self, path: impl Into<String>) -> Self {
        if !matches!(self.kind, ErrorKind::NotFound(_) | ErrorKind::Unauthenticated) {
            self.redirect = Some(path.into());
        }
        self
    }

    /// Replaces the notice text for permission failures.
    pub fn denied_with(mut self, message: impl Into<String>) -> Self {
        if matches!(self.kind, ErrorKind::PermissionDenied) {
            self.message = Some(message.into());
        }
        self
    }

    fn status(&self) -> StatusCode {
        match &self.kind {
            ErrorKind::Unauthenticated | ErrorKind::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound(_) => StatusCode::NOT_FOUND,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::Conflict(_) => StatusCode::CONFLICT,
            ErrorKind::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match &self.kind {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::NotFound(_) => "not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Conflict(c) => c.code(),
            ErrorKind::Invalid(_) => "validation_error",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::Internal => "internal",
        }
    }

    fn default_notice(&self) -> Notice {
        match &self.kind {
            ErrorKind::Unauthenticated => Notice::info("Please log in to continue."),
            ErrorKind::InvalidCredentials => {
                Notice::error("Please enter a correct username and password.")
            }
            ErrorKind::NotFound(what) => Notice::error(format!("That {} does not exist.", what)),
            ErrorKind::PermissionDenied => {
                Notice::error("You don't have permission to do that.")
            }
            ErrorKind::Conflict(c) => conflict_notice(*c),
            ErrorKind::Invalid(errors) => Notice::error(
                errors.first_message().unwrap_or("Please correct the errors below."),
            ),
            ErrorKind::PayloadTooLarge => Notice::error("That file is too large."),
            ErrorKind::Internal => Notice::error("Something went wrong. Please try again."),
        }
    }

    fn default_redirect(&self) -> &'static str {
        match self.kind {
            ErrorKind::Unauthenticated | ErrorKind::InvalidCredentials => paths::LOGIN,
            _ => paths::HOUSES,
        }
    }
}

fn conflict_notice(conflict: Conflict) -> Notice {
    match conflict {
        Conflict::AlreadyMember => Notice::info("You are already a member of this house."),
        Conflict::NotMember => Notice::info("You are not a member of this house."),
        Conflict::HouseFull => Notice::warning("This house is at full capacity."),
        Conflict::HouseInactive => Notice::warning("This house is not accepting new members."),
        Conflict::IsHost => Notice::warning("As the host, you cannot leave your own house."),
        Conflict::SelfFollow => Notice::warning("You cannot follow yourself."),
        Conflict::UsernameTaken => Notice::error("A user with that username already exists."),
        Conflict::EmailTaken => Notice::error("A user with that email already exists."),
    }
}

impl From<ErrorKind> for AppError {
    fn from(kind: ErrorKind) -> Self {
        Self { kind, redirect: None, message: None }
    }
}

impl From<Conflict> for AppError {
    fn from(conflict: Conflict) -> Self {
        ErrorKind::Conflict(conflict).into()
    }
}

impl From<FormErrors> for AppError {
    fn from(errors: FormErrors) -> Self {
        ErrorKind::Invalid(errors).into()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ErrorKind::NotFound(what).into(),
            StoreError::PermissionDenied => ErrorKind::PermissionDenied.into(),
            StoreError::Conflict(c) => c.into(),
            StoreError::Invalid(errors) => errors.into(),
            other => AppError::internal(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code().to_string();
        let mut notice = self.default_notice();
        if let Some(message) = self.message.clone() {
            notice.message = message;
        }
        let redirect = self
            .redirect
            .clone()
            .unwrap_or_else(|| self.default_redirect().to_string());
        let fields = match self.kind {
            ErrorKind::Invalid(errors) => Some(errors),
            _ => None,
        };

        (
            status,
            Json(ErrorResponse { error: code, notice, redirect, fields }),
        )
            .into_response()
    }
}

/// Attaches the redirect target to a failed result.
pub trait ResultExt<T> {
    fn redirect_to(self, path: impl Into<String>) -> Result<T, AppError>;
    fn denied_with(self, message: impl Into<String>) -> Result<T, AppError>;
}

impl<T, E: Into<AppError>> ResultExt<T> for Result<T, E> {
    fn redirect_to(self, path: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| e.into().redirect_to(path))
    }

    fn denied_with(self, message: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| e.into().denied_with(message))
    }
}
