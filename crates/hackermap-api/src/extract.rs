use axum::{
    Json,
    extract::{
        FromRequest, Request,
        rejection::{BytesRejection, JsonRejection},
    },
    http::StatusCode,
};
use tracing::debug;

use hackermap_types::forms::{FormErrors, NON_FIELD_ERRORS};

use crate::error::{AppError, ErrorKind};

/// `Json` whose rejections render as an `AppError` instead of plain text.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {}", rejection.body_text());
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ErrorKind::PayloadTooLarge.into();
        }
        match rejection {
            JsonRejection::JsonDataError(err) => body_field_error(&err.body_text()).into(),
            JsonRejection::MissingJsonContentType(_) => {
                FormErrors::single(NON_FIELD_ERRORS, "Submit the form as JSON.").into()
            }
            _ => FormErrors::single(NON_FIELD_ERRORS, "The submitted form could not be read.").into(),
        }
    }
}

impl From<BytesRejection> for AppError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ErrorKind::PayloadTooLarge.into();
        }
        AppError::internal(format!("Failed to read request body: {}", rejection.body_text()))
    }
}

/// Turns a deserialization message into the field it is about. Messages look
/// like `...target type: missing field `title` at line 1 column 2` or
/// `...target type: capacity: invalid type: ...`.
fn body_field_error(text: &str) -> FormErrors {
    let detail = text.split_once("target type: ").map_or(text, |(_, rest)| rest);

    if let Some(rest) = detail.strip_prefix("missing field `") {
        if let Some((field, _)) = rest.split_once('`') {
            return FormErrors::single(field, "This field is required.");
        }
    }
    if let Some((path, _)) = detail.split_once(": ") {
        let is_field = !path.is_empty()
            && path.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if is_field {
            let field = path.split('.').next().unwrap_or(path);
            return FormErrors::single(field, "Enter a valid value.");
        }
    }
    FormErrors::single(NON_FIELD_ERRORS, "The submitted form could not be read.")
}
