use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use hackermap_types::api::Claims;

use crate::auth::AppState;
use crate::db_call;
use crate::error::{AppError, ErrorKind};

/// Authenticated caller, inserted by `require_auth`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Claims);

/// Caller on public pages, if any. Inserted by `optional_auth`.
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<Claims>);

impl Viewer {
    pub fn user_id(&self) -> Option<uuid::Uuid> {
        self.0.as_ref().map(|c| c.sub)
    }
}

/// Decodes the bearer token and rejects revoked ones and those of
/// deactivated accounts.
async fn authenticate(state: &AppState, token: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Rejected token: {}", e);
        AppError::from(ErrorKind::Unauthenticated)
    })?;

    let (jti, sub) = (token_data.claims.jti, token_data.claims.sub);
    let (revoked, active) = db_call(state, move |db| {
        Ok((db.is_token_revoked(jti)?, db.is_user_active(sub)?))
    })
    .await?;
    if revoked {
        debug!("Rejected revoked token {}", jti);
        return Err(ErrorKind::Unauthenticated.into());
    }
    if !active {
        debug!("Rejected token {} of inactive user {}", jti, sub);
        return Err(ErrorKind::Unauthenticated.into());
    }
    Ok(token_data.claims)
}

/// Extract and validate JWT from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(auth) = bearer.ok_or(ErrorKind::Unauthenticated)?;
    let claims = authenticate(&state, auth.token()).await?;

    req.extensions_mut().insert(CurrentUser(claims));
    Ok(next.run(req).await)
}

/// Like `require_auth`, but lets anonymous and badly authenticated callers
/// through as an empty `Viewer`.
pub async fn optional_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Response {
    let claims = match bearer {
        Some(TypedHeader(auth)) => authenticate(&state, auth.token()).await.ok(),
        None => None,
    };

    req.extensions_mut().insert(Viewer(claims));
    next.run(req).await
}
