use std::path::PathBuf;
use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};
use uuid::Uuid;

use hackermap_db::Database;
use hackermap_types::api::{Claims, LoginRequest, LoginResponse, Notice};
use hackermap_types::forms::CreateAccountForm;

use crate::error::{AppError, ErrorKind};
use crate::extract::AppJson;
use crate::middleware::CurrentUser;
use crate::{action, db_call, paths};

/// Lifetime of an issued token.
const TOKEN_TTL_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub uploads_dir: PathBuf,
    pub argon2: Argon2<'static>,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: String, uploads_dir: PathBuf) -> Self {
        Self { db, jwt_secret, uploads_dir, argon2: Argon2::default() }
    }
}

/// Argon2id hash in PHC string format.
pub fn hash_password(argon2: &Argon2<'_>, password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

fn verify_password(argon2: &Argon2<'_>, password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| argon2.verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

/// POST /create_account
pub async fn create_account(
    State(state): State<AppState>,
    AppJson(form): AppJson<CreateAccountForm>,
) -> Result<impl IntoResponse, AppError> {
    let account = form.validate()?;

    let hasher = state.clone();
    let password = account.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&hasher.argon2, &password))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::internal)?;

    let user = db_call(&state, move |db| {
        db.create_user(&account.username, &account.email, &password_hash)
    })
    .await?;

    info!("Account created for {} ({})", user.username, user.id);
    Ok((
        StatusCode::CREATED,
        Json(action(
            Notice::success("Your account has been created. Please log in."),
            paths::LOGIN,
        )),
    ))
}

/// POST /login. Accepts a username or an email address.
pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let login = req.username.trim().to_string();
    let row = db_call(&state, move |db| db.find_login(&login))
        .await?
        .ok_or(ErrorKind::InvalidCredentials)?;

    let verifier = state.clone();
    let hash = row.password.clone();
    let valid = tokio::task::spawn_blocking(move || {
        verify_password(&verifier.argon2, &req.password, &hash)
    })
    .await
    .map_err(AppError::internal)?;

    if !valid {
        warn!("Failed login for {}", row.user.username);
        return Err(ErrorKind::InvalidCredentials.into());
    }
    if !row.user.is_active {
        warn!("Login attempt for inactive account {}", row.user.username);
        return Err(ErrorKind::InvalidCredentials.into());
    }

    let token = create_token(&state.jwt_secret, row.user.id, &row.user.username)
        .map_err(AppError::internal)?;

    Ok(Json(LoginResponse {
        user_id: row.user.id,
        username: row.user.username,
        token,
    }))
}

/// POST /logout. The token stays revoked until it would have expired anyway.
pub async fn logout(
    State(state): State<AppState>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let jti = claims.jti;
    let expires_at = claims.exp as i64;
    db_call(&state, move |db| db.revoke_token(jti, expires_at)).await?;

    info!("User {} logged out", claims.username);
    Ok(Json(action(Notice::info("You have been logged out."), paths::LOGIN)))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        jti: Uuid::new_v4(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
