use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::Context;
use tracing::{info, warn};

/// Placeholder JWT secrets that should never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub jwt_secret: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret: String = try_load("HACKERMAP_JWT_SECRET", DEFAULT_JWT_SECRET)?;
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            warn!("HACKERMAP_JWT_SECRET is unset or still a placeholder; tokens are forgeable");
        }

        Ok(Self {
            host: try_load("HACKERMAP_HOST", "0.0.0.0")?,
            port: try_load("HACKERMAP_PORT", "3000")?,
            db_path: try_load("HACKERMAP_DB_PATH", "hackermap.db")?,
            uploads_dir: try_load("HACKERMAP_UPLOADS_DIR", "./uploads")?,
            jwt_secret,
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Invalid {key} value: {raw}"))
}
