use std::io::Write;
use std::path::{Path as FsPath, PathBuf};

use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, State, rejection::BytesRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use hackermap_db::StoreError;
use hackermap_db::models::UploadRow;
use hackermap_types::api::UploadResponse;
use hackermap_types::forms::FormErrors;

use crate::auth::AppState;
use crate::db_call;
use crate::error::{AppError, ErrorKind};
use crate::middleware::CurrentUser;

/// 5 MB limit for images
pub const MAX_UPLOAD_SIZE: usize = 5 * 1024 * 1024;

/// Identifies the image format from its leading bytes.
pub fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Writes `bytes` to `dir/name` through a temporary file in the same
/// directory, so a failed write never leaves a partial file behind.
fn write_upload(dir: &FsPath, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    let path = dir.join(name);
    tmp.persist(&path).map_err(|e| e.error)?;
    Ok(path)
}

/// POST /uploads. Accepts a raw image body, stores it under the uploads
/// directory and returns the id forms use to reference it.
pub async fn upload(
    State(state): State<AppState>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, AppError> {
    // Bodies over MAX_UPLOAD_SIZE are cut off by the route's body limit.
    let bytes = body?;
    if bytes.is_empty() {
        return Err(FormErrors::single("file", "The submitted file is empty.").into());
    }
    let content_type = sniff_image(&bytes).ok_or_else(|| {
        FormErrors::single(
            "file",
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
        )
    })?;

    let row = UploadRow {
        id: Uuid::new_v4(),
        owner_id: claims.sub,
        content_type: content_type.to_string(),
        size: bytes.len() as u64,
        sha256: hex::encode(Sha256::digest(&bytes)),
        created_at: Utc::now(),
    };

    let dir = state.uploads_dir.clone();
    let name = row.id.to_string();
    let file_path = tokio::task::spawn_blocking(move || write_upload(&dir, &name, &bytes))
        .await
        .map_err(AppError::internal)?
        .map_err(|e| AppError::internal(format!("Failed to store upload {}: {}", row.id, e)))?;

    let response = UploadResponse {
        id: row.id,
        content_type: row.content_type.clone(),
        size: row.size,
        sha256: row.sha256.clone(),
    };
    if let Err(e) = db_call(&state, move |db| db.insert_upload(&row)).await {
        if let Err(rm) = tokio::fs::remove_file(&file_path).await {
            warn!("Failed to remove orphaned upload {}: {}", file_path.display(), rm);
        }
        return Err(e);
    }

    info!("Stored upload {} ({} bytes) for {}", response.id, response.size, claims.username);
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /uploads/{upload_id}
pub async fn fetch(
    State(state): State<AppState>,
    Path(upload_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let row = db_call(&state, move |db| db.get_upload(upload_id))
        .await?
        .ok_or(StoreError::NotFound("upload"))?;

    let file_path = state.uploads_dir.join(row.id.to_string());
    let file = tokio::fs::File::open(&file_path).await.map_err(|e| {
        error!("Upload {} missing on disk: {}", row.id, e);
        AppError::from(ErrorKind::NotFound("upload"))
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, row.content_type),
            (header::CONTENT_LENGTH, row.size.to_string()),
            (header::ETAG, format!("\"{}\"", row.sha256)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    ))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::testing::{self, TestApp};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    async fn put_image(app: &TestApp, token: &str, bytes: impl Into<Bytes>) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/uploads")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(bytes.into()))
            .unwrap();
        let res = app.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let body = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[test]
    fn sniffs_supported_formats() {
        assert_eq!(sniff_image(PNG), Some("image/png"));
        assert_eq!(sniff_image(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_image(b"GIF89a...."), Some("image/gif"));
        assert_eq!(sniff_image(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_image(b"%PDF-1.7"), None);
        assert_eq!(sniff_image(b"RIFF"), None);
    }

    #[tokio::test]
    async fn upload_then_fetch() {
        let app = testing::app();
        let (_, token) = app.signup("host").await;

        let (status, body) = put_image(&app, &token, PNG).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["content_type"], "image/png");
        assert_eq!(body["size"], PNG.len());
        let id = body["id"].as_str().unwrap().to_string();

        let req = Request::builder().uri(format!("/uploads/{}", id)).body(Body::empty()).unwrap();
        let res = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], PNG);
    }

    #[tokio::test]
    async fn non_images_are_rejected() {
        let app = testing::app();
        let (_, token) = app.signup("host").await;

        let (status, body) = put_image(&app, &token, &b"just some text"[..]).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["fields"]["file"].is_array());
    }

    #[tokio::test]
    async fn oversized_uploads_get_a_json_error() {
        let app = testing::app();
        let (_, token) = app.signup("host").await;

        let mut bytes = PNG.to_vec();
        bytes.resize(MAX_UPLOAD_SIZE + 10, 0);
        let (status, body) = put_image(&app, &token, bytes).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "payload_too_large");
        assert_eq!(body["notice"]["message"], "That file is too large.");
        assert_eq!(body["redirect"], "/houses");
    }

    #[test]
    fn failed_writes_leave_no_partial_file() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("taken")).unwrap();

        assert!(write_upload(dir.path(), "taken", PNG).is_err());
        let path = write_upload(dir.path(), "stored", PNG).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), PNG);

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["stored", "taken"]);
    }

    #[tokio::test]
    async fn house_image_must_be_own_upload() {
        let app = testing::app();
        let (_, alice) = app.signup("alice").await;
        let (_, bob) = app.signup("bob").await;
        let (_, body) = put_image(&app, &alice, PNG).await;
        let upload = body["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .post(
                "/houses/new",
                &bob,
                json!({
                    "title": "Borrowed",
                    "address": "2 Main St",
                    "capacity": 4,
                    "house_image": upload,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"]["house_image"][0], "Upload a valid image.");

        let (status, body) = app
            .post(
                "/houses/new",
                &alice,
                json!({
                    "title": "Owned",
                    "address": "2 Main St",
                    "capacity": 4,
                    "house_image": upload,
                    "image_caption": "Front porch",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let house = body["data"]["id"].as_str().unwrap().to_string();

        let (_, detail) = app.get(&format!("/houses/{}", house), None).await;
        assert_eq!(detail["images"][0]["caption"], "Front porch");
        let image = detail["images"][0]["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .post(&format!("/houses/{}/images/{}/delete", house, image), &bob, json!({}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .post(&format!("/houses/{}/images/{}/delete", house, image), &alice, json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notices"][0]["message"], "Image deleted successfully!");
        assert_eq!(body["redirect"], format!("/houses/{}/edit", house));
    }
}
