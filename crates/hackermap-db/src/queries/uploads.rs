use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use super::{exists, uuid_at};
use crate::models::UploadRow;
use crate::{Database, Result, StoreError};

/// Fails with a field error unless `upload_id` names an upload owned by
/// `owner_id`.
pub(crate) fn ensure_owned_upload(
    conn: &Connection,
    upload_id: Uuid,
    owner_id: Uuid,
    field: &str,
) -> Result<()> {
    let owned = exists(
        conn,
        "SELECT EXISTS(SELECT 1 FROM uploads WHERE id = ?1 AND owner_id = ?2)",
        params![upload_id.to_string(), owner_id.to_string()],
    )?;
    if !owned {
        return Err(StoreError::invalid(field, "Upload a valid image."));
    }
    Ok(())
}

impl Database {
    pub fn insert_upload(&self, upload: &UploadRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO uploads (id, owner_id, content_type, size, sha256, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    upload.id.to_string(),
                    upload.owner_id.to_string(),
                    upload.content_type,
                    upload.size as i64,
                    upload.sha256,
                    upload.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_upload(&self, id: Uuid) -> Result<Option<UploadRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, owner_id, content_type, size, sha256, created_at
                     FROM uploads WHERE id = ?1",
                    [id.to_string()],
                    |row| {
                        Ok(UploadRow {
                            id: uuid_at(row, 0)?,
                            owner_id: uuid_at(row, 1)?,
                            content_type: row.get(2)?,
                            size: row.get::<_, i64>(3)? as u64,
                            sha256: row.get(4)?,
                            created_at: row.get(5)?,
                        })
                    },
                )
                .optional()?)
        })
    }
}
