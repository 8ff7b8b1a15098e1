use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE CHECK (length(username) > 0),
                email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password    TEXT NOT NULL,
                is_active   INTEGER NOT NULL DEFAULT 1,
                is_staff    INTEGER NOT NULL DEFAULT 0,
                date_joined TEXT NOT NULL
            );

            CREATE TABLE uploads (
                id           TEXT PRIMARY KEY,
                owner_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content_type TEXT NOT NULL,
                size         INTEGER NOT NULL,
                sha256       TEXT NOT NULL,
                created_at   TEXT NOT NULL
            );

            CREATE TABLE profiles (
                user_id      TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                display_name TEXT NOT NULL,
                bio          TEXT NOT NULL DEFAULT '',
                avatar_id    TEXT REFERENCES uploads(id) ON DELETE SET NULL,
                time_zone    TEXT NOT NULL DEFAULT 'UTC',
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );

            CREATE TABLE houses (
                id          TEXT PRIMARY KEY,
                host_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title       TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                address     TEXT NOT NULL,
                capacity    INTEGER NOT NULL CHECK (capacity > 0),
                is_active   INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_houses_host ON houses(host_id);

            CREATE TABLE house_members (
                house_id  TEXT NOT NULL REFERENCES houses(id) ON DELETE CASCADE,
                user_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                joined_at TEXT NOT NULL,
                PRIMARY KEY (house_id, user_id)
            );

            CREATE INDEX idx_house_members_user ON house_members(user_id);

            CREATE TABLE house_images (
                id          TEXT PRIMARY KEY,
                house_id    TEXT NOT NULL REFERENCES houses(id) ON DELETE CASCADE,
                upload_id   TEXT NOT NULL REFERENCES uploads(id) ON DELETE CASCADE,
                caption     TEXT NOT NULL DEFAULT '',
                uploaded_at TEXT NOT NULL
            );

            CREATE INDEX idx_house_images_house ON house_images(house_id);

            -- A follow points at exactly one user or one house.
            CREATE TABLE follows (
                id                 TEXT PRIMARY KEY,
                follower_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                following_user_id  TEXT REFERENCES users(id) ON DELETE CASCADE,
                following_house_id TEXT REFERENCES houses(id) ON DELETE CASCADE,
                created_at         TEXT NOT NULL,
                CONSTRAINT follow_exactly_one_target CHECK (
                    (following_user_id IS NOT NULL AND following_house_id IS NULL)
                    OR (following_user_id IS NULL AND following_house_id IS NOT NULL)
                ),
                CONSTRAINT follow_not_self CHECK (
                    following_user_id IS NULL OR following_user_id != follower_id
                )
            );

            CREATE UNIQUE INDEX unique_user_follow
                ON follows(follower_id, following_user_id)
                WHERE following_user_id IS NOT NULL;

            CREATE UNIQUE INDEX unique_house_follow
                ON follows(follower_id, following_house_id)
                WHERE following_house_id IS NOT NULL;

            CREATE INDEX idx_follows_user_target ON follows(following_user_id);
            CREATE INDEX idx_follows_house_target ON follows(following_house_id);

            CREATE TABLE events (
                id            TEXT PRIMARY KEY,
                title         TEXT NOT NULL,
                description   TEXT NOT NULL DEFAULT '',
                start_time    TEXT NOT NULL,
                end_time      TEXT NOT NULL,
                created_by    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                house_id      TEXT REFERENCES houses(id) ON DELETE SET NULL,
                location      TEXT NOT NULL,
                is_public     INTEGER NOT NULL DEFAULT 1,
                external_link TEXT,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            );

            CREATE INDEX idx_events_house ON events(house_id, start_time);

            CREATE TABLE revoked_tokens (
                jti        TEXT PRIMARY KEY,
                expires_at INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
