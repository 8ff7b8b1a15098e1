use chrono::Utc;
use hackermap_types::forms::{NON_FIELD_ERRORS, NewEvent};
use hackermap_types::models::{Event, FeedEvent};
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};
use tracing::info;
use uuid::Uuid;

use super::houses::require_house;
use super::membership::query_role;
use super::{opt_uuid_at, uuid_at};
use crate::{Database, Result, StoreError};

const EVENT_COLUMNS: &str = "e.id, e.title, e.description, e.start_time, e.end_time, e.created_by, \
     e.house_id, e.location, e.is_public, e.external_link, e.created_at, e.updated_at";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: uuid_at(row, 0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        created_by: uuid_at(row, 5)?,
        house_id: opt_uuid_at(row, 6)?,
        location: row.get(7)?,
        is_public: row.get(8)?,
        external_link: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl Database {
    /// Creates an event for a house. Only the host and members may post;
    /// permission is checked before the time range.
    pub fn create_event(&self, actor: Uuid, house_id: Uuid, new: &NewEvent) -> Result<Event> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let house = require_house(&tx, house_id)?;
            if !query_role(&tx, &house, actor)?.can_post_events() {
                return Err(StoreError::PermissionDenied);
            }
            if new.end_time <= new.start_time {
                return Err(StoreError::invalid(
                    NON_FIELD_ERRORS,
                    "End time must be after start time.",
                ));
            }

            let now = Utc::now();
            let event = Event {
                id: Uuid::new_v4(),
                title: new.title.clone(),
                description: new.description.clone(),
                start_time: new.start_time,
                end_time: new.end_time,
                created_by: actor,
                house_id: Some(house_id),
                location: new.location.clone(),
                is_public: new.is_public,
                external_link: new.external_link.clone(),
                created_at: now,
                updated_at: now,
            };
            tx.execute(
                "INSERT INTO events (id, title, description, start_time, end_time, created_by,
                                     house_id, location, is_public, external_link, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                params![
                    event.id.to_string(),
                    event.title,
                    event.description,
                    event.start_time,
                    event.end_time,
                    actor.to_string(),
                    house_id.to_string(),
                    event.location,
                    event.is_public,
                    event.external_link,
                    now,
                ],
            )?;
            tx.commit()?;

            info!("Event {} '{}' created for house {}", event.id, event.title, house_id);
            Ok(event)
        })
    }

    pub fn get_event(&self, id: Uuid) -> Result<Option<Event>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM events e WHERE e.id = ?1", EVENT_COLUMNS);
            Ok(conn.query_row(&sql, [id.to_string()], event_from_row).optional()?)
        })
    }

    pub fn house_events(&self, house_id: Uuid) -> Result<Vec<Event>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM events e WHERE e.house_id = ?1 ORDER BY e.start_time",
                EVENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([house_id.to_string()], event_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Calendar for `user_id`: events of every house the user follows.
    pub fn event_feed(&self, user_id: Uuid) -> Result<Vec<FeedEvent>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, u.username, h.title FROM events e
                 JOIN users u ON u.id = e.created_by
                 LEFT JOIN houses h ON h.id = e.house_id
                 WHERE e.house_id IN (
                     SELECT following_house_id FROM follows
                     WHERE follower_id = ?1 AND following_house_id IS NOT NULL
                 )
                 ORDER BY e.start_time",
                EVENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(FeedEvent {
                        event: event_from_row(row)?,
                        creator_username: row.get(12)?,
                        house_title: row.get(13)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
