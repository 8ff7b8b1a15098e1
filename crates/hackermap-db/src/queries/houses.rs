use std::collections::HashMap;

use chrono::Utc;
use hackermap_types::forms::{HouseChanges, NewHouse, NewImage};
use hackermap_types::models::{House, HouseImage, HouseSummary, PublicUser};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::info;
use uuid::Uuid;

use super::users::{PUBLIC_USER_COLUMNS, public_user_from_row};
use super::{count, uploads::ensure_owned_upload, uuid_at};
use crate::{Database, Result, StoreError};

const HOUSE_COLUMNS: &str =
    "id, host_id, title, description, address, capacity, is_active, created_at, updated_at";

const IMAGE_COLUMNS: &str = "id, house_id, upload_id, caption, uploaded_at";

fn house_from_row(row: &Row<'_>) -> rusqlite::Result<House> {
    Ok(House {
        id: uuid_at(row, 0)?,
        host_id: uuid_at(row, 1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        address: row.get(4)?,
        capacity: row.get(5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<HouseImage> {
    Ok(HouseImage {
        id: uuid_at(row, 0)?,
        house_id: uuid_at(row, 1)?,
        image: uuid_at(row, 2)?,
        caption: row.get(3)?,
        uploaded_at: row.get(4)?,
    })
}

pub(crate) fn query_house(conn: &Connection, id: Uuid) -> Result<Option<House>> {
    let sql = format!("SELECT {} FROM houses WHERE id = ?1", HOUSE_COLUMNS);
    Ok(conn.query_row(&sql, [id.to_string()], house_from_row).optional()?)
}

pub(crate) fn require_house(conn: &Connection, id: Uuid) -> Result<House> {
    query_house(conn, id)?.ok_or(StoreError::NotFound("house"))
}

/// Loads the house and checks that `actor` hosts it.
pub(crate) fn require_host(conn: &Connection, house_id: Uuid, actor: Uuid) -> Result<House> {
    let house = require_house(conn, house_id)?;
    if house.host_id != actor {
        return Err(StoreError::PermissionDenied);
    }
    Ok(house)
}

pub(crate) fn member_count(conn: &Connection, house_id: Uuid) -> Result<u64> {
    count(
        conn,
        "SELECT COUNT(*) FROM house_members WHERE house_id = ?1",
        [house_id.to_string()],
    )
}

fn insert_house(conn: &Connection, host_id: Uuid, new: &NewHouse) -> Result<House> {
    let now = Utc::now();
    let house = House {
        id: Uuid::new_v4(),
        host_id,
        title: new.title.clone(),
        description: new.description.clone(),
        address: new.address.clone(),
        capacity: new.capacity,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO houses (id, host_id, title, description, address, capacity, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            house.id.to_string(),
            host_id.to_string(),
            house.title,
            house.description,
            house.address,
            house.capacity,
            house.is_active,
            now,
        ],
    )?;
    Ok(house)
}

fn insert_image(
    conn: &Connection,
    house_id: Uuid,
    uploader: Uuid,
    image: &NewImage,
    field: &str,
) -> Result<HouseImage> {
    ensure_owned_upload(conn, image.upload_id, uploader, field)?;
    let row = HouseImage {
        id: Uuid::new_v4(),
        house_id,
        image: image.upload_id,
        caption: image.caption.clone(),
        uploaded_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO house_images (id, house_id, upload_id, caption, uploaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            row.id.to_string(),
            house_id.to_string(),
            row.image.to_string(),
            row.caption,
            row.uploaded_at,
        ],
    )?;
    Ok(row)
}

fn query_images(conn: &Connection, house_id: Uuid) -> Result<Vec<HouseImage>> {
    let sql = format!(
        "SELECT {} FROM house_images WHERE house_id = ?1 ORDER BY uploaded_at",
        IMAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([house_id.to_string()], image_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn query_member_houses(conn: &Connection, user_id: Uuid) -> Result<Vec<HouseSummary>> {
    let mut stmt = conn.prepare_cached(
        "SELECT h.id, h.title FROM house_members m
         JOIN houses h ON h.id = m.house_id
         WHERE m.user_id = ?1
         ORDER BY m.joined_at",
    )?;
    let rows = stmt
        .query_map([user_id.to_string()], |row| {
            Ok(HouseSummary { id: uuid_at(row, 0)?, title: row.get(1)? })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl Database {
    /// Every house with its gallery, two queries total.
    pub fn list_houses_with_images(&self) -> Result<Vec<(House, Vec<HouseImage>)>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM houses ORDER BY created_at, id", HOUSE_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let houses = stmt
                .query_map([], house_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let sql = format!("SELECT {} FROM house_images ORDER BY uploaded_at", IMAGE_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let mut by_house: HashMap<Uuid, Vec<HouseImage>> = HashMap::new();
            for image in stmt.query_map([], image_from_row)? {
                let image = image?;
                by_house.entry(image.house_id).or_default().push(image);
            }

            Ok(houses
                .into_iter()
                .map(|house| {
                    let images = by_house.remove(&house.id).unwrap_or_default();
                    (house, images)
                })
                .collect())
        })
    }

    pub fn get_house(&self, id: Uuid) -> Result<Option<House>> {
        self.with_conn(|conn| query_house(conn, id))
    }

    pub fn get_house_summary(&self, id: Uuid) -> Result<Option<HouseSummary>> {
        Ok(self
            .get_house(id)?
            .map(|house| HouseSummary { id: house.id, title: house.title }))
    }

    /// Creates the house, attaches the optional first image and makes the
    /// host a member.
    pub fn create_house(&self, host_id: Uuid, new: &NewHouse) -> Result<House> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let house = insert_house(&tx, host_id, new)?;
            if let Some(image) = &new.image {
                insert_image(&tx, house.id, host_id, image, "house_image")?;
            }
            tx.execute(
                "INSERT INTO house_members (house_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                params![house.id.to_string(), host_id.to_string(), house.created_at],
            )?;
            tx.commit()?;

            info!("House {} '{}' created by {}", house.id, house.title, host_id);
            Ok(house)
        })
    }

    /// Bulk insert used by the seed command. Hosts are not added as members.
    pub fn seed_houses(&self, host_id: Uuid, houses: &[NewHouse]) -> Result<Vec<House>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let created = houses
                .iter()
                .map(|new| insert_house(&tx, host_id, new))
                .collect::<Result<Vec<_>>>()?;
            tx.commit()?;
            Ok(created)
        })
    }

    /// Host-only edit. A new image is appended to the gallery.
    pub fn update_house(
        &self,
        actor: Uuid,
        house_id: Uuid,
        changes: &HouseChanges,
    ) -> Result<(House, Option<HouseImage>)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut house = require_host(&tx, house_id, actor)?;

            let members = member_count(&tx, house_id)?;
            if u64::from(changes.capacity) < members {
                return Err(StoreError::invalid(
                    "capacity",
                    format!("Capacity cannot be lower than the current {} members.", members),
                ));
            }

            house.title = changes.title.clone();
            house.description = changes.description.clone();
            house.capacity = changes.capacity;
            house.updated_at = Utc::now();
            tx.execute(
                "UPDATE houses SET title = ?2, description = ?3, capacity = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    house_id.to_string(),
                    house.title,
                    house.description,
                    house.capacity,
                    house.updated_at,
                ],
            )?;

            let image = changes
                .image
                .as_ref()
                .map(|image| insert_image(&tx, house_id, actor, image, "new_image"))
                .transpose()?;

            tx.commit()?;
            Ok((house, image))
        })
    }

    /// Host-only. Images, memberships and follows go with the house; events
    /// stay but lose their house.
    pub fn delete_house(&self, actor: Uuid, house_id: Uuid) -> Result<House> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let house = require_host(&tx, house_id, actor)?;
            tx.execute("DELETE FROM houses WHERE id = ?1", [house_id.to_string()])?;
            tx.commit()?;

            info!("House {} '{}' deleted", house.id, house.title);
            Ok(house)
        })
    }

    pub fn list_images(&self, house_id: Uuid) -> Result<Vec<HouseImage>> {
        self.with_conn(|conn| query_images(conn, house_id))
    }

    /// Host-only. The image must belong to the house.
    pub fn delete_image(&self, actor: Uuid, house_id: Uuid, image_id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            require_host(&tx, house_id, actor)?;
            let deleted = tx.execute(
                "DELETE FROM house_images WHERE id = ?1 AND house_id = ?2",
                params![image_id.to_string(), house_id.to_string()],
            )?;
            if deleted == 0 {
                return Err(StoreError::NotFound("image"));
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn list_members(&self, house_id: Uuid) -> Result<Vec<PublicUser>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM house_members m
                 JOIN users u ON u.id = m.user_id
                 LEFT JOIN profiles p ON p.user_id = u.id
                 WHERE m.house_id = ?1
                 ORDER BY m.joined_at",
                PUBLIC_USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([house_id.to_string()], |row| public_user_from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Houses the user has joined, hosted ones included.
    pub fn member_houses(&self, user_id: Uuid) -> Result<Vec<HouseSummary>> {
        self.with_conn(|conn| query_member_houses(conn, user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testing;

    #[test]
    fn create_house_adds_host_as_member() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        let house = testing::house(&db, &host, 4);

        let members = db.list_members(house.id).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, host.id);
        assert_eq!(db.member_houses(host.id).unwrap()[0].id, house.id);
    }

    #[test]
    fn create_house_attaches_owned_image() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        let upload = testing::upload(&db, &host);

        let mut new = testing::new_house("Binary Bunker", 6);
        new.image = Some(NewImage { upload_id: upload, caption: "front".into() });
        let house = db.create_house(host.id, &new).unwrap();

        let images = db.list_images(house.id).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].image, upload);
        assert_eq!(images[0].caption, "front");
    }

    #[test]
    fn create_house_with_foreign_image_leaves_nothing_behind() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        let other = testing::user(&db, "other");
        let upload = testing::upload(&db, &other);

        let mut new = testing::new_house("Binary Bunker", 6);
        new.image = Some(NewImage { upload_id: upload, caption: String::new() });
        let err = db.create_house(host.id, &new).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(ref e) if e.has("house_image")));
        assert!(db.list_houses_with_images().unwrap().is_empty());
    }

    #[test]
    fn non_host_edit_is_denied_and_house_unchanged() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        let intruder = testing::user(&db, "intruder");
        let house = testing::house(&db, &host, 4);

        let changes = HouseChanges {
            title: "Taken over".into(),
            description: "mine now".into(),
            capacity: 40,
            image: None,
        };
        let err = db.update_house(intruder.id, house.id, &changes).unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied));

        let after = db.get_house(house.id).unwrap().unwrap();
        assert_eq!(after.title, house.title);
        assert_eq!(after.description, house.description);
        assert_eq!(after.capacity, house.capacity);
    }

    #[test]
    fn edit_appends_image_and_never_replaces_gallery() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        let first = testing::upload(&db, &host);
        let second = testing::upload(&db, &host);

        let mut new = testing::new_house("Silicon Loft", 6);
        new.image = Some(NewImage { upload_id: first, caption: String::new() });
        let house = db.create_house(host.id, &new).unwrap();

        let changes = HouseChanges {
            title: "Silicon Loft II".into(),
            description: String::new(),
            capacity: 8,
            image: Some(NewImage { upload_id: second, caption: "kitchen".into() }),
        };
        let (updated, added) = db.update_house(host.id, house.id, &changes).unwrap();
        assert_eq!(updated.title, "Silicon Loft II");
        assert_eq!(updated.capacity, 8);
        assert_eq!(added.unwrap().image, second);
        assert_eq!(db.list_images(house.id).unwrap().len(), 2);
    }

    #[test]
    fn capacity_cannot_drop_below_members() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        let guest = testing::user(&db, "guest");
        let house = testing::house(&db, &host, 4);
        db.join_house(house.id, guest.id).unwrap();

        let changes = HouseChanges {
            title: house.title.clone(),
            description: String::new(),
            capacity: 1,
            image: None,
        };
        let err = db.update_house(host.id, house.id, &changes).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(ref e) if e.has("capacity")));
    }

    #[test]
    fn delete_image_is_host_only_and_scoped_to_house() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        let guest = testing::user(&db, "guest");
        let upload = testing::upload(&db, &host);

        let mut new = testing::new_house("Data Den", 6);
        new.image = Some(NewImage { upload_id: upload, caption: String::new() });
        let house = db.create_house(host.id, &new).unwrap();
        let other = testing::house(&db, &host, 3);
        let image = db.list_images(house.id).unwrap().remove(0);

        let err = db.delete_image(guest.id, house.id, image.id).unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied));

        let err = db.delete_image(host.id, other.id, image.id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound("image")));

        db.delete_image(host.id, house.id, image.id).unwrap();
        assert!(db.list_images(house.id).unwrap().is_empty());
    }

    #[test]
    fn deleting_house_cascades_and_orphans_events() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        let fan = testing::user(&db, "fan");
        let upload = testing::upload(&db, &host);

        let mut new = testing::new_house("Crypto Manor", 6);
        new.image = Some(NewImage { upload_id: upload, caption: String::new() });
        let house = db.create_house(host.id, &new).unwrap();
        db.toggle_follow(fan.id, hackermap_types::models::FollowTarget::House(house.id))
            .unwrap();
        let event = db.create_event(host.id, house.id, &testing::new_event()).unwrap();

        assert!(matches!(
            db.delete_house(fan.id, house.id).unwrap_err(),
            StoreError::PermissionDenied
        ));
        db.delete_house(host.id, house.id).unwrap();

        assert!(db.get_house(house.id).unwrap().is_none());
        assert!(db.list_images(house.id).unwrap().is_empty());
        assert!(db.member_houses(host.id).unwrap().is_empty());
        assert_eq!(db.profile_stats(fan.id).unwrap().following_count, 0);
        assert_eq!(db.get_event(event.id).unwrap().unwrap().house_id, None);
    }

    #[test]
    fn seeded_houses_have_no_members() {
        let db = testing::db();
        let host = testing::user(&db, "sample_host");
        let houses = db
            .seed_houses(host.id, &[testing::new_house("A", 4), testing::new_house("B", 5)])
            .unwrap();
        assert_eq!(houses.len(), 2);
        assert!(db.list_members(houses[0].id).unwrap().is_empty());
    }
}
