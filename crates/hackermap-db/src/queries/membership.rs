use chrono::Utc;
use hackermap_types::error::Conflict;
use hackermap_types::models::House;
use rusqlite::{Connection, TransactionBehavior, params};
use tracing::debug;
use uuid::Uuid;

use super::exists;
use super::houses::{member_count, require_house};
use crate::models::HouseRole;
use crate::{Database, Result};

pub(crate) fn is_member(conn: &Connection, house_id: Uuid, user_id: Uuid) -> Result<bool> {
    exists(
        conn,
        "SELECT EXISTS(SELECT 1 FROM house_members WHERE house_id = ?1 AND user_id = ?2)",
        params![house_id.to_string(), user_id.to_string()],
    )
}

pub(crate) fn query_role(conn: &Connection, house: &House, user_id: Uuid) -> Result<HouseRole> {
    Ok(HouseRole {
        is_host: house.host_id == user_id,
        is_member: is_member(conn, house.id, user_id)?,
    })
}

impl Database {
    /// Returns the house together with how `user_id` relates to it.
    pub fn house_role(&self, house_id: Uuid, user_id: Uuid) -> Result<(House, HouseRole)> {
        self.with_conn(|conn| {
            let house = require_house(conn, house_id)?;
            let role = query_role(conn, &house, user_id)?;
            Ok((house, role))
        })
    }

    pub fn member_count(&self, house_id: Uuid) -> Result<u64> {
        self.with_conn(|conn| member_count(conn, house_id))
    }

    /// Adds `user_id` to the house. Membership, capacity and the active flag
    /// are checked in that order, inside the same write transaction as the
    /// insert.
    pub fn join_house(&self, house_id: Uuid, user_id: Uuid) -> Result<House> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let house = require_house(&tx, house_id)?;

            if is_member(&tx, house_id, user_id)? {
                return Err(Conflict::AlreadyMember.into());
            }
            if member_count(&tx, house_id)? >= u64::from(house.capacity) {
                return Err(Conflict::HouseFull.into());
            }
            if !house.is_active {
                return Err(Conflict::HouseInactive.into());
            }

            tx.execute(
                "INSERT INTO house_members (house_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                params![house_id.to_string(), user_id.to_string(), Utc::now()],
            )?;
            tx.commit()?;

            debug!("User {} joined house {}", user_id, house_id);
            Ok(house)
        })
    }

    /// Removes `user_id` from the house. Hosts cannot leave.
    pub fn leave_house(&self, house_id: Uuid, user_id: Uuid) -> Result<House> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let house = require_house(&tx, house_id)?;

            if house.host_id == user_id {
                return Err(Conflict::IsHost.into());
            }
            let removed = tx.execute(
                "DELETE FROM house_members WHERE house_id = ?1 AND user_id = ?2",
                params![house_id.to_string(), user_id.to_string()],
            )?;
            if removed == 0 {
                return Err(Conflict::NotMember.into());
            }
            tx.commit()?;

            debug!("User {} left house {}", user_id, house_id);
            Ok(house)
        })
    }

    /// Admin-style switch; inactive houses refuse new members.
    pub fn set_house_active(&self, house_id: Uuid, active: bool) -> Result<()> {
        self.with_conn(|conn| {
            require_house(conn, house_id)?;
            conn.execute(
                "UPDATE houses SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
                params![house_id.to_string(), active, Utc::now()],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;
    use crate::queries::testing;

    fn conflict(err: StoreError) -> Conflict {
        match err {
            StoreError::Conflict(c) => c,
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn capacity_two_admits_two_then_rejects() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        let house = db
            .seed_houses(host.id, &[testing::new_house("Code Hub", 2)])
            .unwrap()
            .remove(0);
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let c = testing::user(&db, "c");

        assert_eq!(db.member_count(house.id).unwrap(), 0);
        db.join_house(house.id, a.id).unwrap();
        db.join_house(house.id, b.id).unwrap();
        assert_eq!(conflict(db.join_house(house.id, c.id).unwrap_err()), Conflict::HouseFull);
        assert_eq!(db.member_count(house.id).unwrap(), 2);
    }

    #[test]
    fn member_count_never_exceeds_capacity() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        for capacity in 1..=4u32 {
            let house = testing::house(&db, &host, capacity);
            for i in 0..6 {
                let user = testing::user(&db, &format!("u{}_{}", capacity, i));
                let _ = db.join_house(house.id, user.id);
                assert!(db.member_count(house.id).unwrap() <= u64::from(capacity));
            }
        }
    }

    #[test]
    fn host_cannot_leave_but_member_can() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        let member = testing::user(&db, "member");
        let house = testing::house(&db, &host, 5);

        assert_eq!(conflict(db.leave_house(house.id, host.id).unwrap_err()), Conflict::IsHost);

        db.join_house(house.id, member.id).unwrap();
        db.leave_house(house.id, member.id).unwrap();
        assert_eq!(conflict(db.leave_house(house.id, member.id).unwrap_err()), Conflict::NotMember);
    }

    #[test]
    fn repeated_failures_change_nothing() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        let member = testing::user(&db, "member");
        let house = testing::house(&db, &host, 5);
        db.join_house(house.id, member.id).unwrap();

        for _ in 0..3 {
            assert_eq!(
                conflict(db.join_house(house.id, member.id).unwrap_err()),
                Conflict::AlreadyMember
            );
            assert_eq!(conflict(db.leave_house(house.id, host.id).unwrap_err()), Conflict::IsHost);
        }
        assert_eq!(db.member_count(house.id).unwrap(), 2);
    }

    #[test]
    fn already_member_is_reported_before_full_and_inactive() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        let house = testing::house(&db, &host, 1);
        db.set_house_active(house.id, false).unwrap();

        assert_eq!(
            conflict(db.join_house(house.id, host.id).unwrap_err()),
            Conflict::AlreadyMember
        );

        let guest = testing::user(&db, "guest");
        assert_eq!(conflict(db.join_house(house.id, guest.id).unwrap_err()), Conflict::HouseFull);
    }

    #[test]
    fn inactive_house_refuses_members() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        let guest = testing::user(&db, "guest");
        let house = testing::house(&db, &host, 5);
        db.set_house_active(house.id, false).unwrap();

        assert_eq!(
            conflict(db.join_house(house.id, guest.id).unwrap_err()),
            Conflict::HouseInactive
        );
    }

    #[test]
    fn role_reflects_host_and_membership() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        let guest = testing::user(&db, "guest");
        let house = testing::house(&db, &host, 5);

        let (_, role) = db.house_role(house.id, host.id).unwrap();
        assert!(role.is_host && role.is_member);

        let (_, role) = db.house_role(house.id, guest.id).unwrap();
        assert!(!role.can_post_events());

        assert!(matches!(
            db.house_role(Uuid::new_v4(), guest.id).unwrap_err(),
            StoreError::NotFound("house")
        ));
    }
}
