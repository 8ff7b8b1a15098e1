use chrono::{DateTime, Utc};
use hackermap_types::error::Conflict;
use hackermap_types::models::{Follow, FollowTarget, FollowedUser, ProfileStats};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::debug;
use uuid::Uuid;

use super::houses::{query_house, query_member_houses};
use super::users::{PUBLIC_USER_COLUMNS, public_user_from_row, user_exists};
use super::{count, opt_uuid_at, uuid_at};
use crate::{Database, Result, StoreError};

/// Column holding the target id for this kind of follow.
fn target_column(target: &FollowTarget) -> &'static str {
    match target {
        FollowTarget::User(_) => "following_user_id",
        FollowTarget::House(_) => "following_house_id",
    }
}

fn follow_from_row(row: &Row<'_>) -> rusqlite::Result<Follow> {
    let target = match (opt_uuid_at(row, 2)?, opt_uuid_at(row, 3)?) {
        (Some(user), None) => FollowTarget::User(user),
        (None, Some(house)) => FollowTarget::House(house),
        _ => {
            return Err(rusqlite::Error::InvalidColumnType(
                2,
                "following_user_id".into(),
                rusqlite::types::Type::Null,
            ));
        }
    };
    Ok(Follow {
        id: uuid_at(row, 0)?,
        follower_id: uuid_at(row, 1)?,
        target,
        created_at: row.get(4)?,
    })
}

fn find_follow(conn: &Connection, follower: Uuid, target: &FollowTarget) -> Result<Option<Follow>> {
    let sql = format!(
        "SELECT id, follower_id, following_user_id, following_house_id, created_at
         FROM follows WHERE follower_id = ?1 AND {} = ?2",
        target_column(target)
    );
    Ok(conn
        .query_row(&sql, params![follower.to_string(), target.id().to_string()], follow_from_row)
        .optional()?)
}

impl Database {
    /// Follows the target if not yet followed, otherwise unfollows it.
    /// Returns whether `follower` follows the target afterwards.
    pub fn toggle_follow(&self, follower: Uuid, target: FollowTarget) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            match target {
                FollowTarget::User(id) => {
                    if !user_exists(&tx, id)? {
                        return Err(StoreError::NotFound("user"));
                    }
                    if id == follower {
                        return Err(Conflict::SelfFollow.into());
                    }
                }
                FollowTarget::House(id) => {
                    if query_house(&tx, id)?.is_none() {
                        return Err(StoreError::NotFound("house"));
                    }
                }
            }

            let following = match find_follow(&tx, follower, &target)? {
                Some(existing) => {
                    tx.execute("DELETE FROM follows WHERE id = ?1", [existing.id.to_string()])?;
                    false
                }
                None => {
                    let (user_id, house_id) = match target {
                        FollowTarget::User(id) => (Some(id.to_string()), None),
                        FollowTarget::House(id) => (None, Some(id.to_string())),
                    };
                    tx.execute(
                        "INSERT INTO follows (id, follower_id, following_user_id, following_house_id, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            Uuid::new_v4().to_string(),
                            follower.to_string(),
                            user_id,
                            house_id,
                            Utc::now(),
                        ],
                    )?;
                    true
                }
            };
            tx.commit()?;

            debug!("User {} following {:?}: {}", follower, target, following);
            Ok(following)
        })
    }

    pub fn get_follow(&self, follower: Uuid, target: FollowTarget) -> Result<Option<Follow>> {
        self.with_conn(|conn| find_follow(conn, follower, &target))
    }

    pub fn is_following(&self, follower: Uuid, target: FollowTarget) -> Result<bool> {
        Ok(self.get_follow(follower, target)?.is_some())
    }

    pub fn follower_count(&self, target: FollowTarget) -> Result<u64> {
        self.with_conn(|conn| {
            let sql = format!("SELECT COUNT(*) FROM follows WHERE {} = ?1", target_column(&target));
            count(conn, &sql, [target.id().to_string()])
        })
    }

    /// Followers of the user, and everything (users and houses) the user follows.
    pub fn profile_stats(&self, user_id: Uuid) -> Result<ProfileStats> {
        self.with_conn(|conn| {
            let id = user_id.to_string();
            Ok(ProfileStats {
                followers_count: count(
                    conn,
                    "SELECT COUNT(*) FROM follows WHERE following_user_id = ?1",
                    [&id],
                )?,
                following_count: count(
                    conn,
                    "SELECT COUNT(*) FROM follows WHERE follower_id = ?1",
                    [&id],
                )?,
            })
        })
    }

    /// Users followed by `user_id`, each with the houses they belong to.
    pub fn followings(&self, user_id: Uuid) -> Result<Vec<FollowedUser>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT f.created_at, {} FROM follows f
                 JOIN users u ON u.id = f.following_user_id
                 LEFT JOIN profiles p ON p.user_id = u.id
                 WHERE f.follower_id = ?1 AND f.following_user_id IS NOT NULL
                 ORDER BY f.created_at",
                PUBLIC_USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let follows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok((row.get::<_, DateTime<Utc>>(0)?, public_user_from_row(row, 1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            follows
                .into_iter()
                .map(|(followed_at, user)| {
                    let houses = query_member_houses(conn, user.id)?;
                    Ok(FollowedUser { user, houses, followed_at })
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testing;

    #[test]
    fn toggle_is_its_own_inverse() {
        let db = testing::db();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let house = testing::house(&db, &b, 4);

        for target in [FollowTarget::User(b.id), FollowTarget::House(house.id)] {
            let before = db.is_following(a.id, target).unwrap();
            assert!(db.toggle_follow(a.id, target).unwrap());
            assert!(db.is_following(a.id, target).unwrap());
            assert!(!db.toggle_follow(a.id, target).unwrap());
            assert_eq!(db.is_following(a.id, target).unwrap(), before);
        }
    }

    #[test]
    fn follow_row_records_its_target() {
        let db = testing::db();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let house = testing::house(&db, &b, 4);

        db.toggle_follow(a.id, FollowTarget::House(house.id)).unwrap();
        let follow = db.get_follow(a.id, FollowTarget::House(house.id)).unwrap().unwrap();
        assert_eq!(follow.follower_id, a.id);
        assert_eq!(follow.target, FollowTarget::House(house.id));
        assert!(db.get_follow(a.id, FollowTarget::User(b.id)).unwrap().is_none());
    }

    #[test]
    fn follow_then_toggle_deletes_row() {
        let db = testing::db();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");

        db.toggle_follow(a.id, FollowTarget::User(b.id)).unwrap();
        assert_eq!(db.follower_count(FollowTarget::User(b.id)).unwrap(), 1);

        db.toggle_follow(a.id, FollowTarget::User(b.id)).unwrap();
        assert_eq!(db.follower_count(FollowTarget::User(b.id)).unwrap(), 0);
    }

    #[test]
    fn self_follow_is_rejected() {
        let db = testing::db();
        let a = testing::user(&db, "a");

        let err = db.toggle_follow(a.id, FollowTarget::User(a.id)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(Conflict::SelfFollow)));
        assert_eq!(db.profile_stats(a.id).unwrap(), ProfileStats::default());
    }

    #[test]
    fn own_house_can_be_followed() {
        let db = testing::db();
        let host = testing::user(&db, "host");
        let house = testing::house(&db, &host, 4);
        assert!(db.toggle_follow(host.id, FollowTarget::House(house.id)).unwrap());
    }

    #[test]
    fn missing_target_is_not_found() {
        let db = testing::db();
        let a = testing::user(&db, "a");
        assert!(matches!(
            db.toggle_follow(a.id, FollowTarget::User(Uuid::new_v4())).unwrap_err(),
            StoreError::NotFound("user")
        ));
        assert!(matches!(
            db.toggle_follow(a.id, FollowTarget::House(Uuid::new_v4())).unwrap_err(),
            StoreError::NotFound("house")
        ));
    }

    #[test]
    fn store_enforces_exactly_one_target_and_no_self_rows() {
        let db = testing::db();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let house = testing::house(&db, &b, 4);

        let insert = |user: Option<Uuid>, house: Option<Uuid>| {
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO follows (id, follower_id, following_user_id, following_house_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        Uuid::new_v4().to_string(),
                        a.id.to_string(),
                        user.map(|id| id.to_string()),
                        house.map(|id| id.to_string()),
                        Utc::now(),
                    ],
                )?;
                Ok(())
            })
        };

        assert!(insert(None, None).unwrap_err().is_constraint_violation());
        assert!(insert(Some(b.id), Some(house.id)).unwrap_err().is_constraint_violation());
        assert!(insert(Some(a.id), None).unwrap_err().is_constraint_violation());

        insert(Some(b.id), None).unwrap();
        assert!(insert(Some(b.id), None).unwrap_err().is_constraint_violation());
        insert(None, Some(house.id)).unwrap();
        assert!(insert(None, Some(house.id)).unwrap_err().is_constraint_violation());
    }

    #[test]
    fn stats_count_both_target_types() {
        let db = testing::db();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let c = testing::user(&db, "c");
        let house = testing::house(&db, &c, 4);

        db.toggle_follow(a.id, FollowTarget::User(b.id)).unwrap();
        db.toggle_follow(a.id, FollowTarget::House(house.id)).unwrap();
        db.toggle_follow(c.id, FollowTarget::User(a.id)).unwrap();

        let stats = db.profile_stats(a.id).unwrap();
        assert_eq!(stats.following_count, 2);
        assert_eq!(stats.followers_count, 1);
        assert_eq!(db.follower_count(FollowTarget::House(house.id)).unwrap(), 1);
    }

    #[test]
    fn followings_pair_users_with_their_houses() {
        let db = testing::db();
        let a = testing::user(&db, "a");
        let b = testing::user(&db, "b");
        let c = testing::user(&db, "c");
        let b_house = testing::house(&db, &b, 4);
        db.toggle_follow(a.id, FollowTarget::User(b.id)).unwrap();
        db.toggle_follow(a.id, FollowTarget::User(c.id)).unwrap();
        db.toggle_follow(a.id, FollowTarget::House(b_house.id)).unwrap();

        let followings = db.followings(a.id).unwrap();
        assert_eq!(followings.len(), 2);

        let b_entry = followings.iter().find(|f| f.user.id == b.id).unwrap();
        assert_eq!(b_entry.houses.len(), 1);
        assert_eq!(b_entry.houses[0].id, b_house.id);

        let c_entry = followings.iter().find(|f| f.user.id == c.id).unwrap();
        assert!(c_entry.houses.is_empty());
    }
}
