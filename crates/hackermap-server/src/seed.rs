//! Sample data for local development.

use argon2::Argon2;
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::info;

use hackermap_api::auth::hash_password;
use hackermap_db::Database;
use hackermap_types::forms::NewHouse;

const SAMPLE_HOST: &str = "sample_host";
const SAMPLE_EMAIL: &str = "host@example.com";
const SAMPLE_PASSWORD: &str = "password";

const ADJECTIVES: &[&str] = &[
    "Cyber", "Quantum", "Neural", "Binary", "Silicon", "Digital", "Crypto", "Tech", "Code", "Data",
];
const NOUNS: &[&str] = &[
    "Haven", "Bunker", "Fortress", "Lab", "Hub", "Nexus", "Base", "Station", "Loft", "Manor",
];
const STREETS: &[&str] = &["Market", "Mission", "Broadway", "Main", "First"];
const CITIES: &[&str] = &[
    "San Francisco", "New York", "Austin", "Miami", "Seattle", "Berlin", "London", "Tokyo",
    "Toronto", "Singapore",
];
const DESCRIPTION: &str = "A cutting-edge co-living space for builders, hackers, and dreamers. \
     Join a community of like-minded individuals working on the next big thing. \
     High-speed internet, ergonomic workstations, and weekly demo nights included.";

fn pick<R: Rng + ?Sized>(rng: &mut R, words: &[&'static str]) -> &'static str {
    words.choose(rng).copied().unwrap_or_default()
}

pub fn random_houses<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<NewHouse> {
    (0..count)
        .map(|_| NewHouse {
            title: format!("{} {}", pick(rng, ADJECTIVES), pick(rng, NOUNS)),
            address: format!(
                "{} {} St, {}",
                rng.random_range(100..=9999),
                pick(rng, STREETS),
                pick(rng, CITIES)
            ),
            description: DESCRIPTION.to_string(),
            capacity: rng.random_range(4..=20),
            image: None,
        })
        .collect()
}

/// Creates `count` houses hosted by the sample account, creating the
/// account on first use.
pub fn run(db: &Database, count: usize) -> anyhow::Result<usize> {
    let host = match db.find_login(SAMPLE_HOST)? {
        Some(row) => row.user,
        None => {
            let hash = hash_password(&Argon2::default(), SAMPLE_PASSWORD)?;
            let user = db.create_user(SAMPLE_HOST, SAMPLE_EMAIL, &hash)?;
            info!("Created {} account", SAMPLE_HOST);
            user
        }
    };

    let houses = random_houses(&mut rand::rng(), count);
    let created = db.seed_houses(host.id, &houses)?;
    info!("Successfully created {} hacker houses", created.len());
    Ok(created.len())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn generated_houses_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let houses = random_houses(&mut rng, 50);
        assert_eq!(houses.len(), 50);
        for house in &houses {
            assert!((4..=20).contains(&house.capacity));
            let (adjective, noun) = house.title.split_once(' ').unwrap();
            assert!(ADJECTIVES.contains(&adjective));
            assert!(NOUNS.contains(&noun));
            assert!(CITIES.iter().any(|c| house.address.ends_with(c)));
        }
    }

    #[test]
    fn seeding_twice_reuses_the_sample_host() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(run(&db, 3).unwrap(), 3);
        assert_eq!(run(&db, 2).unwrap(), 2);

        let host = db.find_login(SAMPLE_HOST).unwrap().unwrap().user;
        assert_eq!(db.member_houses(host.id).unwrap().len(), 0);
        assert_eq!(db.list_houses_with_images().unwrap().len(), 5);
    }
}
