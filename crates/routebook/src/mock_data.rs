use chrono::{DateTime, Duration, Utc};
use routebook_core::model::{NewRoute, NewUser, USERS};
use routebook_core::store::{Reference, Result};
use routebook_core::Client;
use serde::Serialize;

/// 2026-01-01T09:00:00Z, the timestamp demo routes are spread from.
const SEED_EPOCH_SECONDS: i64 = 1_767_258_000;

/// (id, display name, email)
const CLIMBERS: [(&str, &str, &str); 4] = [
    ("alice", "Alice Moon", "alice@routebook.dev"),
    ("bob", "Bob Crux", "bob@routebook.dev"),
    ("carol", "Carol Sloper", "carol@routebook.dev"),
    ("dave", "Dave Jugs", "dave@routebook.dev"),
];

/// (id, name, grade, setter, hours after the seed epoch)
const ROUTES: [(&str, &str, &str, Option<&str>, i64); 6] = [
    ("the-pinch", "The Pinch", "V5", Some("alice"), 1),
    ("slab-happy", "Slab Happy", "V2", Some("bob"), 2),
    ("crimp-city", "Crimp City", "V4", Some("alice"), 3),
    ("mystery-arete", "Mystery Arete", "V3", None, 4),
    ("dyno-dreams", "Dyno Dreams", "V6", Some("carol"), 5),
    ("overhang-hero", "Overhang Hero", "V7", Some("bob"), 6),
];

/// (follower, followed)
const FOLLOWS: [(&str, &str); 6] = [
    ("alice", "bob"),
    ("alice", "carol"),
    ("bob", "alice"),
    ("dave", "alice"),
    ("dave", "bob"),
    ("dave", "carol"),
];

/// (user, route)
const LIKES: [(&str, &str); 4] = [
    ("bob", "the-pinch"),
    ("carol", "the-pinch"),
    ("dave", "crimp-city"),
    ("alice", "dyno-dreams"),
];

/// What [`seed`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub users: usize,
    pub routes: usize,
    pub follows: usize,
    pub likes: usize,
}

fn seed_time(hours: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(SEED_EPOCH_SECONDS) + Duration::hours(hours)
}

/// Writes the demo climbers and routes, replacing any documents with the same ids.
///
/// Relationships go through the same transactional follow and like operations
/// the CLI uses, so both sides of every edge are recorded.
pub async fn seed(client: &Client) -> Result<SeedSummary> {
    for (id, name, email) in CLIMBERS {
        client.insert_user(id, NewUser::new(name, email)).await?;
    }

    for (id, name, grade, setter, hours) in ROUTES {
        let mut route = NewRoute::new(name, grade).with_created_at(seed_time(hours));
        if let Some(setter) = setter {
            route = route.with_setter(Reference::new(USERS, setter));
        }
        client.insert_route(id, route).await?;
    }

    for (follower, followed) in FOLLOWS {
        client.user(follower).follow(&client.user(followed)).await?;
    }

    for (user, route) in LIKES {
        client.route(route).like(&client.user(user)).await?;
    }

    let summary = SeedSummary {
        users: CLIMBERS.len(),
        routes: ROUTES.len(),
        follows: FOLLOWS.len(),
        likes: LIKES.len(),
    };
    tracing::info!(
        users = summary.users,
        routes = summary.routes,
        follows = summary.follows,
        likes = summary.likes,
        "Demo data seeded"
    );
    Ok(summary)
}
