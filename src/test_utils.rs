/// # Test Utilities Module
///
/// In-memory database fixtures shared by the unit tests.

use crate::clauses::Record;
use crate::connector::Connector;

pub const USERS_SCHEMA: &str = "
    CREATE TABLE users (
        user_id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_name TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL,
        status INTEGER NOT NULL DEFAULT 0,
        age INTEGER
    );
";

/// A connector on a fresh in-memory database holding an empty `users` table
pub fn users_connector() -> Connector {
    let connector = Connector::in_memory().unwrap();
    connector
        .run(|conn| {
            conn.execute_batch(USERS_SCHEMA)?;
            Ok(())
        })
        .unwrap();
    connector
}

pub struct UserFixture;

impl UserFixture {
    /// Inserts `user1`..`userN` with status 0 and ages 20, 21, ...
    pub fn seed_numbered(connector: &Connector, count: u64) {
        let users = connector.resultset("users").unwrap();
        for i in 1..=count {
            users
                .insert(
                    &Record::new()
                        .set("user_name", format!("user{}", i))
                        .set("email", format!("user{}@example.com", i))
                        .set("age", 19 + i),
                )
                .unwrap();
        }
    }
}
