use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::FromRow;
use rocket_okapi::okapi::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};

// ===== Destination Connection Catalog =====

/// A saved destination database connection. The password never leaves the
/// server; API responses use [`DestinationConnectionSummary`].
#[derive(Debug, Clone, FromRow)]
pub struct DestinationConnection {
    pub id: i32,
    pub name: String,
    pub driver: String,
    pub host: String,
    pub port: i32,
    pub username: String,
    pub password: String,
    pub database_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Password-free view of a catalog entry, safe to serialize.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DestinationConnectionSummary {
    pub id: i32,
    pub name: String,
    pub driver: String,
    pub host: String,
    pub port: i32,
    pub username: String,
    pub database_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&DestinationConnection> for DestinationConnectionSummary {
    fn from(row: &DestinationConnection) -> Self {
        Self {
            id: row.id,
            name: row.name.clone(),
            driver: row.driver.clone(),
            host: row.host.clone(),
            port: row.port,
            username: row.username.clone(),
            database_name: row.database_name.clone(),
            created_at: row.created_at,
        }
    }
}
