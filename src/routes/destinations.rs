//! Destination connection catalog and live schema introspection.
//!
//! Every introspection handler opens an ephemeral handle scoped to the
//! request and closes it before responding; nothing stays connected between
//! requests.

use rocket::serde::json::Json;
use rocket::State;
use rocket_db_pools::sqlx::{self, PgPool};
use rocket_okapi::okapi::schemars::{self, JsonSchema};
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::import::destination::{ColumnInfo, DestinationDescriptor};
use crate::models::{DestinationConnection, DestinationConnectionSummary};

async fn load_connection(pool: &PgPool, id: i32) -> Result<DestinationConnection, ApiError> {
    let connection: Option<DestinationConnection> = sqlx::query_as(
        "SELECT id, name, driver, host, port, username, password, database_name, created_at
         FROM destination_connections WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    connection.ok_or_else(|| ApiError::NotFound(format!("destination connection {} not found", id)))
}

/// List the saved destination connections (passwords omitted).
#[openapi(tag = "Destinations")]
#[get("/destinations")]
pub async fn list_destinations(
    pool: &State<PgPool>,
) -> Result<Json<Vec<DestinationConnectionSummary>>, ApiError> {
    let connections: Vec<DestinationConnection> = sqlx::query_as(
        "SELECT id, name, driver, host, port, username, password, database_name, created_at
         FROM destination_connections ORDER BY name ASC",
    )
    .fetch_all(pool.inner())
    .await?;

    Ok(Json(connections.iter().map(Into::into).collect()))
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TestConnectionResponse {
    pub success: bool,
    pub message: String,
}

/// Test connectivity of a saved destination connection.
#[openapi(tag = "Destinations")]
#[post("/destinations/<id>/test")]
pub async fn test_destination(
    id: i32,
    pool: &State<PgPool>,
) -> Result<Json<TestConnectionResponse>, ApiError> {
    let connection = load_connection(pool.inner(), id).await?;
    let descriptor = DestinationDescriptor::from_catalog(&connection)?;

    let response = match descriptor.connect(None).await {
        Ok(handle) => {
            let ping = handle.ping().await;
            handle.close().await;
            match ping {
                Ok(()) => TestConnectionResponse {
                    success: true,
                    message: "connection successful".to_string(),
                },
                Err(e) => TestConnectionResponse {
                    success: false,
                    message: e.to_string(),
                },
            }
        }
        Err(e) => TestConnectionResponse {
            success: false,
            message: e.to_string(),
        },
    };

    Ok(Json(response))
}

/// List user databases on a destination server.
#[openapi(tag = "Destinations")]
#[get("/destinations/<id>/databases")]
pub async fn list_databases(
    id: i32,
    pool: &State<PgPool>,
) -> Result<Json<Vec<String>>, ApiError> {
    let connection = load_connection(pool.inner(), id).await?;
    let descriptor = DestinationDescriptor::from_catalog(&connection)?;

    let handle = descriptor.connect(None).await?;
    let databases = handle.list_databases().await;
    handle.close().await;

    Ok(Json(databases?))
}

/// List the tables of one database on a destination server.
#[openapi(tag = "Destinations")]
#[get("/destinations/<id>/databases/<database>/tables")]
pub async fn list_tables(
    id: i32,
    database: String,
    pool: &State<PgPool>,
) -> Result<Json<Vec<String>>, ApiError> {
    let connection = load_connection(pool.inner(), id).await?;
    let descriptor = DestinationDescriptor::from_catalog(&connection)?;

    let handle = descriptor.connect(Some(&database)).await?;
    let tables = handle.list_tables().await;
    handle.close().await;

    Ok(Json(tables?))
}

/// Describe the columns of one destination table, in ordinal order.
#[openapi(tag = "Destinations")]
#[get("/destinations/<id>/databases/<database>/tables/<table>/columns")]
pub async fn list_columns(
    id: i32,
    database: String,
    table: String,
    pool: &State<PgPool>,
) -> Result<Json<Vec<ColumnInfo>>, ApiError> {
    let connection = load_connection(pool.inner(), id).await?;
    let descriptor = DestinationDescriptor::from_catalog(&connection)?;

    let handle = descriptor.connect(Some(&database)).await?;
    let columns = handle.list_columns(&table).await;
    handle.close().await;

    let columns = columns?;
    if columns.is_empty() {
        return Err(ApiError::NotFound(format!(
            "table '{}' not found in database '{}'",
            table, database
        )));
    }

    Ok(Json(columns))
}
