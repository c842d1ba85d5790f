//! Destination database resolution and driver-specific access.
//!
//! A destination is described by a value-typed [`DestinationDescriptor`]
//! built from a catalog row. Connecting yields an ephemeral
//! [`DestinationHandle`] — a small pool owned solely by the operation that
//! requested it and closed when that operation finishes. Nothing is ever
//! registered globally, so concurrent jobs cannot observe each other's
//! handles.
//!
//! Two relational backends are supported, each with its own introspection
//! queries: PostgreSQL (`pg_database`, `information_schema`) and MySQL
//! (`SHOW DATABASES`, `information_schema`).

use crate::import::mapper::{CellValue, MappedRow, DATE_TARGETS, NUMERIC_TARGETS};
use crate::models::DestinationConnection;
use chrono::NaiveDate;
use rocket_okapi::okapi::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{MySqlPool, PgPool};
use thiserror::Error;

/// System databases hidden from catalog listings, per driver.
const MYSQL_SYSTEM_DATABASES: &[&str] = &["information_schema", "mysql", "performance_schema", "sys"];
const PG_SYSTEM_DATABASES: &[&str] = &["postgres", "template0", "template1"];

/// Connections held by one ephemeral handle. Imports are sequential, so a
/// couple of connections is enough headroom for progress queries.
const HANDLE_MAX_CONNECTIONS: u32 = 2;

#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("unsupported database driver `{0}`")]
    UnsupportedDriver(String),
    #[error("failed to connect to destination: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("destination query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Supported destination drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Postgres,
    MySql,
}

impl DriverKind {
    /// Parse the catalog's driver string (`pgsql`, `mysql`, and aliases).
    pub fn parse(driver: &str) -> Result<Self, DestinationError> {
        match driver.trim().to_lowercase().as_str() {
            "pgsql" | "postgres" | "postgresql" => Ok(DriverKind::Postgres),
            "mysql" | "mariadb" => Ok(DriverKind::MySql),
            other => Err(DestinationError::UnsupportedDriver(other.to_string())),
        }
    }
}

/// Value-typed description of a destination server, resolved from the catalog.
#[derive(Debug, Clone)]
pub struct DestinationDescriptor {
    pub driver: DriverKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Catalog-level default database, used when the caller names none.
    pub default_database: Option<String>,
}

impl DestinationDescriptor {
    pub fn from_catalog(row: &DestinationConnection) -> Result<Self, DestinationError> {
        Ok(Self {
            driver: DriverKind::parse(&row.driver)?,
            host: row.host.clone(),
            port: row.port as u16,
            username: row.username.clone(),
            password: row.password.clone(),
            default_database: row.database_name.clone(),
        })
    }

    /// Open an ephemeral handle scoped to `database` (or the catalog default,
    /// or the driver's administrative database for server-level queries).
    pub async fn connect(
        &self,
        database: Option<&str>,
    ) -> Result<DestinationHandle, DestinationError> {
        let database = database.or(self.default_database.as_deref());

        match self.driver {
            DriverKind::Postgres => {
                let options = PgConnectOptions::new()
                    .host(&self.host)
                    .port(self.port)
                    .username(&self.username)
                    .password(&self.password)
                    .database(database.unwrap_or("postgres"));
                let pool = PgPoolOptions::new()
                    .max_connections(HANDLE_MAX_CONNECTIONS)
                    .connect_with(options)
                    .await
                    .map_err(DestinationError::Connect)?;
                Ok(DestinationHandle::Postgres(pool))
            }
            DriverKind::MySql => {
                let options = MySqlConnectOptions::new()
                    .host(&self.host)
                    .port(self.port)
                    .username(&self.username)
                    .password(&self.password)
                    .database(database.unwrap_or("information_schema"));
                let pool = MySqlPoolOptions::new()
                    .max_connections(HANDLE_MAX_CONNECTIONS)
                    .connect_with(options)
                    .await
                    .map_err(DestinationError::Connect)?;
                Ok(DestinationHandle::MySql(pool))
            }
        }
    }
}

/// Column metadata returned by destination introspection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// A live, job-scoped handle onto one destination database.
pub enum DestinationHandle {
    Postgres(PgPool),
    MySql(MySqlPool),
}

impl DestinationHandle {
    pub fn driver(&self) -> DriverKind {
        match self {
            DestinationHandle::Postgres(_) => DriverKind::Postgres,
            DestinationHandle::MySql(_) => DriverKind::MySql,
        }
    }

    /// Cheap liveness probe, used by the connection-test endpoint.
    pub async fn ping(&self) -> Result<(), DestinationError> {
        match self {
            DestinationHandle::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            DestinationHandle::MySql(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    /// List user databases on the server, system databases filtered out.
    pub async fn list_databases(&self) -> Result<Vec<String>, DestinationError> {
        let databases: Vec<String> = match self {
            DestinationHandle::Postgres(pool) => {
                sqlx::query_scalar::<_, String>(
                    "SELECT datname FROM pg_database WHERE datistemplate = false",
                )
                .fetch_all(pool)
                .await?
                .into_iter()
                .filter(|db| !PG_SYSTEM_DATABASES.contains(&db.as_str()))
                .collect()
            }
            DestinationHandle::MySql(pool) => sqlx::query_scalar::<_, String>("SHOW DATABASES")
                .fetch_all(pool)
                .await?
                .into_iter()
                .filter(|db| !MYSQL_SYSTEM_DATABASES.contains(&db.as_str()))
                .collect(),
        };
        Ok(databases)
    }

    /// List base tables in the database this handle is scoped to.
    pub async fn list_tables(&self) -> Result<Vec<String>, DestinationError> {
        let tables = match self {
            DestinationHandle::Postgres(pool) => {
                sqlx::query_scalar(
                    "SELECT table_name FROM information_schema.tables
                     WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
                     ORDER BY table_name",
                )
                .fetch_all(pool)
                .await?
            }
            DestinationHandle::MySql(pool) => {
                sqlx::query_scalar(
                    "SELECT table_name FROM information_schema.tables
                     WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'
                     ORDER BY table_name",
                )
                .fetch_all(pool)
                .await?
            }
        };
        Ok(tables)
    }

    /// Describe the columns of `table` in ordinal order.
    pub async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DestinationError> {
        let rows: Vec<(String, String, String, Option<String>)> = match self {
            DestinationHandle::Postgres(pool) => {
                sqlx::query_as(
                    "SELECT column_name, data_type, is_nullable, column_default
                     FROM information_schema.columns
                     WHERE table_schema = 'public' AND table_name = $1
                     ORDER BY ordinal_position",
                )
                .bind(table)
                .fetch_all(pool)
                .await?
            }
            DestinationHandle::MySql(pool) => {
                sqlx::query_as(
                    "SELECT column_name, column_type, is_nullable, column_default
                     FROM information_schema.columns
                     WHERE table_schema = DATABASE() AND table_name = ?
                     ORDER BY ordinal_position",
                )
                .bind(table)
                .fetch_all(pool)
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|(name, data_type, nullable, default)| ColumnInfo {
                name,
                data_type,
                nullable: nullable.eq_ignore_ascii_case("yes"),
                default,
            })
            .collect())
    }

    /// Insert `rows` into `table` with one multi-row statement.
    ///
    /// Columns a row never set are bound as typed NULLs. The statement is its
    /// own transaction: a successful batch is committed immediately.
    pub async fn insert_rows(
        &self,
        table: &str,
        columns: &[String],
        rows: &[MappedRow],
    ) -> Result<u64, DestinationError> {
        if rows.is_empty() {
            return Ok(0);
        }

        match self {
            DestinationHandle::Postgres(pool) => {
                let quoted: Vec<String> = columns.iter().map(|c| quote_pg(c)).collect();
                let mut placeholders = Vec::with_capacity(rows.len());
                let mut n = 1usize;
                for _ in rows {
                    let row_params: Vec<String> = (0..columns.len())
                        .map(|_| {
                            let p = format!("${n}");
                            n += 1;
                            p
                        })
                        .collect();
                    placeholders.push(format!("({})", row_params.join(", ")));
                }
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES {}",
                    quote_pg(table),
                    quoted.join(", "),
                    placeholders.join(", ")
                );

                let mut query = sqlx::query(&sql);
                for row in rows {
                    for column in columns {
                        query = bind_pg(query, column, row.get(column));
                    }
                }
                let result = query.execute(pool).await?;
                Ok(result.rows_affected())
            }
            DestinationHandle::MySql(pool) => {
                let quoted: Vec<String> = columns.iter().map(|c| quote_mysql(c)).collect();
                let row_params = format!(
                    "({})",
                    vec!["?"; columns.len()].join(", ")
                );
                let placeholders = vec![row_params; rows.len()].join(", ");
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES {}",
                    quote_mysql(table),
                    quoted.join(", "),
                    placeholders
                );

                let mut query = sqlx::query(&sql);
                for row in rows {
                    for column in columns {
                        query = bind_mysql(query, column, row.get(column));
                    }
                }
                let result = query.execute(pool).await?;
                Ok(result.rows_affected())
            }
        }
    }

    /// Close the handle's pool; also happens implicitly on drop.
    pub async fn close(self) {
        match self {
            DestinationHandle::Postgres(pool) => pool.close().await,
            DestinationHandle::MySql(pool) => pool.close().await,
        }
    }
}

fn quote_pg(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_mysql(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;
type MySqlQuery<'q> = sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>;

/// Bind a cell for PostgreSQL. NULLs are typed by the destination column's
/// coercion class so parameter type inference stays sound in multi-row
/// VALUES lists.
fn bind_pg<'q>(query: PgQuery<'q>, column: &str, value: Option<&CellValue>) -> PgQuery<'q> {
    match value {
        Some(CellValue::Text(s)) => query.bind(s.clone()),
        Some(CellValue::Number(n)) => query.bind(*n),
        Some(CellValue::Date(d)) => query.bind(*d),
        Some(CellValue::Timestamp(t)) => query.bind(*t),
        Some(CellValue::Null) | None => bind_null_pg(query, column),
    }
}

fn bind_null_pg<'q>(query: PgQuery<'q>, column: &str) -> PgQuery<'q> {
    if DATE_TARGETS.contains(&column) {
        query.bind(None::<NaiveDate>)
    } else if NUMERIC_TARGETS.contains(&column) {
        query.bind(None::<f64>)
    } else {
        query.bind(None::<String>)
    }
}

fn bind_mysql<'q>(query: MySqlQuery<'q>, column: &str, value: Option<&CellValue>) -> MySqlQuery<'q> {
    match value {
        Some(CellValue::Text(s)) => query.bind(s.clone()),
        Some(CellValue::Number(n)) => query.bind(*n),
        Some(CellValue::Date(d)) => query.bind(*d),
        Some(CellValue::Timestamp(t)) => query.bind(t.naive_utc()),
        Some(CellValue::Null) | None => {
            if DATE_TARGETS.contains(&column) {
                query.bind(None::<NaiveDate>)
            } else if NUMERIC_TARGETS.contains(&column) {
                query.bind(None::<f64>)
            } else {
                query.bind(None::<String>)
            }
        }
    }
}
