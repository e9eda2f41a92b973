use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};

use crate::error_handling::types::StorageError;
use crate::storage::sql_builder::{
    callback_select, decode_json, encode_json, resolve_bounds, utc_text, Placeholder,
};
use crate::storage::storage_trait::Storage;
use crate::storage::types::{
    new_record_id, now_in, Callback, CallbackDraft, CallbackFilter, CallbackPage, NewRoute, Route,
    RouteUpdate,
};

// Row mappings; timestamps are stored as fixed-width UTC text so the
// column sorts and compares chronologically.
#[derive(Debug, sqlx::FromRow)]
struct CallbackRow {
    id: String,
    timestamp: String,
    route: String,
    method: String,
    headers: Option<String>,
    query: Option<String>,
    body: Option<String>,
    ip: Option<String>,
}

impl CallbackRow {
    fn into_callback(self, tz: chrono_tz::Tz) -> Result<Callback, StorageError> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| {
                error!("Invalid timestamp for callback {}: {}", self.id, e);
                StorageError::ReadFailed
            })?
            .with_timezone(&tz)
            .fixed_offset();
        Ok(Callback {
            id: self.id,
            timestamp,
            route: self.route,
            method: self.method,
            headers: decode_json(self.headers)?,
            query: decode_json(self.query)?,
            body: decode_json(self.body)?,
            ip: self.ip.unwrap_or_default(),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RouteRow {
    id: String,
    path: String,
    name: String,
    description: Option<String>,
    created_at: String,
    updated_at: Option<String>,
}

impl RouteRow {
    fn into_route(self, tz: chrono_tz::Tz) -> Result<Route, StorageError> {
        let parse = |text: &str, id: &str| {
            DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&tz).fixed_offset())
                .map_err(|e| {
                    error!("Invalid timestamp for route {}: {}", id, e);
                    StorageError::ReadFailed
                })
        };
        let created_at = parse(&self.created_at, &self.id)?;
        let updated_at = match self.updated_at.as_deref() {
            Some(text) => Some(parse(text, &self.id)?),
            None => None,
        };
        Ok(Route {
            id: self.id,
            path: self.path,
            name: self.name,
            description: self.description.unwrap_or_default(),
            created_at,
            updated_at,
        })
    }
}

/// Embedded SQL backend over a single SQLite database file.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
    tz: chrono_tz::Tz,
}

impl SqliteStorage {
    /// Database filename created inside the configured data directory
    const DEFAULT_DB_FILE: &'static str = "rappel.sqlite3";

    /// Create or open the database inside `dir` with the default filename.
    pub async fn new_dir<P: AsRef<Path>>(dir: P, tz: chrono_tz::Tz) -> Result<Self, StorageError> {
        Self::new_file(dir.as_ref().join(Self::DEFAULT_DB_FILE), tz).await
    }

    pub async fn new_file<P: AsRef<Path>>(path: P, tz: chrono_tz::Tz) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                error!("Failed to create {}: {}", parent.display(), e);
                StorageError::WriteFailed
            })?;
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(|e| {
                error!("Failed to open {}: {}", path.display(), e);
                StorageError::ConnectionFailed
            })?;
        info!("SqliteStorage opened at {}", path.display());

        Ok(Self { pool, tz })
    }

    fn write_err(e: sqlx::Error) -> StorageError {
        if e.as_database_error()
            .map_or(false, |db| db.is_unique_violation())
        {
            return StorageError::DuplicatePath;
        }
        error!("SQLite write failed: {}", e);
        StorageError::WriteFailed
    }

    fn read_err(e: sqlx::Error) -> StorageError {
        error!("SQLite read failed: {}", e);
        StorageError::ReadFailed
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn initialize(&self) -> Result<(), StorageError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS callbacks (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                route TEXT NOT NULL,
                method TEXT NOT NULL,
                headers TEXT,
                query TEXT,
                body TEXT,
                ip TEXT
            )",
            "CREATE TABLE IF NOT EXISTS routes (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_callbacks_timestamp ON callbacks(timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_callbacks_route ON callbacks(route)",
        ];
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    error!("Schema setup failed: {}", e);
                    StorageError::WriteFailed
                })?;
        }
        Ok(())
    }

    async fn save_callback(&self, draft: CallbackDraft) -> Result<Callback, StorageError> {
        let callback = Callback {
            id: new_record_id(),
            timestamp: now_in(self.tz),
            route: draft.route,
            method: draft.method,
            headers: draft.headers,
            query: draft.query,
            body: draft.body,
            ip: draft.ip,
        };

        sqlx::query(
            "INSERT INTO callbacks (id, timestamp, route, method, headers, query, body, ip)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&callback.id)
        .bind(utc_text(callback.timestamp.with_timezone(&Utc)))
        .bind(&callback.route)
        .bind(&callback.method)
        .bind(encode_json(&callback.headers))
        .bind(encode_json(&callback.query))
        .bind(encode_json(&callback.body))
        .bind(&callback.ip)
        .execute(&self.pool)
        .await
        .map_err(Self::write_err)?;

        Ok(callback)
    }

    async fn get_callbacks(&self, filter: CallbackFilter) -> Result<CallbackPage, StorageError> {
        let bounds = resolve_bounds(&filter, self.tz);
        let select = callback_select(&filter, &bounds, Placeholder::Question);
        let limit = filter.limit();
        let offset = filter.offset();

        // Count and page from the same snapshot
        let mut tx = self.pool.begin().await.map_err(Self::read_err)?;

        let mut count_query = sqlx::query_scalar::<_, i64>(&select.count_sql);
        if let Some(ref route) = filter.route {
            count_query = count_query.bind(route);
        }
        if let Some(lower) = bounds.lower {
            count_query = count_query.bind(utc_text(lower));
        }
        if let Some((upper, _)) = bounds.upper {
            count_query = count_query.bind(utc_text(upper));
        }
        let total = count_query
            .fetch_one(&mut *tx)
            .await
            .map_err(Self::read_err)?;

        let mut page_query = sqlx::query_as::<_, CallbackRow>(&select.page_sql);
        if let Some(ref route) = filter.route {
            page_query = page_query.bind(route);
        }
        if let Some(lower) = bounds.lower {
            page_query = page_query.bind(utc_text(lower));
        }
        if let Some((upper, _)) = bounds.upper {
            page_query = page_query.bind(utc_text(upper));
        }
        let rows = page_query
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&mut *tx)
            .await
            .map_err(Self::read_err)?;

        tx.commit().await.map_err(Self::read_err)?;

        let data = rows
            .into_iter()
            .map(|row| row.into_callback(self.tz))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CallbackPage {
            data,
            total: total as u64,
            limit,
            offset,
        })
    }

    async fn get_callback_by_id(&self, id: &str) -> Result<Option<Callback>, StorageError> {
        let row = sqlx::query_as::<_, CallbackRow>(
            "SELECT id, timestamp, route, method, headers, query, body, ip
             FROM callbacks WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::read_err)?;

        row.map(|r| r.into_callback(self.tz)).transpose()
    }

    async fn delete_callback(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM callbacks WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Self::write_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_route(&self, route: NewRoute) -> Result<Route, StorageError> {
        let stored = Route {
            id: new_record_id(),
            path: route.path,
            name: route.name,
            description: route.description.unwrap_or_default(),
            created_at: now_in(self.tz),
            updated_at: None,
        };

        sqlx::query(
            "INSERT INTO routes (id, path, name, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&stored.id)
        .bind(&stored.path)
        .bind(&stored.name)
        .bind(&stored.description)
        .bind(utc_text(stored.created_at.with_timezone(&Utc)))
        .execute(&self.pool)
        .await
        .map_err(Self::write_err)?;

        Ok(stored)
    }

    async fn get_routes(&self) -> Result<Vec<Route>, StorageError> {
        let rows = sqlx::query_as::<_, RouteRow>(
            "SELECT id, path, name, description, created_at, updated_at
             FROM routes ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Self::read_err)?;

        rows.into_iter().map(|r| r.into_route(self.tz)).collect()
    }

    async fn update_route(
        &self,
        id: &str,
        update: RouteUpdate,
    ) -> Result<Option<Route>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(Self::write_err)?;

        let existing = sqlx::query_as::<_, RouteRow>(
            "SELECT id, path, name, description, created_at, updated_at
             FROM routes WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Self::read_err)?;
        if existing.is_none() {
            return Ok(None);
        }

        let mut sets: Vec<&str> = Vec::new();
        if update.path.is_some() {
            sets.push("path = ?");
        }
        if update.name.is_some() {
            sets.push("name = ?");
        }
        if update.description.is_some() {
            sets.push("description = ?");
        }
        sets.push("updated_at = ?");

        let sql = format!("UPDATE routes SET {} WHERE id = ?", sets.join(", "));
        let mut query = sqlx::query(&sql);
        if let Some(ref path) = update.path {
            query = query.bind(path);
        }
        if let Some(ref name) = update.name {
            query = query.bind(name);
        }
        if let Some(ref description) = update.description {
            query = query.bind(description);
        }
        query
            .bind(utc_text(Utc::now()))
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Self::write_err)?;

        let row = sqlx::query_as::<_, RouteRow>(
            "SELECT id, path, name, description, created_at, updated_at
             FROM routes WHERE id = ?1",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Self::read_err)?;

        tx.commit().await.map_err(Self::write_err)?;

        Ok(Some(row.into_route(self.tz)?))
    }

    async fn delete_route(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM routes WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Self::write_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
