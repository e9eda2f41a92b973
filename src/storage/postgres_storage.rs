use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use serde_json::Value;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    types::Json,
    Pool, Postgres,
};

use crate::error_handling::types::StorageError;
use crate::storage::sql_builder::{callback_select, resolve_bounds, Placeholder};
use crate::storage::storage_trait::Storage;
use crate::storage::types::{
    new_record_id, now_in, Callback, CallbackDraft, CallbackFilter, CallbackPage, NewRoute, Route,
    RouteUpdate,
};

// Timestamps are TIMESTAMPTZ; JSON columns are JSONB.
#[derive(Debug, sqlx::FromRow)]
struct CallbackRow {
    id: String,
    timestamp: DateTime<Utc>,
    route: String,
    method: String,
    headers: Option<Json<Value>>,
    query: Option<Json<Value>>,
    body: Option<Json<Value>>,
    ip: Option<String>,
}

fn json_or_empty(column: Option<Json<Value>>) -> Value {
    column
        .map(|j| j.0)
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
}

impl CallbackRow {
    fn into_callback(self, tz: chrono_tz::Tz) -> Callback {
        Callback {
            id: self.id,
            timestamp: self.timestamp.with_timezone(&tz).fixed_offset(),
            route: self.route,
            method: self.method,
            headers: json_or_empty(self.headers),
            query: json_or_empty(self.query),
            body: json_or_empty(self.body),
            ip: self.ip.unwrap_or_default(),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RouteRow {
    id: String,
    path: String,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl RouteRow {
    fn into_route(self, tz: chrono_tz::Tz) -> Route {
        Route {
            id: self.id,
            path: self.path,
            name: self.name,
            description: self.description.unwrap_or_default(),
            created_at: self.created_at.with_timezone(&tz).fixed_offset(),
            updated_at: self.updated_at.map(|dt| dt.with_timezone(&tz).fixed_offset()),
        }
    }
}

/// Client-server SQL backend over a PostgreSQL connection pool.
pub struct PostgresStorage {
    pool: Pool<Postgres>,
    tz: chrono_tz::Tz,
}

impl PostgresStorage {
    pub async fn connect(
        host: &str,
        port: Option<u16>,
        username: &str,
        password: &str,
        database: &str,
        tz: chrono_tz::Tz,
    ) -> Result<Self, StorageError> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .username(username)
            .database(database);
        if let Some(port) = port {
            opts = opts.port(port);
        }
        if !password.is_empty() {
            opts = opts.password(password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_with(opts)
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL at {}: {}", host, e);
                StorageError::ConnectionFailed
            })?;
        info!("PostgresStorage connected to {}/{}", host, database);

        Ok(Self { pool, tz })
    }

    fn write_err(e: sqlx::Error) -> StorageError {
        if e.as_database_error()
            .map_or(false, |db| db.is_unique_violation())
        {
            return StorageError::DuplicatePath;
        }
        error!("PostgreSQL write failed: {}", e);
        StorageError::WriteFailed
    }

    fn read_err(e: sqlx::Error) -> StorageError {
        error!("PostgreSQL read failed: {}", e);
        StorageError::ReadFailed
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn initialize(&self) -> Result<(), StorageError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS callbacks (
                id TEXT PRIMARY KEY,
                timestamp TIMESTAMPTZ NOT NULL,
                route TEXT NOT NULL,
                method TEXT NOT NULL,
                headers JSONB,
                query JSONB,
                body JSONB,
                ip TEXT
            )",
            "CREATE TABLE IF NOT EXISTS routes (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                description TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ
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
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&callback.id)
        .bind(callback.timestamp.with_timezone(&Utc))
        .bind(&callback.route)
        .bind(&callback.method)
        .bind(Json(&callback.headers))
        .bind(Json(&callback.query))
        .bind(Json(&callback.body))
        .bind(&callback.ip)
        .execute(&self.pool)
        .await
        .map_err(Self::write_err)?;

        Ok(callback)
    }

    async fn get_callbacks(&self, filter: CallbackFilter) -> Result<CallbackPage, StorageError> {
        let bounds = resolve_bounds(&filter, self.tz);
        let select = callback_select(&filter, &bounds, Placeholder::Numbered);
        let limit = filter.limit();
        let offset = filter.offset();

        let mut tx = self.pool.begin().await.map_err(Self::read_err)?;

        let mut count_query = sqlx::query_scalar::<_, i64>(&select.count_sql);
        if let Some(ref route) = filter.route {
            count_query = count_query.bind(route);
        }
        if let Some(lower) = bounds.lower {
            count_query = count_query.bind(lower);
        }
        if let Some((upper, _)) = bounds.upper {
            count_query = count_query.bind(upper);
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
            page_query = page_query.bind(lower);
        }
        if let Some((upper, _)) = bounds.upper {
            page_query = page_query.bind(upper);
        }
        let rows = page_query
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&mut *tx)
            .await
            .map_err(Self::read_err)?;

        tx.commit().await.map_err(Self::read_err)?;

        Ok(CallbackPage {
            data: rows
                .into_iter()
                .map(|row| row.into_callback(self.tz))
                .collect(),
            total: total as u64,
            limit,
            offset,
        })
    }

    async fn get_callback_by_id(&self, id: &str) -> Result<Option<Callback>, StorageError> {
        let row = sqlx::query_as::<_, CallbackRow>(
            "SELECT id, timestamp, route, method, headers, query, body, ip
             FROM callbacks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::read_err)?;

        Ok(row.map(|r| r.into_callback(self.tz)))
    }

    async fn delete_callback(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM callbacks WHERE id = $1")
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
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&stored.id)
        .bind(&stored.path)
        .bind(&stored.name)
        .bind(&stored.description)
        .bind(stored.created_at.with_timezone(&Utc))
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

        Ok(rows.into_iter().map(|r| r.into_route(self.tz)).collect())
    }

    async fn update_route(
        &self,
        id: &str,
        update: RouteUpdate,
    ) -> Result<Option<Route>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(Self::write_err)?;

        let existing = sqlx::query_as::<_, RouteRow>(
            "SELECT id, path, name, description, created_at, updated_at
             FROM routes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Self::read_err)?;
        if existing.is_none() {
            return Ok(None);
        }

        let mut sets: Vec<String> = Vec::new();
        let mut n = 0;
        let mut next = |column: &str| {
            n += 1;
            format!("{} = ${}", column, n)
        };
        if update.path.is_some() {
            sets.push(next("path"));
        }
        if update.name.is_some() {
            sets.push(next("name"));
        }
        if update.description.is_some() {
            sets.push(next("description"));
        }
        sets.push(next("updated_at"));

        let sql = format!(
            "UPDATE routes SET {} WHERE id = ${}",
            sets.join(", "),
            n + 1
        );
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
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Self::write_err)?;

        let row = sqlx::query_as::<_, RouteRow>(
            "SELECT id, path, name, description, created_at, updated_at
             FROM routes WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Self::read_err)?;

        tx.commit().await.map_err(Self::write_err)?;

        Ok(Some(row.into_route(self.tz)))
    }

    async fn delete_route(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM routes WHERE id = $1")
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
