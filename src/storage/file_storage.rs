use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, error, info};

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::Storage;
use crate::storage::types::{
    new_record_id, now_in, today_in, Callback, CallbackDraft, CallbackFilter, CallbackPage,
    NewRoute, Route, RouteUpdate,
};

/// Flat-file backend: callbacks are partitioned into one JSON file per
/// calendar day (in the configured zone) under `<base>/callbacks/`, routes
/// live in a single `<base>/routes.json`.
///
/// Each write reads the whole target day's file, mutates the in-memory
/// sequence and rewrites it. Queries without an explicit date see only
/// today's partition; callers needing historical data must pass a date.
pub struct FileStorage {
    base_path: PathBuf,
    tz: chrono_tz::Tz,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(base_path: P, tz: chrono_tz::Tz) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            tz,
        }
    }

    fn callbacks_dir(&self) -> PathBuf {
        self.base_path.join("callbacks")
    }

    fn routes_file(&self) -> PathBuf {
        self.base_path.join("routes.json")
    }

    fn day_file(&self, date: NaiveDate) -> PathBuf {
        self.callbacks_dir()
            .join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    fn read_day(&self, date: NaiveDate) -> Result<Vec<Callback>, StorageError> {
        let path = self.day_file(date);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            // A day without captures simply has no file
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                return Err(StorageError::ReadFailed);
            }
        };
        serde_json::from_str(&content).map_err(|e| {
            error!("Corrupt callback file {}: {}", path.display(), e);
            StorageError::ReadFailed
        })
    }

    fn write_day(&self, date: NaiveDate, callbacks: &[Callback]) -> Result<(), StorageError> {
        fs::create_dir_all(self.callbacks_dir()).map_err(|e| {
            error!("Failed to create {}: {}", self.callbacks_dir().display(), e);
            StorageError::WriteFailed
        })?;
        let path = self.day_file(date);
        let json = serde_json::to_string_pretty(callbacks).map_err(|e| {
            error!("Failed to encode callbacks: {}", e);
            StorageError::WriteFailed
        })?;
        fs::write(&path, json).map_err(|e| {
            error!("Failed to write {}: {}", path.display(), e);
            StorageError::WriteFailed
        })?;
        debug!("Wrote {} callback(s) to {}", callbacks.len(), path.display());
        Ok(())
    }

    fn read_routes(&self) -> Result<Vec<Route>, StorageError> {
        let path = self.routes_file();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                return Err(StorageError::ReadFailed);
            }
        };
        serde_json::from_str(&content).map_err(|e| {
            error!("Corrupt routes file {}: {}", path.display(), e);
            StorageError::ReadFailed
        })
    }

    fn write_routes(&self, routes: &[Route]) -> Result<(), StorageError> {
        let path = self.routes_file();
        let json = serde_json::to_string_pretty(routes).map_err(|e| {
            error!("Failed to encode routes: {}", e);
            StorageError::WriteFailed
        })?;
        fs::write(&path, json).map_err(|e| {
            error!("Failed to write {}: {}", path.display(), e);
            StorageError::WriteFailed
        })
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn initialize(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.callbacks_dir()).map_err(|e| {
            error!(
                "Failed to create data directory {}: {}",
                self.callbacks_dir().display(),
                e
            );
            StorageError::WriteFailed
        })?;
        if !self.routes_file().exists() {
            self.write_routes(&[])?;
        }
        info!("FileStorage initialized at {}", self.base_path.display());
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

        let today = today_in(self.tz);
        let mut callbacks = self.read_day(today)?;
        callbacks.push(callback.clone());
        self.write_day(today, &callbacks)?;

        Ok(callback)
    }

    async fn get_callbacks(&self, filter: CallbackFilter) -> Result<CallbackPage, StorageError> {
        let date = filter.date.unwrap_or_else(|| today_in(self.tz));
        let mut callbacks = self.read_day(date)?;

        if let Some(ref route) = filter.route {
            callbacks.retain(|cb| &cb.route == route);
        }

        // Stable sort keeps insertion order for equal timestamps
        callbacks.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let total = callbacks.len() as u64;
        let limit = filter.limit();
        let offset = filter.offset();
        let data: Vec<Callback> = callbacks.into_iter().skip(offset).take(limit).collect();

        Ok(CallbackPage {
            data,
            total,
            limit,
            offset,
        })
    }

    async fn get_callback_by_id(&self, id: &str) -> Result<Option<Callback>, StorageError> {
        let callbacks = self.read_day(today_in(self.tz))?;
        Ok(callbacks.into_iter().find(|cb| cb.id == id))
    }

    async fn delete_callback(&self, id: &str) -> Result<bool, StorageError> {
        let today = today_in(self.tz);
        let mut callbacks = self.read_day(today)?;
        let before = callbacks.len();
        callbacks.retain(|cb| cb.id != id);
        if callbacks.len() == before {
            return Ok(false);
        }
        self.write_day(today, &callbacks)?;
        Ok(true)
    }

    async fn save_route(&self, route: NewRoute) -> Result<Route, StorageError> {
        let mut routes = self.read_routes()?;
        if routes.iter().any(|r| r.path == route.path) {
            return Err(StorageError::DuplicatePath);
        }

        let stored = Route {
            id: new_record_id(),
            path: route.path,
            name: route.name,
            description: route.description.unwrap_or_default(),
            created_at: now_in(self.tz),
            updated_at: None,
        };
        routes.push(stored.clone());
        self.write_routes(&routes)?;
        info!("Registered route {} ({})", stored.path, stored.id);

        Ok(stored)
    }

    async fn get_routes(&self) -> Result<Vec<Route>, StorageError> {
        let mut routes = self.read_routes()?;
        routes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(routes)
    }

    async fn update_route(
        &self,
        id: &str,
        update: RouteUpdate,
    ) -> Result<Option<Route>, StorageError> {
        let mut routes = self.read_routes()?;
        let Some(index) = routes.iter().position(|r| r.id == id) else {
            return Ok(None);
        };

        if let Some(ref path) = update.path {
            if routes.iter().any(|r| r.id != id && &r.path == path) {
                return Err(StorageError::DuplicatePath);
            }
        }

        let route = &mut routes[index];
        if let Some(path) = update.path {
            route.path = path;
        }
        if let Some(name) = update.name {
            route.name = name;
        }
        if let Some(description) = update.description {
            route.description = description;
        }
        route.updated_at = Some(now_in(self.tz));

        let updated = route.clone();
        self.write_routes(&routes)?;
        Ok(Some(updated))
    }

    async fn delete_route(&self, id: &str) -> Result<bool, StorageError> {
        let mut routes = self.read_routes()?;
        let before = routes.len();
        routes.retain(|r| r.id != id);
        if routes.len() == before {
            return Ok(false);
        }
        self.write_routes(&routes)?;
        Ok(true)
    }

    async fn get_callback_dates(&self) -> Result<Vec<String>, StorageError> {
        let dir = self.callbacks_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                error!("Failed to read {}: {}", dir.display(), e);
                return Err(StorageError::ReadFailed);
            }
        };

        let mut dates: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                error!("Dir entry error: {}", e);
                StorageError::ReadFailed
            })?;
            let name = entry.file_name();
            if let Some(date) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                dates.push(date.to_string());
            }
        }
        dates.sort();
        dates.reverse();
        Ok(dates)
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::callback_filter;
    use serde_json::json;
    use tempfile::TempDir;

    fn draft(route: &str, body: serde_json::Value) -> CallbackDraft {
        CallbackDraft {
            route: route.into(),
            method: "POST".into(),
            headers: json!({"x": "1"}),
            query: json!({}),
            body,
            ip: "10.0.0.1".into(),
        }
    }

    async fn temp_storage() -> (TempDir, FileStorage) {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path(), chrono_tz::UTC);
        storage.initialize().await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_save_and_roundtrip() {
        let (_dir, storage) = temp_storage().await;
        let saved = storage
            .save_callback(draft("/hook", json!({"a": 1})))
            .await
            .unwrap();
        assert!(!saved.id.is_empty());

        let found = storage.get_callback_by_id(&saved.id).await.unwrap().unwrap();
        assert_eq!(found.body, json!({"a": 1}));
        assert_eq!(found.headers, json!({"x": "1"}));
        assert_eq!(found.timestamp, saved.timestamp);
    }

    #[tokio::test]
    async fn test_empty_store_reads_empty() {
        let (_dir, storage) = temp_storage().await;
        let page = storage.get_callbacks(CallbackFilter::default()).await.unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.total, 0);
        assert!(storage.get_callback_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_descending_order() {
        let (_dir, storage) = temp_storage().await;
        for i in 0..5 {
            storage
                .save_callback(draft("/hook", json!({"n": i})))
                .await
                .unwrap();
        }
        let page = storage.get_callbacks(CallbackFilter::default()).await.unwrap();
        assert_eq!(page.data.len(), 5);
        for pair in page.data.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_filter_and_pagination_totals() {
        let (_dir, storage) = temp_storage().await;
        for _ in 0..150 {
            storage.save_callback(draft("/a", json!({}))).await.unwrap();
        }
        for _ in 0..10 {
            storage.save_callback(draft("/b", json!({}))).await.unwrap();
        }

        let mut filter = callback_filter::by_route("/a");
        filter.limit = Some(50);
        filter.offset = Some(100);
        let page = storage.get_callbacks(filter).await.unwrap();
        assert_eq!(page.data.len(), 50);
        assert_eq!(page.total, 150);
        assert_eq!(page.limit, 50);
        assert_eq!(page.offset, 100);
        assert!(page.data.iter().all(|cb| cb.route == "/a"));
    }

    #[tokio::test]
    async fn test_date_filter_selects_partition() {
        let (_dir, storage) = temp_storage().await;
        storage.save_callback(draft("/hook", json!({}))).await.unwrap();

        let today = today_in(chrono_tz::UTC);
        let page = storage
            .get_callbacks(callback_filter::on_date(today))
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        let yesterday = today.pred_opt().unwrap();
        let page = storage
            .get_callbacks(callback_filter::on_date(yesterday))
            .await
            .unwrap();
        assert_eq!(page.total, 0);

        let dates = storage.get_callback_dates().await.unwrap();
        assert_eq!(dates, vec![today.format("%Y-%m-%d").to_string()]);
    }

    #[tokio::test]
    async fn test_delete_callback() {
        let (_dir, storage) = temp_storage().await;
        let saved = storage.save_callback(draft("/hook", json!({}))).await.unwrap();

        assert!(!storage.delete_callback("missing").await.unwrap());
        assert!(storage.delete_callback(&saved.id).await.unwrap());
        assert!(storage.get_callback_by_id(&saved.id).await.unwrap().is_none());
        assert!(!storage.delete_callback(&saved.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_route_path_rejected() {
        let (_dir, storage) = temp_storage().await;
        storage
            .save_route(NewRoute {
                path: "/hook".into(),
                name: "Hook".into(),
                description: None,
            })
            .await
            .unwrap();

        let err = storage
            .save_route(NewRoute {
                path: "/hook".into(),
                name: "Other".into(),
                description: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::DuplicatePath);

        let routes = storage.get_routes().await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name, "Hook");
    }

    #[tokio::test]
    async fn test_update_route_partial() {
        let (_dir, storage) = temp_storage().await;
        let route = storage
            .save_route(NewRoute {
                path: "/hook".into(),
                name: "Hook".into(),
                description: Some("original".into()),
            })
            .await
            .unwrap();
        assert!(route.updated_at.is_none());

        let updated = storage
            .update_route(
                &route.id,
                RouteUpdate {
                    name: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.path, "/hook");
        assert_eq!(updated.description, "original");
        assert_eq!(updated.created_at, route.created_at);
        assert!(updated.updated_at.is_some());

        assert!(storage
            .update_route("missing", RouteUpdate::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_route_path_collision() {
        let (_dir, storage) = temp_storage().await;
        storage
            .save_route(NewRoute {
                path: "/a".into(),
                name: "A".into(),
                description: None,
            })
            .await
            .unwrap();
        let b = storage
            .save_route(NewRoute {
                path: "/b".into(),
                name: "B".into(),
                description: None,
            })
            .await
            .unwrap();

        let err = storage
            .update_route(
                &b.id,
                RouteUpdate {
                    path: Some("/a".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::DuplicatePath);
    }

    #[tokio::test]
    async fn test_routes_newest_first() {
        let (_dir, storage) = temp_storage().await;
        for path in ["/one", "/two", "/three"] {
            storage
                .save_route(NewRoute {
                    path: path.into(),
                    name: path.trim_start_matches('/').into(),
                    description: None,
                })
                .await
                .unwrap();
        }
        let routes = storage.get_routes().await.unwrap();
        assert_eq!(routes.len(), 3);
        for pair in routes.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn test_delete_route() {
        let (_dir, storage) = temp_storage().await;
        let route = storage
            .save_route(NewRoute {
                path: "/hook".into(),
                name: "Hook".into(),
                description: None,
            })
            .await
            .unwrap();
        assert!(!storage.delete_route("missing").await.unwrap());
        assert!(storage.delete_route(&route.id).await.unwrap());
        assert!(storage.get_routes().await.unwrap().is_empty());
    }
}
