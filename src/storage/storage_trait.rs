//! Storage Trait
//!
//! This module defines the `Storage` trait, which provides a uniform
//! interface over the interchangeable persistence backends.
//!
//! Implementors of this trait are responsible for:
//! - Assigning ids and timestamps to captured callbacks and persisting them
//! - Filtering, sorting and paginating stored callbacks
//! - Managing registered route definitions, including path uniqueness
//!
//! All backends must present identical query semantics: results are always
//! ordered by descending timestamp, `total` reflects the filtered set
//! independent of the pagination window, and absent filters mean "no
//! constraint".

use async_trait::async_trait;

use crate::error_handling::types::StorageError;
use crate::storage::types::{
    Callback, CallbackDraft, CallbackFilter, CallbackPage, NewRoute, Route, RouteUpdate,
};

/// The `Storage` trait defines the interface for callback and route
/// storage backends.
///
/// A single backend instance is constructed at startup and shared for the
/// process lifetime. "Record does not exist" is reported through `Option`
/// or `bool` results, never as an error.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Idempotent medium setup (directories/files or tables/indexes).
    /// A failure here is fatal: the process must not start serving.
    async fn initialize(&self) -> Result<(), StorageError>;

    /// Assigns id and timestamp, persists, and returns the stored record
    /// with all nested structures intact.
    async fn save_callback(&self, draft: CallbackDraft) -> Result<Callback, StorageError>;

    /// Retrieves callbacks matching `filter`, newest first.
    async fn get_callbacks(&self, filter: CallbackFilter) -> Result<CallbackPage, StorageError>;

    async fn get_callback_by_id(&self, id: &str) -> Result<Option<Callback>, StorageError>;

    /// Returns true iff a record existed and was removed.
    async fn delete_callback(&self, id: &str) -> Result<bool, StorageError>;

    /// Registers a route. Fails with `StorageError::DuplicatePath` when the
    /// path is already registered; stored state is unchanged in that case.
    async fn save_route(&self, route: NewRoute) -> Result<Route, StorageError>;

    /// All registered routes, newest-created first.
    async fn get_routes(&self) -> Result<Vec<Route>, StorageError>;

    /// Applies the supplied fields only and always refreshes `updated_at`.
    async fn update_route(
        &self,
        id: &str,
        update: RouteUpdate,
    ) -> Result<Option<Route>, StorageError>;

    async fn delete_route(&self, id: &str) -> Result<bool, StorageError>;

    /// Calendar days for which callback data exists, newest first. Only
    /// meaningful for day-partitioned backends; the default is empty.
    async fn get_callback_dates(&self) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }

    /// Releases held connections or handles; safe to call even if the
    /// backend never opened any.
    async fn close(&self);
}
