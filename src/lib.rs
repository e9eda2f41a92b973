pub mod configuration;
pub mod error_handling;
pub mod storage;
pub mod web_interface;

pub use storage::storage_trait::Storage;
pub use storage::types::{
    Callback, CallbackDraft, CallbackFilter, CallbackPage, NewRoute, Route, RouteUpdate,
};
