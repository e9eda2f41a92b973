//! Helpers for building `CallbackFilter` values.
//!
//! This module re-exports `CallbackFilter` and provides convenience
//! builders for common query criteria.

use chrono::NaiveDate;

// Re-export CallbackFilter
pub use crate::storage::types::CallbackFilter;

/// Build a `CallbackFilter` that matches callbacks by exact route.
#[allow(dead_code)]
pub fn by_route<S: Into<String>>(route: S) -> CallbackFilter {
    CallbackFilter {
        route: Some(route.into()),
        ..Default::default()
    }
}

/// Build a `CallbackFilter` for a single calendar day.
#[allow(dead_code)]
pub fn on_date(date: NaiveDate) -> CallbackFilter {
    CallbackFilter {
        date: Some(date),
        ..Default::default()
    }
}

/// Build a `CallbackFilter` selecting a pagination window.
#[allow(dead_code)]
pub fn page(limit: usize, offset: usize) -> CallbackFilter {
    CallbackFilter {
        limit: Some(limit),
        offset: Some(offset),
        ..Default::default()
    }
}
