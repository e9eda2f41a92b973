use chrono::{DateTime, DurationRound, FixedOffset, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default page size when a query does not specify one.
pub const DEFAULT_LIMIT: usize = 100;

/// One captured inbound webhook request.
///
/// Created exactly once per inbound request and immutable afterwards,
/// except for deletion. The nested `headers`/`query`/`body` structures are
/// stored losslessly as JSON values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Callback {
    pub id: String,
    /// Capture instant, normalized to the configured time zone.
    pub timestamp: DateTime<FixedOffset>,
    pub route: String,
    pub method: String,
    pub headers: Value,
    pub query: Value,
    pub body: Value,
    pub ip: String,
}

/// Raw callback data handed over by the HTTP layer. The storage backend
/// assigns the id and timestamp on save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackDraft {
    pub route: String,
    pub method: String,
    pub headers: Value,
    pub query: Value,
    pub body: Value,
    pub ip: String,
}

/// A registered, named callback endpoint. `path` is unique across all
/// routes; uniqueness is enforced by the backend at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<FixedOffset>>,
}

/// Fields required to register a new route.
#[derive(Debug, Clone)]
pub struct NewRoute {
    pub path: String,
    pub name: String,
    pub description: Option<String>,
}

/// Partial route update; only `Some` fields are applied.
#[derive(Debug, Clone, Default)]
pub struct RouteUpdate {
    pub path: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Callback query criteria.
///
/// `date` selects a single calendar day: the flat-file backend reads that
/// day's partition, the SQL backends expand it to the day's time range in
/// the configured zone. `start`/`end` are inclusive instant bounds honored
/// by the SQL backends only. Absent fields mean "no constraint".
#[derive(Debug, Clone, Default)]
pub struct CallbackFilter {
    pub route: Option<String>,
    pub date: Option<NaiveDate>,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl CallbackFilter {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

/// One page of callbacks plus the total size of the filtered set,
/// independent of the pagination window.
#[derive(Debug, Serialize)]
pub struct CallbackPage {
    pub data: Vec<Callback>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

/// Generate a collision-resistant record id. Ids are never reused, even
/// after deletion.
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current instant in the given zone, truncated to microseconds — the
/// finest precision every backend can store and return unchanged.
pub fn now_in(tz: Tz) -> DateTime<FixedOffset> {
    let now = Utc::now();
    let now = now
        .duration_trunc(chrono::Duration::microseconds(1))
        .unwrap_or(now);
    now.with_timezone(&tz).fixed_offset()
}

/// Today's calendar date in the given zone.
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_ids_are_unique() {
        let a = new_record_id();
        let b = new_record_id();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn test_filter_defaults() {
        let filter = CallbackFilter::default();
        assert_eq!(filter.limit(), 100);
        assert_eq!(filter.offset(), 0);
    }

    #[test]
    fn test_callback_json_shape() {
        let callback = Callback {
            id: new_record_id(),
            timestamp: now_in(chrono_tz::UTC),
            route: "/hook".into(),
            method: "POST".into(),
            headers: serde_json::json!({"x": "1"}),
            query: serde_json::json!({}),
            body: serde_json::json!({"a": 1}),
            ip: "10.0.0.1".into(),
        };
        let value = serde_json::to_value(&callback).unwrap();
        assert_eq!(value["body"], serde_json::json!({"a": 1}));
        assert!(value["timestamp"].is_string());
        let back: Callback = serde_json::from_value(value).unwrap();
        assert_eq!(back, callback);
    }

    #[test]
    fn test_route_hides_updated_at_until_set() {
        let route = Route {
            id: new_record_id(),
            path: "/hook".into(),
            name: "Hook".into(),
            description: String::new(),
            created_at: now_in(chrono_tz::UTC),
            updated_at: None,
        };
        let value = serde_json::to_value(&route).unwrap();
        assert!(value.get("updatedAt").is_none());
        assert!(value.get("createdAt").is_some());
    }
}
