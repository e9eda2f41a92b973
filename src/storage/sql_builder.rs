//! Query assembly shared by the SQL backends.
//!
//! The three engines differ in placeholder syntax and column types but
//! share the same filtering contract: optional route equality plus
//! optional time bounds, count-then-page with a stable descending order.
//! The WHERE clause text and the bound-resolution logic live here so each
//! backend only supplies engine-specific binding and row decoding.

use chrono::{DateTime, LocalResult, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use log::error;
use serde_json::Value;

use crate::error_handling::types::StorageError;
use crate::storage::types::CallbackFilter;

/// Placeholder syntax of the target engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `?` — SQLite and MySQL
    Question,
    /// `$1`, `$2`, ... — PostgreSQL
    Numbered,
}

impl Placeholder {
    fn nth(&self, n: usize) -> String {
        match self {
            Placeholder::Question => "?".to_string(),
            Placeholder::Numbered => format!("${}", n),
        }
    }
}

/// Filter time bounds resolved to UTC instants.
///
/// Explicit `start`/`end` bounds are inclusive. A bare `date` expands to
/// the day's range in the configured zone: an inclusive lower bound at
/// local midnight and an exclusive upper bound at the next local midnight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBounds {
    pub lower: Option<DateTime<Utc>>,
    /// Bound instant and whether it is inclusive.
    pub upper: Option<(DateTime<Utc>, bool)>,
}

/// Resolve a filter's `date`/`start`/`end` fields into UTC bounds.
/// Explicit instant bounds win over the day expansion.
pub fn resolve_bounds(filter: &CallbackFilter, tz: Tz) -> TimeBounds {
    let mut lower = filter.start.map(|dt| dt.with_timezone(&Utc));
    let mut upper = filter.end.map(|dt| (dt.with_timezone(&Utc), true));

    if let Some(date) = filter.date {
        if lower.is_none() {
            lower = Some(local_day_start(date, tz));
        }
        if upper.is_none() {
            if let Some(next) = date.succ_opt() {
                upper = Some((local_day_start(next, tz), false));
            }
        }
    }

    TimeBounds { lower, upper }
}

// Midnight can be skipped or repeated around DST transitions; take the
// earliest valid interpretation.
fn local_day_start(date: chrono::NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => Utc.from_utc_datetime(&naive),
    }
}

/// Count and page statements for one filtered callback query. Bind order
/// is fixed: route, lower bound, upper bound, then limit and offset for
/// the page statement.
#[derive(Debug)]
pub struct CallbackSelect {
    pub count_sql: String,
    pub page_sql: String,
}

pub fn callback_select(
    filter: &CallbackFilter,
    bounds: &TimeBounds,
    placeholder: Placeholder,
) -> CallbackSelect {
    let mut clauses: Vec<String> = Vec::new();
    let mut n = 0;

    if filter.route.is_some() {
        n += 1;
        clauses.push(format!("route = {}", placeholder.nth(n)));
    }
    if bounds.lower.is_some() {
        n += 1;
        clauses.push(format!("timestamp >= {}", placeholder.nth(n)));
    }
    if let Some((_, inclusive)) = bounds.upper {
        n += 1;
        let op = if inclusive { "<=" } else { "<" };
        clauses.push(format!("timestamp {} {}", op, placeholder.nth(n)));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM callbacks{}", where_sql);
    let page_sql = format!(
        "SELECT id, timestamp, route, method, headers, query, body, ip \
         FROM callbacks{} ORDER BY timestamp DESC, id LIMIT {} OFFSET {}",
        where_sql,
        placeholder.nth(n + 1),
        placeholder.nth(n + 2)
    );

    CallbackSelect {
        count_sql,
        page_sql,
    }
}

/// Fixed-width UTC text representation, lexicographically sortable. Used
/// for the SQLite TEXT timestamp column.
pub fn utc_text(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Encode a JSON value for a TEXT column.
pub fn encode_json(value: &Value) -> String {
    value.to_string()
}

/// Decode a TEXT column back into a JSON value. Absent columns decode to
/// an empty object.
pub fn decode_json(text: Option<String>) -> Result<Value, StorageError> {
    match text {
        None => Ok(Value::Object(serde_json::Map::new())),
        Some(t) if t.is_empty() => Ok(Value::Object(serde_json::Map::new())),
        Some(t) => serde_json::from_str(&t).map_err(|e| {
            error!("Corrupt JSON column: {}", e);
            StorageError::ReadFailed
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::callback_filter;

    #[test]
    fn test_no_filters_no_where() {
        let filter = CallbackFilter::default();
        let bounds = resolve_bounds(&filter, chrono_tz::UTC);
        let select = callback_select(&filter, &bounds, Placeholder::Question);
        assert_eq!(select.count_sql, "SELECT COUNT(*) FROM callbacks");
        assert!(select.page_sql.contains("ORDER BY timestamp DESC, id LIMIT ? OFFSET ?"));
        assert!(!select.page_sql.contains("WHERE"));
    }

    #[test]
    fn test_route_and_range_clauses_numbered() {
        let now = chrono::Utc::now().fixed_offset();
        let filter = CallbackFilter {
            route: Some("/hook".into()),
            start: Some(now),
            end: Some(now),
            ..Default::default()
        };
        let bounds = resolve_bounds(&filter, chrono_tz::UTC);
        let select = callback_select(&filter, &bounds, Placeholder::Numbered);
        assert_eq!(
            select.count_sql,
            "SELECT COUNT(*) FROM callbacks WHERE route = $1 AND timestamp >= $2 AND timestamp <= $3"
        );
        assert!(select.page_sql.contains("LIMIT $4 OFFSET $5"));
    }

    #[test]
    fn test_date_expands_to_half_open_day_range() {
        let date = chrono::NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        let filter = callback_filter::on_date(date);
        let bounds = resolve_bounds(&filter, chrono_tz::Europe::Zurich);
        let lower = bounds.lower.unwrap();
        let (upper, inclusive) = bounds.upper.unwrap();
        assert!(!inclusive);
        assert_eq!(upper - lower, chrono::Duration::hours(24));
        // Local midnight in CET is 23:00 UTC the previous day
        assert_eq!(utc_text(lower), "2026-03-14T23:00:00.000000Z");

        let select = callback_select(&filter, &bounds, Placeholder::Question);
        assert!(select.count_sql.contains("timestamp >= ?"));
        assert!(select.count_sql.contains("timestamp < ?"));
    }

    #[test]
    fn test_explicit_bounds_win_over_date() {
        let now = chrono::Utc::now().fixed_offset();
        let date = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let filter = CallbackFilter {
            date: Some(date),
            start: Some(now),
            ..Default::default()
        };
        let bounds = resolve_bounds(&filter, chrono_tz::UTC);
        assert_eq!(bounds.lower, Some(now.with_timezone(&chrono::Utc)));
        // Upper still comes from the date expansion
        assert!(matches!(bounds.upper, Some((_, false))));
    }

    #[test]
    fn test_json_text_roundtrip() {
        let value = serde_json::json!({"a": [1, 2.5, "x", null, {"b": false}]});
        let decoded = decode_json(Some(encode_json(&value))).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(
            decode_json(None).unwrap(),
            serde_json::json!({})
        );
    }

    #[test]
    fn test_utc_text_sorts_lexicographically() {
        let earlier = chrono::Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();
        let later = earlier + chrono::Duration::microseconds(1);
        assert!(utc_text(earlier) < utc_text(later));
    }
}
