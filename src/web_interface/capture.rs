//! Request capture: translates the parts of an inbound HTTP request into
//! a `CallbackDraft` for the storage backend to normalize and persist.

use std::collections::HashMap;
use std::net::SocketAddr;

use serde_json::{Map, Value};
use warp::http::{HeaderMap, Method};

use crate::storage::types::CallbackDraft;

pub fn draft_from_parts(
    method: &Method,
    tail: &str,
    headers: &HeaderMap,
    query: HashMap<String, String>,
    body: &[u8],
    remote: Option<SocketAddr>,
) -> CallbackDraft {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    CallbackDraft {
        route: normalized_route(tail),
        method: method.as_str().to_uppercase(),
        headers: headers_to_json(headers),
        query: query_to_json(query),
        body: body_to_json(content_type.as_deref(), body),
        ip: remote.map(|addr| addr.ip().to_string()).unwrap_or_default(),
    }
}

fn normalized_route(tail: &str) -> String {
    if tail.starts_with('/') {
        tail.to_string()
    } else {
        format!("/{}", tail)
    }
}

fn headers_to_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for (name, value) in headers.iter() {
        let text = match value.to_str() {
            Ok(text) => text.to_string(),
            Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
        };
        let key = name.as_str().to_string();
        match map.get_mut(&key) {
            // Repeated headers are joined the way proxies fold them
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&text);
            }
            _ => {
                map.insert(key, Value::String(text));
            }
        }
    }
    Value::Object(map)
}

fn query_to_json(query: HashMap<String, String>) -> Value {
    Value::Object(
        query
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
    )
}

/// Decode the request body into a JSON value. JSON payloads are stored as
/// parsed structures, form payloads as string maps, anything else as a
/// string; an empty body becomes an empty object.
fn body_to_json(content_type: Option<&str>, body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Object(Map::new());
    }

    if let Some(ct) = content_type {
        if ct.contains("x-www-form-urlencoded") {
            if let Ok(form) = serde_qs::from_bytes::<HashMap<String, String>>(body) {
                return query_to_json(form);
            }
        }
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(value) => value,
        Err(_) => Value::String(String::from_utf8_lossy(body).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                warp::http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_draft_from_json_request() {
        let headers = headers(&[("content-type", "application/json"), ("x-token", "abc")]);
        let mut query = HashMap::new();
        query.insert("a".to_string(), "1".to_string());

        let draft = draft_from_parts(
            &Method::POST,
            "hook",
            &headers,
            query,
            br#"{"a": 1, "b": [true, null]}"#,
            Some("10.0.0.1:55555".parse().unwrap()),
        );

        assert_eq!(draft.route, "/hook");
        assert_eq!(draft.method, "POST");
        assert_eq!(draft.body, json!({"a": 1, "b": [true, null]}));
        assert_eq!(draft.query, json!({"a": "1"}));
        assert_eq!(draft.headers["x-token"], json!("abc"));
        assert_eq!(draft.ip, "10.0.0.1");
    }

    #[test]
    fn test_empty_body_becomes_empty_object() {
        let draft = draft_from_parts(
            &Method::GET,
            "ping",
            &HeaderMap::new(),
            HashMap::new(),
            b"",
            None,
        );
        assert_eq!(draft.body, json!({}));
        assert_eq!(draft.ip, "");
    }

    #[test]
    fn test_form_body_parsed_to_map() {
        let headers = headers(&[(
            "content-type",
            "application/x-www-form-urlencoded; charset=utf-8",
        )]);
        let draft = draft_from_parts(
            &Method::POST,
            "form",
            &headers,
            HashMap::new(),
            b"name=hook&count=2",
            None,
        );
        assert_eq!(draft.body, json!({"name": "hook", "count": "2"}));
    }

    #[test]
    fn test_non_json_body_kept_as_string() {
        let draft = draft_from_parts(
            &Method::POST,
            "raw",
            &HeaderMap::new(),
            HashMap::new(),
            b"plain text payload",
            None,
        );
        assert_eq!(draft.body, json!("plain text payload"));
    }

    #[test]
    fn test_repeated_headers_joined() {
        let headers = headers(&[("x-multi", "one"), ("x-multi", "two")]);
        let draft = draft_from_parts(
            &Method::GET,
            "h",
            &headers,
            HashMap::new(),
            b"",
            None,
        );
        assert_eq!(draft.headers["x-multi"], json!("one, two"));
    }
}
