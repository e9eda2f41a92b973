//! IP allow-list admission check for the dashboard and management API.

use std::net::SocketAddr;
use std::sync::Arc;

use log::warn;
use warp::{Filter, Rejection};

/// Rejection raised for clients outside the allow-list.
#[derive(Debug)]
pub struct Forbidden;

impl warp::reject::Reject for Forbidden {}

/// Check a client address against the configured allow-list. IPv6
/// loopback and IPv4-mapped addresses are normalized before matching, and
/// a `localhost` entry matches loopback.
pub fn is_allowed(remote: Option<SocketAddr>, allowlist: &[String]) -> bool {
    let Some(addr) = remote else {
        return false;
    };
    let raw = addr.ip().to_string();
    let normalized = if raw == "::1" {
        "127.0.0.1".to_string()
    } else if let Some(stripped) = raw.strip_prefix("::ffff:") {
        stripped.to_string()
    } else {
        raw.clone()
    };

    allowlist.iter().any(|entry| {
        let entry = entry.trim();
        if entry == "localhost" && normalized == "127.0.0.1" {
            return true;
        }
        entry == normalized || entry == raw
    })
}

/// Filter that rejects requests from addresses outside the allow-list.
pub fn require_allowed(
    allowlist: Arc<Vec<String>>,
) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::addr::remote()
        .and_then(move |remote: Option<SocketAddr>| {
            let allowlist = allowlist.clone();
            async move {
                if is_allowed(remote, &allowlist) {
                    Ok(())
                } else {
                    warn!(
                        "Blocked request from non-whitelisted IP: {}",
                        remote
                            .map(|a| a.ip().to_string())
                            .unwrap_or_else(|| "unknown".to_string())
                    );
                    Err(warp::reject::custom(Forbidden))
                }
            }
        })
        .untuple_one()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(ip: &str) -> Option<SocketAddr> {
        Some(format!("{}:80", ip).parse().unwrap())
    }

    fn addr6(ip: &str) -> Option<SocketAddr> {
        Some(format!("[{}]:80", ip).parse().unwrap())
    }

    #[test]
    fn test_exact_match() {
        let allow = vec!["10.0.0.1".to_string()];
        assert!(is_allowed(addr("10.0.0.1"), &allow));
        assert!(!is_allowed(addr("10.0.0.2"), &allow));
    }

    #[test]
    fn test_localhost_entry_matches_loopback() {
        let allow = vec!["localhost".to_string()];
        assert!(is_allowed(addr("127.0.0.1"), &allow));
        assert!(is_allowed(addr6("::1"), &allow));
        assert!(!is_allowed(addr("192.168.1.10"), &allow));
    }

    #[test]
    fn test_ipv4_mapped_normalized() {
        let allow = vec!["10.0.0.1".to_string()];
        assert!(is_allowed(addr6("::ffff:10.0.0.1"), &allow));
    }

    #[test]
    fn test_missing_remote_denied() {
        let allow = vec!["127.0.0.1".to_string()];
        assert!(!is_allowed(None, &allow));
    }
}
