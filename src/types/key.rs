//! Request fingerprinting for caching and single-flight.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::Value;

use super::endpoint::Endpoint;

/// Opaque fingerprint identifying a request for caching and
/// single-flight purposes.
///
/// Derived from the endpoint (which encodes provider and request type)
/// and a canonicalized payload, so two semantically identical requests
/// produce equal keys regardless of JSON field order.
///
/// Uses `DefaultHasher` (SipHash): deterministic within a process
/// lifetime, which is all an in-memory cache needs. A shared backend
/// would want a cross-process stable hash instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey(u64);

impl RequestKey {
    /// Fingerprint a request from its endpoint and JSON payload.
    pub fn fingerprint(endpoint: Endpoint, payload: &Value) -> Self {
        let mut canonical = String::new();
        canonicalize(payload, &mut canonical);

        let mut hasher = DefaultHasher::new();
        endpoint.as_str().hash(&mut hasher);
        endpoint.request_type().hash(&mut hasher);
        canonical.hash(&mut hasher);
        Self(hasher.finish())
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Append a canonical rendering of `value`: object keys sorted, no
/// whitespace. Arrays keep their order — position is meaningful.
fn canonicalize(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*k).clone()).to_string());
                out.push(':');
                canonicalize(&map[*k], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                canonicalize(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
