//! Cache key composition.
//!
//! A cache key identifies one cacheable response variant and is built from
//! exactly three inputs: the raw request path, the query parameters, and the
//! resolved request identity. Composition is pure; identical inputs always
//! yield identical keys, and nothing else about the request may leak in.
//!
//! Shape: `page:<path>[:<digest>][:u:<user>:b:<tenant>]` where `<digest>` is
//! the first 8 hex characters of a SHA-256 over the sorted, URL-encoded
//! query string (present only when the request has query parameters) and the
//! identity suffix is present only for authenticated callers with a tenant.

use sha2::{Digest, Sha256};
use url::form_urlencoded;

use crate::identity::Identity;

const KEY_PREFIX: &str = "page";
const QUERY_DIGEST_LEN: usize = 8;

/// Build the cache key for a request.
pub fn build_key(path: &str, query: Option<&str>, identity: Option<&Identity>) -> String {
    let mut key = format!("{KEY_PREFIX}:{path}");

    if let Some(digest) = query.and_then(query_digest) {
        key.push(':');
        key.push_str(&digest);
    }

    if let Some(identity) = identity {
        if let Some(tenant_id) = identity.tenant_id {
            key.push_str(":u:");
            key.push_str(&identity.user_id.to_string());
            key.push_str(":b:");
            key.push_str(&tenant_id.to_string());
        }
    }

    key
}

/// Digest of the query string, or `None` when it carries no parameters.
///
/// Pairs are decoded, sorted by (name, value), and re-encoded before
/// hashing so parameter order on the wire cannot split cache entries.
fn query_digest(query: &str) -> Option<String> {
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort();

    let mut canonical = form_urlencoded::Serializer::new(String::new());
    for (name, value) in &pairs {
        canonical.append_pair(name, value);
    }

    let mut hasher = Sha256::new();
    hasher.update(canonical.finish().as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(QUERY_DIGEST_LEN);
    Some(digest)
}
