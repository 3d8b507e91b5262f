//! Response cache stage.
//!
//! Caches successful GET responses according to the rule table and serves
//! them until their TTL lapses. Store failures are swallowed: a broken
//! cache backend degrades to uncached responses, never to failed requests.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header::CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body::Body as HttpBody;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::identity::Identity;

use super::{
    CacheConfig, LruResponseStore, RuleTable,
    keys::build_key,
    store::{CacheEntry, ResponseStore},
};

/// Header marking whether a response was served from the cache.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

const POLLING_MARKER_HEADER: &str = "x-requested-with";
const POLLING_MARKER_VALUE: &str = "XMLHttpRequest";

const METRIC_CACHE_HIT_TOTAL: &str = "scudo_cache_hit_total";
const METRIC_CACHE_MISS_TOTAL: &str = "scudo_cache_miss_total";
const METRIC_CACHE_STORE_ERROR_TOTAL: &str = "scudo_cache_store_error_total";

/// Shared cache state for the middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub rules: Arc<RuleTable>,
    pub store: Arc<dyn ResponseStore>,
}

impl CacheState {
    /// State backed by the in-process LRU store.
    pub fn in_process(config: CacheConfig) -> Self {
        let rules = Arc::new(RuleTable::from_config(&config));
        let store = Arc::new(LruResponseStore::new(&config));
        Self {
            config,
            rules,
            store,
        }
    }
}

/// Response cache middleware.
///
/// Only GET requests to cacheable paths are considered; everything else is
/// delegated untouched. A hit is served verbatim with `X-Cache: HIT` and
/// the handler is not invoked. A miss delegates, and stores the response
/// only when it is a 200 with a non-streamed body within the size limit.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enabled {
        return next.run(request).await;
    }

    if request.method() != Method::GET {
        return next.run(request).await;
    }

    // Legacy heuristic: AJAX polling endpoints are identified by the
    // XMLHttpRequest marker plus a "poll"/"status" path substring. Kept
    // as observed in production traffic; do not widen or narrow it.
    if is_polling_request(&request) {
        return next.run(request).await;
    }

    let Some(ttl) = cache.rules.resolve(request.uri().path()).effective_ttl() else {
        return next.run(request).await;
    };

    let key = build_key(
        request.uri().path(),
        request.uri().query(),
        Identity::of(&request).as_ref(),
    );

    match cache.store.get(&key).await {
        Ok(Some(entry)) => {
            counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
            debug!(cache_key = %key, outcome = "hit", "serving cached response");
            return build_response(entry, "HIT");
        }
        Ok(None) => {}
        Err(err) => {
            // Fail-open: a broken store reads as a miss.
            counter!(METRIC_CACHE_STORE_ERROR_TOTAL).increment(1);
            warn!(cache_key = %key, error = %err, "cache store get failed, proceeding uncached");
        }
    }

    counter!(METRIC_CACHE_MISS_TOTAL).increment(1);
    debug!(cache_key = %key, outcome = "miss", "cache miss, executing handler");

    let response = next.run(request).await;

    if response.status() != StatusCode::OK {
        return response;
    }

    if is_streaming(&response) {
        return response;
    }

    if let Some(length) = HttpBody::size_hint(response.body()).exact() {
        if length > cache.config.body_limit_bytes as u64 {
            debug!(cache_key = %key, body_bytes = length, "response exceeds cacheable size, not stored");
            return response;
        }
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, cache.config.body_limit_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(cache_key = %key, error = %err, "response body collection failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect();
    let entry = CacheEntry::new(parts.status.as_u16(), headers, bytes.clone(), ttl);

    if let Err(err) = cache.store.set(key.clone(), entry).await {
        counter!(METRIC_CACHE_STORE_ERROR_TOTAL).increment(1);
        warn!(cache_key = %key, error = %err, "cache store set failed, serving uncached");
    }

    let mut response = Response::from_parts(parts, Body::from(bytes));
    response.headers_mut().insert(
        CACHE_STATUS_HEADER,
        HeaderValue::from_static("MISS"),
    );
    response
}

fn is_polling_request(request: &Request<Body>) -> bool {
    let marked = request
        .headers()
        .get(POLLING_MARKER_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == POLLING_MARKER_VALUE);
    if !marked {
        return false;
    }
    let path = request.uri().path();
    path.contains("poll") || path.contains("status")
}

/// A body without an exact size hint is being streamed or chunked; server-
/// sent events advertise themselves by content type before any bytes flow.
fn is_streaming(response: &Response) -> bool {
    let sse = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"));
    sse || HttpBody::size_hint(response.body()).exact().is_none()
}

/// Rebuild a response from a stored entry, marking the cache outcome.
fn build_response(entry: CacheEntry, outcome: &'static str) -> Response {
    let mut builder = Response::builder().status(entry.status);

    for (name, value) in entry.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }
    builder = builder.header(CACHE_STATUS_HEADER, HeaderValue::from_static(outcome));

    builder
        .body(Body::from(entry.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_request(path_and_query: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(path_and_query)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn polling_marker_alone_is_not_enough() {
        let mut request = get_request("/orders/order-list/");
        request.headers_mut().insert(
            POLLING_MARKER_HEADER,
            HeaderValue::from_static(POLLING_MARKER_VALUE),
        );
        assert!(!is_polling_request(&request));
    }

    #[test]
    fn polling_path_alone_is_not_enough() {
        let request = get_request("/jobs/poll/");
        assert!(!is_polling_request(&request));
    }

    #[test]
    fn marker_plus_poll_path_is_polling() {
        let mut request = get_request("/jobs/poll/");
        request.headers_mut().insert(
            POLLING_MARKER_HEADER,
            HeaderValue::from_static(POLLING_MARKER_VALUE),
        );
        assert!(is_polling_request(&request));
    }

    #[test]
    fn marker_plus_status_path_is_polling() {
        let mut request = get_request("/imports/status/");
        request.headers_mut().insert(
            POLLING_MARKER_HEADER,
            HeaderValue::from_static(POLLING_MARKER_VALUE),
        );
        assert!(is_polling_request(&request));
    }

    #[test]
    fn event_stream_responses_are_streaming() {
        let response = Response::builder()
            .header(CONTENT_TYPE, "text/event-stream")
            .body(Body::empty())
            .unwrap();
        assert!(is_streaming(&response));
    }

    #[test]
    fn buffered_responses_are_not_streaming() {
        let response = Response::builder()
            .header(CONTENT_TYPE, "text/html")
            .body(Body::from("buffered"))
            .unwrap();
        assert!(!is_streaming(&response));
    }

    #[test]
    fn cached_entry_rebuild_adds_outcome_marker() {
        let entry = CacheEntry::new(
            200,
            vec![("content-type".to_string(), "text/html".to_string())],
            bytes::Bytes::from("<html></html>"),
            std::time::Duration::from_secs(60),
        );
        let response = build_response(entry, "HIT");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CACHE_STATUS_HEADER).unwrap(),
            "HIT"
        );
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/html");
    }
}
