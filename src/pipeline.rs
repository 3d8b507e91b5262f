//! Stage composition.
//!
//! The pipeline order is fixed and encoded in exactly one place, this
//! function. From the outside in:
//!
//! 1. request context (ambient)
//! 2. response logging (ambient)
//! 3. connection governor, outermost of the stages so limits are enforced
//!    and connections released even when the cache answers the request
//! 4. response cache
//! 5. query cost observer, innermost so cache hits are not counted as
//!    handler query work
//! 6. the business handler
//!
//! axum applies the last-added layer first, so the layers below are added
//! in reverse.

use axum::{Router, middleware};

use crate::cache::{CacheState, response_cache_layer};
use crate::governor::{GovernorState, connection_governor_layer};
use crate::http::{log_responses, set_request_context};
use crate::observer::{ObserverState, query_observer_layer};

/// Wrap a router with the scudo stages in their fixed order.
pub fn apply_stages(
    router: Router,
    governor: GovernorState,
    cache: CacheState,
    observer: ObserverState,
) -> Router {
    router
        .layer(middleware::from_fn_with_state(
            observer,
            query_observer_layer,
        ))
        .layer(middleware::from_fn_with_state(cache, response_cache_layer))
        .layer(middleware::from_fn_with_state(
            governor,
            connection_governor_layer,
        ))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}
