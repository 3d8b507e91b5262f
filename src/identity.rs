//! Request identity capability.
//!
//! The authentication subsystem is an external collaborator; it resolves the
//! caller once per request and attaches an [`Identity`] to the request
//! extensions. An absent extension means the caller is anonymous. Stages
//! read the capability explicitly instead of probing the request for
//! attributes.

use axum::{body::Body, http::Request};

/// Authenticated caller, as resolved by the external auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    /// Tenant scoping is optional; staff accounts may carry none.
    pub tenant_id: Option<i64>,
}

impl Identity {
    pub fn new(user_id: i64, tenant_id: Option<i64>) -> Self {
        Self { user_id, tenant_id }
    }

    /// The identity attached to a request, if the caller is authenticated.
    pub fn of(request: &Request<Body>) -> Option<Identity> {
        request.extensions().get::<Identity>().copied()
    }
}
