//! Web vs. mobile client detection.

use axum::extract::FromRequestParts;
use axum::http::{header::USER_AGENT, request::Parts, HeaderMap};
use std::convert::Infallible;

/// Explicit client type header.
pub const CLIENT_TYPE_HEADER: &str = "x-client-type";

/// User agent fragments of the mobile app's HTTP stacks.
const MOBILE_AGENT_MARKERS: &[&str] = &["okhttp", "dart", "cfnetwork", "android", "iphone"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Web,
    Mobile,
}

impl ClientKind {
    pub fn detect(headers: &HeaderMap) -> Self {
        let explicit = headers
            .get(CLIENT_TYPE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase());
        match explicit.as_deref() {
            Some("mobile") => return ClientKind::Mobile,
            Some("web") => return ClientKind::Web,
            _ => {}
        }

        let agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if MOBILE_AGENT_MARKERS.iter().any(|m| agent.contains(m)) {
            ClientKind::Mobile
        } else {
            ClientKind::Web
        }
    }

    /// Page size used when a request does not set one.
    pub fn default_page_limit(&self) -> usize {
        match self {
            ClientKind::Web => 50,
            ClientKind::Mobile => 20,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientKind {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientKind::detect(&parts.headers))
    }
}
