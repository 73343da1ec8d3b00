//! Caller network details for audit entries.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

/// Client address and user agent, taken from request headers.
///
/// The address is the first entry of `X-Forwarded-For`, falling back to
/// `X-Real-IP`. Both are trusted as set by the fronting proxy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip_address = header(parts, "x-forwarded-for")
            .and_then(|list| {
                list.split(',')
                    .next()
                    .map(str::trim)
                    .filter(|ip| !ip.is_empty())
                    .map(str::to_string)
            })
            .or_else(|| header(parts, "x-real-ip"));

        Ok(Self {
            ip_address,
            user_agent: header(parts, "user-agent"),
        })
    }
}
