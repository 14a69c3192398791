use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::{header::USER_AGENT, request::Parts, HeaderMap};
use vetshield_core::keys::{identifier_hint, AuthAction};
use vetshield_core::security_monitor::SecurityContext;

pub const UNKNOWN_IP: &str = "0.0.0.0";

/// Network origin and client agent of a request, as reported by the proxy
/// in front of the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub ip: String,
    /// Empty when the request carried no `User-Agent`.
    pub client_agent: String,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl ClientContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let ip = header_str(headers, "x-forwarded-for")
            .and_then(|forwarded| forwarded.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .or_else(|| header_str(headers, "x-real-ip"))
            .unwrap_or(UNKNOWN_IP)
            .to_string();

        let client_agent = headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Self { ip, client_agent }
    }

    /// Security context for `action`, scoped to `identifier` when given.
    pub fn security_context(&self, action: AuthAction, identifier: Option<&str>) -> SecurityContext {
        let ctx = SecurityContext::new(self.ip.clone(), action)
            .with_client_agent(self.client_agent.clone());
        match identifier.map(str::trim).filter(|id| !id.is_empty()) {
            Some(identifier) => ctx.with_identifier_hint(identifier_hint(identifier)),
            None => ctx,
        }
    }
}

impl<S> FromRequestParts<S> for ClientContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}
