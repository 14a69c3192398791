//! Rate limit keys and the identifier hints that scope them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of the hex digest prefix used as identifier hint.
pub const IDENTIFIER_HINT_LEN: usize = 8;

/// Authentication-adjacent actions that are guarded by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthAction {
    Login,
    Register,
    ResetPassword,
    ForgotPassword,
}

impl AuthAction {
    /// Every action that gets blocked when one IP accumulates too many
    /// failures.
    pub const SENSITIVE: [AuthAction; 4] = [
        AuthAction::Login,
        AuthAction::Register,
        AuthAction::ResetPassword,
        AuthAction::ForgotPassword,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthAction::Login => "login",
            AuthAction::Register => "register",
            AuthAction::ResetPassword => "reset-password",
            AuthAction::ForgotPassword => "forgot-password",
        }
    }
}

impl fmt::Display for AuthAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown auth action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for AuthAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuthAction::SENSITIVE
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Builders for the strings the rate limiter counts under.
pub struct RateLimitKey;

impl RateLimitKey {
    /// `<ip>:<action>` or `<ip>:<action>-<hint>`
    pub fn for_action(ip: &str, action: AuthAction, identifier_hint: Option<&str>) -> String {
        match identifier_hint {
            Some(hint) if !hint.is_empty() => format!("{ip}:{action}-{hint}"),
            _ => format!("{ip}:{action}"),
        }
    }

    /// Shared failure counter of one IP across all actions.
    pub fn failures(ip: &str) -> String {
        format!("{ip}:failures")
    }
}

/// Derive a short, non-reversible hint from a user identifier such as an
/// e-mail address.
pub fn identifier_hint(identifier: &str) -> String {
    let normalized = identifier.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..IDENTIFIER_HINT_LEN].to_string()
}
