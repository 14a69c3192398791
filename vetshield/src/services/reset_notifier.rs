//! Delivery of issued password reset tokens to the account owner.

use std::sync::{Mutex, PoisonError};

use chrono::TimeDelta;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;
use vetshield_core::utils::redact::mask_email;

#[derive(Debug, Clone)]
pub struct ResetNotice {
    pub email: String,
    pub token: SecretString,
    pub valid_for: TimeDelta,
}

/// Hands a reset token to whatever channel reaches the account owner.
pub trait ResetTokenNotifier: Send + Sync + std::fmt::Debug {
    fn deliver(&self, notice: &ResetNotice) -> anyhow::Result<()>;
}

/// Logs that a reset was requested. The token itself never reaches the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogResetNotifier;

impl ResetTokenNotifier for LogResetNotifier {
    fn deliver(&self, notice: &ResetNotice) -> anyhow::Result<()> {
        info!(
            valid_for_minutes = notice.valid_for.num_minutes(),
            "Password reset requested for {}",
            mask_email(&notice.email)
        );
        Ok(())
    }
}

/// Keeps delivered notices in memory, mostly useful in tests.
#[derive(Debug, Default)]
pub struct MemoryResetNotifier {
    notices: Mutex<Vec<ResetNotice>>,
}

impl MemoryResetNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent token delivered for `email`.
    pub fn latest_token_for(&self, email: &str) -> Option<String> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|notice| notice.email == email)
            .map(|notice| notice.token.expose_secret().to_string())
    }
}

impl ResetTokenNotifier for MemoryResetNotifier {
    fn deliver(&self, notice: &ResetNotice) -> anyhow::Result<()> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice.clone());
        Ok(())
    }
}
