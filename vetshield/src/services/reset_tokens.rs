//! Single-use password reset tokens.
//!
//! Only a SHA-256 digest of each token is kept, so the store never holds a
//! usable token.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;
use vetshield_core::clock::Clock;

#[derive(Debug, Clone)]
struct PendingReset {
    email: String,
    expires_at: DateTime<Utc>,
}

fn digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct ResetTokenStore {
    pending: Arc<Mutex<HashMap<String, PendingReset>>>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl ResetTokenStore {
    pub fn new(ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Issue a new token for `email`. Earlier tokens for the same address
    /// stay valid until they expire or are used.
    pub fn issue(&self, email: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                digest(&token),
                PendingReset {
                    email: email.to_string(),
                    expires_at,
                },
            );

        token
    }

    /// Redeem a token, returning the e-mail address it was issued for.
    /// Each token works once.
    pub fn consume(&self, token: &str) -> Option<String> {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&digest(token))?;

        if self.clock.now() >= pending.expires_at {
            debug!("Rejected expired reset token");
            return None;
        }
        Some(pending.email)
    }

    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let initial_count = pending.len();
        pending.retain(|_, reset| reset.expires_at > now);

        let removed_count = initial_count - pending.len();
        if removed_count > 0 {
            info!(
                "Cleaned up {} expired reset token(s), {} remaining",
                removed_count,
                pending.len()
            );
        }
        removed_count
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
