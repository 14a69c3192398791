use std::sync::Arc;

use anyhow::Context;
use chrono::TimeDelta;
use tracing::info;
use vetshield_core::clock::{Clock, SystemClock};
use vetshield_core::policy::SecurityPolicy;
use vetshield_core::rate_limiter::RateLimiter;
use vetshield_core::security_monitor::SecurityMonitor;

use crate::services::accounts::AccountDirectory;
use crate::services::reset_notifier::{LogResetNotifier, ResetTokenNotifier};
use crate::services::reset_tokens::ResetTokenStore;
use crate::settings::config::Settings;
use crate::stop_flag;

#[derive(Debug, Clone)]
pub struct AppState {
    pub settings: Settings,
    pub stop_flag: stop_flag::StopFlag,
    pub clock: Arc<dyn Clock>,
    pub monitor: Arc<SecurityMonitor>,
    pub accounts: AccountDirectory,
    pub reset_tokens: ResetTokenStore,
    pub reset_notifier: Arc<dyn ResetTokenNotifier>,
}

pub type SharedAppState = Arc<AppState>;

impl AppState {
    pub async fn new() -> anyhow::Result<SharedAppState> {
        let settings = Settings::new()?;

        let state = Self::from_settings(settings, Arc::new(SystemClock))?;
        stop_flag::register_signal_handler(&state.stop_flag);

        Ok(state)
    }

    /// Build the state without signal handlers, on the given clock.
    pub fn from_settings(settings: Settings, clock: Arc<dyn Clock>) -> anyhow::Result<SharedAppState> {
        Self::from_settings_with_notifier(settings, clock, Arc::new(LogResetNotifier))
    }

    pub fn from_settings_with_notifier(
        settings: Settings,
        clock: Arc<dyn Clock>,
        reset_notifier: Arc<dyn ResetTokenNotifier>,
    ) -> anyhow::Result<SharedAppState> {
        let security = &settings.security;
        let limiter = RateLimiter::builder(security.request_limit, security.window())
            .with_capacity(security.cache_capacity)
            .with_clock(clock.clone())
            .build()
            .context("Failed to create rate limiter")?;
        let policy =
            SecurityPolicy::from_settings(security).context("Failed to compile security policy")?;
        info!(
            request_limit = security.request_limit,
            window_seconds = security.window_seconds,
            blocked_ips = security.blocked_ips.len(),
            "Security monitor initialized"
        );
        let monitor = SecurityMonitor::new(Arc::new(limiter), policy);

        let accounts = AccountDirectory::new(
            settings.accounts.password_hash_cost,
            &settings.accounts.seed,
        )
        .context("Failed to create account directory")?;

        let ttl_minutes = i64::try_from(settings.accounts.reset_token_ttl_minutes)
            .ok()
            .and_then(TimeDelta::try_minutes)
            .context("accounts.reset_token_ttl_minutes is out of range")?;
        let reset_tokens = ResetTokenStore::new(ttl_minutes, clock.clone());

        Ok(Arc::new(AppState {
            settings,
            stop_flag: stop_flag::StopFlag::new(),
            clock,
            monitor: Arc::new(monitor),
            accounts,
            reset_tokens,
            reset_notifier,
        }))
    }
}
