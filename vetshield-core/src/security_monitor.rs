//! Policy layer on top of the [`RateLimiter`].
//!
//! The monitor turns request context into rate limit keys, applies the static
//! heuristics of a [`SecurityPolicy`] and escalates blocks across every
//! sensitive action once one IP accumulates too many failures. Security
//! events go to a [`SecurityEventSink`]; sink failures never change a
//! decision.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::error;

use crate::events::{SecurityEvent, SecurityEventKind, SecurityEventSink, TracingEventSink};
use crate::keys::{AuthAction, RateLimitKey};
use crate::policy::SecurityPolicy;
use crate::rate_limiter::RateLimiter;

/// Request context a security check runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    pub ip: String,
    pub action: AuthAction,
    pub identifier_hint: Option<String>,
    pub client_agent: Option<String>,
}

impl SecurityContext {
    pub fn new(ip: impl Into<String>, action: AuthAction) -> Self {
        Self {
            ip: ip.into(),
            action,
            identifier_hint: None,
            client_agent: None,
        }
    }

    pub fn with_identifier_hint(mut self, hint: impl Into<String>) -> Self {
        self.identifier_hint = Some(hint.into());
        self
    }

    pub fn with_client_agent(mut self, agent: impl Into<String>) -> Self {
        self.client_agent = Some(agent.into());
        self
    }

    fn key(&self) -> String {
        RateLimitKey::for_action(&self.ip, self.action, self.identifier_hint.as_deref())
    }

    fn event(&self, kind: SecurityEventKind) -> SecurityEvent {
        SecurityEvent::new(kind, &self.ip)
            .with_action(self.action)
            .with_identifier_hint(self.identifier_hint.as_deref())
            .with_client_agent(self.client_agent.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    RateLimitExceeded,
    SuspiciousClientAgent,
    BlockedIp,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::RateLimitExceeded => "rate_limit_exceeded",
            DenyReason::SuspiciousClientAgent => "suspicious_client_agent",
            DenyReason::BlockedIp => "blocked_ip",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityDecision {
    pub allow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    /// Minutes until the client may try again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<i64>,
}

impl SecurityDecision {
    pub fn allowed() -> Self {
        Self {
            allow: true,
            reason: None,
            retry_after: None,
        }
    }

    pub fn denied(reason: DenyReason, retry_after: i64) -> Self {
        Self {
            allow: false,
            reason: Some(reason),
            retry_after: Some(retry_after),
        }
    }
}

/// Whole minutes in `delta`, rounded up.
fn whole_minutes(delta: TimeDelta) -> i64 {
    let millis = delta.num_milliseconds().max(0);
    millis / 60_000 + i64::from(millis % 60_000 != 0)
}

fn minutes_until(now: DateTime<Utc>, until: DateTime<Utc>) -> i64 {
    whole_minutes(until.signed_duration_since(now))
}

pub struct SecurityMonitor {
    limiter: Arc<RateLimiter>,
    policy: SecurityPolicy,
    sink: Arc<dyn SecurityEventSink>,
}

impl fmt::Debug for SecurityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityMonitor")
            .field("limiter", &self.limiter)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl SecurityMonitor {
    pub fn new(limiter: Arc<RateLimiter>, policy: SecurityPolicy) -> Self {
        Self {
            limiter,
            policy,
            sink: Arc::new(TracingEventSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn SecurityEventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    fn report(&self, event: SecurityEvent) {
        if let Err(e) = self.sink.record(&event) {
            error!(
                kind = ?event.kind,
                error = %e,
                "Failed to record security event"
            );
        }
    }

    fn deny_rate_limited(&self, ctx: &SecurityContext, reset_time: DateTime<Utc>) -> SecurityDecision {
        let retry_after = minutes_until(self.limiter.now(), reset_time);
        self.report(
            ctx.event(SecurityEventKind::RateLimitExceeded)
                .with_block_minutes(retry_after),
        );
        SecurityDecision::denied(DenyReason::RateLimitExceeded, retry_after)
    }

    fn deny_and_block(
        &self,
        ctx: &SecurityContext,
        key: &str,
        kind: SecurityEventKind,
        reason: DenyReason,
        duration: TimeDelta,
    ) -> SecurityDecision {
        self.limiter.block(key, Some(duration));
        let minutes = whole_minutes(duration);
        self.report(ctx.event(kind).with_block_minutes(minutes));
        SecurityDecision::denied(reason, minutes)
    }

    /// Decide whether the request described by `ctx` may proceed. Every call
    /// counts against the rate limit key of the context.
    pub fn check_security_rules(&self, ctx: &SecurityContext) -> SecurityDecision {
        // A cross-action block lands on the IP-wide key, which a hinted key
        // would never see otherwise.
        if ctx.identifier_hint.as_deref().is_some_and(|hint| !hint.is_empty()) {
            let ip_key = RateLimitKey::for_action(&ctx.ip, ctx.action, None);
            if let Some(record) = self.limiter.peek(&ip_key).filter(|record| record.blocked) {
                return self.deny_rate_limited(ctx, record.reset_time);
            }
        }

        let key = ctx.key();
        let result = self.limiter.check(&key);
        if !result.success {
            return self.deny_rate_limited(ctx, result.reset_time);
        }

        if let Some(agent) = ctx.client_agent.as_deref() {
            if self.policy.is_suspicious_agent(agent) {
                return self.deny_and_block(
                    ctx,
                    &key,
                    SecurityEventKind::SuspiciousClientAgent,
                    DenyReason::SuspiciousClientAgent,
                    self.policy.suspicious_agent_block,
                );
            }
        }

        if self.policy.is_blocked_ip(&ctx.ip) {
            return self.deny_and_block(
                ctx,
                &key,
                SecurityEventKind::BlockedIp,
                DenyReason::BlockedIp,
                self.policy.blocked_ip_block,
            );
        }

        SecurityDecision::allowed()
    }

    /// Record a failed authentication. Once the failure allowance of the IP
    /// runs out, every sensitive action is blocked for that IP.
    pub fn track_failed_attempt(&self, ctx: &SecurityContext, fail_reason: Option<&str>) {
        let mut event = ctx.event(SecurityEventKind::FailedAttempt);
        if let Some(reason) = fail_reason {
            event = event.with_reason(reason);
        }
        self.report(event);

        let result = self.limiter.check(&RateLimitKey::failures(&ctx.ip));
        if result.remaining > self.policy.failure_warning_remaining {
            return;
        }

        self.report(
            ctx.event(SecurityEventKind::BruteForceSuspected)
                .with_remaining(result.remaining),
        );

        if result.remaining == 0 {
            for action in AuthAction::SENSITIVE {
                self.limiter.block(
                    &RateLimitKey::for_action(&ctx.ip, action, None),
                    Some(self.policy.failure_block),
                );
            }
            self.report(
                SecurityEvent::new(SecurityEventKind::IpBlocked, &ctx.ip)
                    .with_client_agent(ctx.client_agent.as_deref())
                    .with_block_minutes(whole_minutes(self.policy.failure_block)),
            );
        }
    }

    /// Record a successful authentication and clear the failure counter of
    /// the IP.
    pub fn track_successful_auth(&self, ctx: &SecurityContext, client_id: &str) {
        self.report(
            ctx.event(SecurityEventKind::SuccessfulAuth)
                .with_client_id(client_id),
        );
        self.limiter.reset(&RateLimitKey::failures(&ctx.ip));
    }

    pub fn check_password_breached(&self, password: &str) -> bool {
        self.policy.is_common_password(password)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::events::MemoryEventSink;

    struct FailingSink;

    impl SecurityEventSink for FailingSink {
        fn record(&self, _event: &SecurityEvent) -> anyhow::Result<()> {
            anyhow::bail!("log backend unavailable")
        }
    }

    struct Fixture {
        monitor: SecurityMonitor,
        clock: ManualClock,
        sink: Arc<MemoryEventSink>,
    }

    fn fixture(policy: SecurityPolicy) -> Fixture {
        let clock = ManualClock::starting_now();
        let limiter = RateLimiter::builder(5, Duration::from_secs(15 * 60))
            .with_clock(Arc::new(clock.clone()))
            .build()
            .unwrap();
        let sink = Arc::new(MemoryEventSink::new());
        let monitor = SecurityMonitor::new(Arc::new(limiter), policy).with_sink(sink.clone());
        Fixture {
            monitor,
            clock,
            sink,
        }
    }

    const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/128.0";

    fn browser(ip: &str, action: AuthAction) -> SecurityContext {
        SecurityContext::new(ip, action).with_client_agent(BROWSER)
    }

    #[test]
    fn test_allows_regular_requests() {
        let f = fixture(SecurityPolicy::default());
        let decision = f.monitor.check_security_rules(&browser("1.2.3.4", AuthAction::Login));
        assert_eq!(decision, SecurityDecision::allowed());
        assert!(f.sink.events().is_empty());
    }

    #[test]
    fn test_empty_client_agent_is_denied_immediately() {
        let f = fixture(SecurityPolicy::default());
        let ctx = SecurityContext::new("9.9.9.9", AuthAction::Register).with_client_agent("");

        let decision = f.monitor.check_security_rules(&ctx);
        assert_eq!(
            decision,
            SecurityDecision::denied(DenyReason::SuspiciousClientAgent, 60)
        );
        assert_eq!(f.sink.kinds(), vec![SecurityEventKind::SuspiciousClientAgent]);

        // The key stays blocked even for a browser afterwards
        let retry = f.monitor.check_security_rules(&browser("9.9.9.9", AuthAction::Register));
        assert_eq!(retry.reason, Some(DenyReason::RateLimitExceeded));
        assert_eq!(retry.retry_after, Some(60));
    }

    #[test]
    fn test_missing_client_agent_skips_agent_check() {
        let f = fixture(SecurityPolicy::default());
        let ctx = SecurityContext::new("1.2.3.4", AuthAction::Login);
        assert!(f.monitor.check_security_rules(&ctx).allow);
    }

    #[test]
    fn test_blocked_ip_is_denied_for_a_day() {
        let f = fixture(SecurityPolicy::default().with_blocked_ips(["6.6.6.6"]));
        let decision = f.monitor.check_security_rules(&browser("6.6.6.6", AuthAction::Login));
        assert_eq!(decision, SecurityDecision::denied(DenyReason::BlockedIp, 1440));

        let record = f
            .monitor
            .limiter()
            .peek("6.6.6.6:login")
            .unwrap();
        assert!(record.blocked);
        assert_eq!(record.reset_time, f.clock.now() + TimeDelta::hours(24));
    }

    #[test]
    fn test_rate_limit_denial_reports_minutes_rounded_up() {
        let f = fixture(SecurityPolicy::default());
        let ctx = browser("1.2.3.4", AuthAction::Login);
        for _ in 0..5 {
            assert!(f.monitor.check_security_rules(&ctx).allow);
        }

        let denied = f.monitor.check_security_rules(&ctx);
        assert_eq!(denied, SecurityDecision::denied(DenyReason::RateLimitExceeded, 30));

        f.clock.advance(TimeDelta::minutes(10) + TimeDelta::seconds(30));
        let later = f.monitor.check_security_rules(&ctx);
        assert_eq!(later.retry_after, Some(20));
        assert_eq!(
            f.sink.kinds(),
            vec![
                SecurityEventKind::RateLimitExceeded,
                SecurityEventKind::RateLimitExceeded
            ]
        );
    }

    #[test]
    fn test_identifier_hints_scope_the_counter() {
        let f = fixture(SecurityPolicy::default());
        let alice = browser("1.2.3.4", AuthAction::Login).with_identifier_hint("aaaa1111");
        let bob = browser("1.2.3.4", AuthAction::Login).with_identifier_hint("bbbb2222");

        for _ in 0..5 {
            f.monitor.check_security_rules(&alice);
        }
        assert!(!f.monitor.check_security_rules(&alice).allow);
        assert!(f.monitor.check_security_rules(&bob).allow);
    }

    #[test]
    fn test_exhausted_failures_block_every_sensitive_action() {
        let f = fixture(SecurityPolicy::default());
        let ctx = browser("5.5.5.5", AuthAction::Login);

        for _ in 0..5 {
            f.monitor.track_failed_attempt(&ctx, Some("invalid_credentials"));
        }

        for action in AuthAction::SENSITIVE {
            let decision = f.monitor.check_security_rules(&browser("5.5.5.5", action));
            assert!(!decision.allow, "{action} should be blocked");
            assert_eq!(decision.reason, Some(DenyReason::RateLimitExceeded));
            assert_eq!(decision.retry_after, Some(15));
        }

        // Hinted keys see the IP-wide block as well
        let hinted = browser("5.5.5.5", AuthAction::Register).with_identifier_hint("cafe0123");
        assert!(!f.monitor.check_security_rules(&hinted).allow);

        // Other IPs are unaffected
        assert!(f.monitor.check_security_rules(&browser("5.5.5.6", AuthAction::Login)).allow);

        f.clock.advance(TimeDelta::minutes(15) + TimeDelta::seconds(1));
        assert!(f.monitor.check_security_rules(&browser("5.5.5.5", AuthAction::Login)).allow);
    }

    #[test]
    fn test_failed_attempts_escalate_events() {
        let f = fixture(SecurityPolicy::default());
        let ctx = browser("5.5.5.5", AuthAction::Login).with_identifier_hint("abcdef12");

        for _ in 0..5 {
            f.monitor.track_failed_attempt(&ctx, Some("invalid_credentials"));
        }

        let events = f.sink.events();
        let suspected: Vec<Option<u32>> = events
            .iter()
            .filter(|event| event.kind == SecurityEventKind::BruteForceSuspected)
            .map(|event| event.remaining)
            .collect();
        assert_eq!(suspected, vec![Some(2), Some(1), Some(0)]);

        let blocked = events.last().unwrap();
        assert_eq!(blocked.kind, SecurityEventKind::IpBlocked);
        assert_eq!(blocked.block_minutes, Some(15));

        let failed = &events[0];
        assert_eq!(failed.reason.as_deref(), Some("invalid_credentials"));
        assert_eq!(failed.identifier_hint.as_deref(), Some("abc***"));
    }

    #[test]
    fn test_successful_auth_resets_failure_counter() {
        let f = fixture(SecurityPolicy::default());
        let ctx = browser("7.7.7.7", AuthAction::Login);

        for _ in 0..4 {
            f.monitor.track_failed_attempt(&ctx, None);
        }
        assert_eq!(f.monitor.limiter().peek("7.7.7.7:failures").unwrap().count, 4);

        f.monitor.track_successful_auth(&ctx, "client-1");
        assert!(f.monitor.limiter().peek("7.7.7.7:failures").is_none());

        f.monitor.track_failed_attempt(&ctx, None);
        assert_eq!(f.monitor.limiter().peek("7.7.7.7:failures").unwrap().count, 1);
        assert!(f.monitor.check_security_rules(&ctx).allow);

        let success = f
            .sink
            .events()
            .into_iter()
            .find(|event| event.kind == SecurityEventKind::SuccessfulAuth)
            .unwrap();
        assert_eq!(success.client_id.as_deref(), Some("client-1"));
    }

    #[test]
    fn test_sink_failure_does_not_change_decisions() {
        let f = fixture(SecurityPolicy::default());
        let monitor = SecurityMonitor::new(f.monitor.limiter().clone(), SecurityPolicy::default())
            .with_sink(Arc::new(FailingSink));

        let ctx = SecurityContext::new("9.9.9.9", AuthAction::Register).with_client_agent("");
        assert_eq!(
            monitor.check_security_rules(&ctx),
            SecurityDecision::denied(DenyReason::SuspiciousClientAgent, 60)
        );

        let login = browser("8.8.8.8", AuthAction::Login);
        for _ in 0..5 {
            monitor.track_failed_attempt(&login, None);
        }
        assert!(!monitor.check_security_rules(&login).allow);
    }

    #[test]
    fn test_check_password_breached() {
        let f = fixture(SecurityPolicy::default());
        assert!(f.monitor.check_password_breached("Password123"));
        assert!(!f.monitor.check_password_breached("kennel-rabbit-orbit-42"));
        assert_eq!(
            f.monitor.policy().is_common_password("Password123"),
            f.monitor.check_password_breached("Password123")
        );
    }

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_value(SecurityDecision::denied(DenyReason::BlockedIp, 1440)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"allow": false, "reason": "blocked_ip", "retryAfter": 1440})
        );
        let json = serde_json::to_value(SecurityDecision::allowed()).unwrap();
        assert_eq!(json, serde_json::json!({"allow": true}));
    }
}
