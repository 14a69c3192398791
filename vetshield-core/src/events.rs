//! Security events and the sinks they are reported to.
//!
//! Reporting is best-effort: [`SecurityEventSink::record`] may fail, and the
//! monitor only forwards the failure to `tracing`.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::keys::AuthAction;
use crate::utils::redact::{redact_identifier_hint, truncate_client_agent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    RateLimitExceeded,
    SuspiciousClientAgent,
    BlockedIp,
    FailedAttempt,
    BruteForceSuspected,
    IpBlocked,
    SuccessfulAuth,
}

impl SecurityEventKind {
    pub fn severity(&self) -> Severity {
        match self {
            SecurityEventKind::FailedAttempt | SecurityEventKind::SuccessfulAuth => Severity::Info,
            _ => Severity::Warn,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            SecurityEventKind::RateLimitExceeded => "Rate limit exceeded",
            SecurityEventKind::SuspiciousClientAgent => "Suspicious client agent detected",
            SecurityEventKind::BlockedIp => "Request from blocked IP",
            SecurityEventKind::FailedAttempt => "Failed authentication attempt",
            SecurityEventKind::BruteForceSuspected => "Possible brute force attack",
            SecurityEventKind::IpBlocked => "IP blocked for sensitive actions",
            SecurityEventKind::SuccessfulAuth => "Successful authentication",
        }
    }
}

/// One entry for the security log. Personal data is redacted on
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub severity: Severity,
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<AuthAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_minutes: Option<i64>,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind, ip: &str) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            ip: ip.to_string(),
            action: None,
            identifier_hint: None,
            client_agent: None,
            reason: None,
            client_id: None,
            remaining: None,
            block_minutes: None,
        }
    }

    pub fn with_action(mut self, action: AuthAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_identifier_hint(mut self, hint: Option<&str>) -> Self {
        self.identifier_hint = hint.map(redact_identifier_hint);
        self
    }

    pub fn with_client_agent(mut self, agent: Option<&str>) -> Self {
        self.client_agent = agent.map(truncate_client_agent);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_remaining(mut self, remaining: u32) -> Self {
        self.remaining = Some(remaining);
        self
    }

    pub fn with_block_minutes(mut self, minutes: i64) -> Self {
        self.block_minutes = Some(minutes);
        self
    }

    pub fn message(&self) -> &'static str {
        self.kind.message()
    }
}

/// Destination of security events.
pub trait SecurityEventSink: Send + Sync {
    fn record(&self, event: &SecurityEvent) -> anyhow::Result<()>;
}

/// Writes events as structured `tracing` records under the
/// `vetshield::security` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

macro_rules! emit_security_event {
    ($level:ident, $event:expr) => {
        tracing::$level!(
            target: "vetshield::security",
            kind = ?$event.kind,
            ip = %$event.ip,
            action = ?$event.action,
            identifier_hint = ?$event.identifier_hint,
            client_agent = ?$event.client_agent,
            reason = ?$event.reason,
            client_id = ?$event.client_id,
            remaining = ?$event.remaining,
            block_minutes = ?$event.block_minutes,
            "{}",
            $event.message()
        )
    };
}

impl SecurityEventSink for TracingEventSink {
    fn record(&self, event: &SecurityEvent) -> anyhow::Result<()> {
        match event.severity {
            Severity::Info => emit_security_event!(info, event),
            Severity::Warn => emit_security_event!(warn, event),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl SecurityEventSink for NoopEventSink {
    fn record(&self, _event: &SecurityEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Keeps events in memory, mostly useful in tests.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn kinds(&self) -> Vec<SecurityEventKind> {
        self.events().iter().map(|event| event.kind).collect()
    }
}

impl SecurityEventSink for MemoryEventSink {
    fn record(&self, event: &SecurityEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}
