//! Static abuse heuristics: suspicious client agents, blocked IPs and
//! common passwords, plus the durations the monitor blocks for.

use std::collections::HashSet;

use chrono::TimeDelta;
use regex::{RegexSet, RegexSetBuilder};
use thiserror::Error;

use crate::settings::security::{default_suspicious_agent_patterns, SecuritySettings};

/// Most frequently used passwords according to public breach corpora.
pub const COMMON_PASSWORDS: [&str; 30] = [
    "123456",
    "123456789",
    "12345678",
    "12345",
    "1234567",
    "1234567890",
    "111111",
    "000000",
    "123123",
    "654321",
    "password",
    "password1",
    "password123",
    "qwerty",
    "qwerty123",
    "qwertyuiop",
    "abc123",
    "iloveyou",
    "letmein",
    "welcome",
    "admin",
    "monkey",
    "dragon",
    "sunshine",
    "princess",
    "football",
    "baseball",
    "master",
    "superman",
    "trustno1",
];

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("invalid suspicious agent pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("{name} of {minutes} minutes is out of range")]
    DurationOutOfRange { name: &'static str, minutes: u64 },
}

fn minutes(name: &'static str, minutes: u64) -> Result<TimeDelta, PolicyError> {
    i64::try_from(minutes)
        .ok()
        .and_then(TimeDelta::try_minutes)
        .ok_or(PolicyError::DurationOutOfRange { name, minutes })
}

#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    suspicious_agents: RegexSet,
    blocked_ips: HashSet<String>,
    common_passwords: HashSet<String>,
    pub suspicious_agent_block: TimeDelta,
    pub blocked_ip_block: TimeDelta,
    pub failure_block: TimeDelta,
    /// Remaining failure allowance at or below which brute force is
    /// suspected.
    pub failure_warning_remaining: u32,
}

impl SecurityPolicy {
    pub fn from_settings(settings: &SecuritySettings) -> Result<Self, PolicyError> {
        let suspicious_agents = RegexSetBuilder::new(&settings.suspicious_agent_patterns)
            .case_insensitive(true)
            .build()?;

        let common_passwords = COMMON_PASSWORDS
            .iter()
            .map(|password| password.to_string())
            .chain(settings.common_passwords.iter().cloned())
            .map(|password| password.to_lowercase())
            .collect();

        Ok(Self {
            suspicious_agents,
            blocked_ips: settings.blocked_ips.iter().cloned().collect(),
            common_passwords,
            suspicious_agent_block: minutes(
                "suspicious_agent_block_minutes",
                settings.suspicious_agent_block_minutes,
            )?,
            blocked_ip_block: minutes(
                "blocked_ip_block_minutes",
                settings.blocked_ip_block_minutes,
            )?,
            failure_block: minutes("failure_block_minutes", settings.failure_block_minutes)?,
            failure_warning_remaining: settings.failure_warning_remaining,
        })
    }

    /// Replace the blocked IP list.
    pub fn with_blocked_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_ips = ips.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_suspicious_agent(&self, agent: &str) -> bool {
        self.suspicious_agents.is_match(agent)
    }

    pub fn is_blocked_ip(&self, ip: &str) -> bool {
        self.blocked_ips.contains(ip)
    }

    pub fn is_common_password(&self, password: &str) -> bool {
        self.common_passwords.contains(&password.to_lowercase())
    }
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        let settings = SecuritySettings::default();
        let suspicious_agents = RegexSetBuilder::new(default_suspicious_agent_patterns())
            .case_insensitive(true)
            .build()
            .unwrap_or_else(|_| RegexSet::empty());

        Self {
            suspicious_agents,
            blocked_ips: HashSet::new(),
            common_passwords: COMMON_PASSWORDS.iter().map(|p| p.to_string()).collect(),
            suspicious_agent_block: TimeDelta::minutes(60),
            blocked_ip_block: TimeDelta::minutes(24 * 60),
            failure_block: TimeDelta::minutes(15),
            failure_warning_remaining: settings.failure_warning_remaining,
        }
    }
}
