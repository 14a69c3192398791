use serde::Deserialize;
use thiserror::Error;

/// Security settings validation error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Security configuration error: {message}")]
pub struct SecuritySettingsError {
    pub message: String,
}

impl SecuritySettingsError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Rate limiting and abuse detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SecuritySettings {
    /// Admitted requests per key and window
    #[serde(default = "default_request_limit")]
    pub request_limit: u32,

    /// Length of the fixed window in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Maximum number of keys kept in memory
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// How often expired records are purged
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    /// Warn about brute force once the failure allowance drops to this value
    #[serde(default = "default_failure_warning_remaining")]
    pub failure_warning_remaining: u32,

    /// Block applied to every sensitive action after too many failures
    #[serde(default = "default_failure_block_minutes")]
    pub failure_block_minutes: u64,

    #[serde(default = "default_suspicious_agent_block_minutes")]
    pub suspicious_agent_block_minutes: u64,

    #[serde(default = "default_blocked_ip_block_minutes")]
    pub blocked_ip_block_minutes: u64,

    /// Case-insensitive regular expressions matched against the client agent
    #[serde(default = "default_suspicious_agent_patterns")]
    pub suspicious_agent_patterns: Vec<String>,

    #[serde(default)]
    pub blocked_ips: Vec<String>,

    /// Passwords rejected as breached, in addition to the built-in list
    #[serde(default)]
    pub common_passwords: Vec<String>,
}

fn default_request_limit() -> u32 {
    5
}

fn default_window_seconds() -> u64 {
    15 * 60
}

fn default_cache_capacity() -> usize {
    crate::rate_limiter::DEFAULT_CAPACITY
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

fn default_failure_warning_remaining() -> u32 {
    2
}

fn default_failure_block_minutes() -> u64 {
    15
}

fn default_suspicious_agent_block_minutes() -> u64 {
    60
}

fn default_blocked_ip_block_minutes() -> u64 {
    24 * 60
}

pub fn default_suspicious_agent_patterns() -> Vec<String> {
    [
        "bot",
        "crawler",
        "spider",
        "scraper",
        "curl",
        "wget",
        "python-requests",
        "python-urllib",
        "go-http-client",
        "libwww-perl",
        r"^\s*$",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            request_limit: default_request_limit(),
            window_seconds: default_window_seconds(),
            cache_capacity: default_cache_capacity(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            failure_warning_remaining: default_failure_warning_remaining(),
            failure_block_minutes: default_failure_block_minutes(),
            suspicious_agent_block_minutes: default_suspicious_agent_block_minutes(),
            blocked_ip_block_minutes: default_blocked_ip_block_minutes(),
            suspicious_agent_patterns: default_suspicious_agent_patterns(),
            blocked_ips: Vec::new(),
            common_passwords: Vec::new(),
        }
    }
}

impl SecuritySettings {
    /// Validate the security configuration
    pub fn validate(&self) -> Result<(), SecuritySettingsError> {
        if self.request_limit == 0 {
            return Err(SecuritySettingsError::new(
                "request_limit must be greater than 0",
            ));
        }

        if self.window_seconds == 0 {
            return Err(SecuritySettingsError::new(
                "window_seconds must be greater than 0",
            ));
        }

        if self.cache_capacity == 0 {
            return Err(SecuritySettingsError::new(
                "cache_capacity must be greater than 0",
            ));
        }

        if self.sweep_interval_seconds == 0 || self.sweep_interval_seconds > u32::MAX as u64 {
            return Err(SecuritySettingsError::new(format!(
                "sweep_interval_seconds must be between 1 and {}",
                u32::MAX
            )));
        }

        for (name, minutes) in [
            ("failure_block_minutes", self.failure_block_minutes),
            (
                "suspicious_agent_block_minutes",
                self.suspicious_agent_block_minutes,
            ),
            ("blocked_ip_block_minutes", self.blocked_ip_block_minutes),
        ] {
            if minutes == 0 {
                return Err(SecuritySettingsError::new(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        Ok(())
    }

    pub fn window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.window_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = SecuritySettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.request_limit, 5);
        assert_eq!(settings.window().as_secs(), 900);
    }

    #[test]
    fn test_zero_request_limit_invalid() {
        let settings = SecuritySettings {
            request_limit: 0,
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.message.contains("request_limit"));
    }

    #[test]
    fn test_zero_window_invalid() {
        let settings = SecuritySettings {
            window_seconds: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_capacity_invalid() {
        let settings = SecuritySettings {
            cache_capacity: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_block_duration_invalid() {
        let settings = SecuritySettings {
            blocked_ip_block_minutes: 0,
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("blocked_ip_block_minutes"));
    }
}
