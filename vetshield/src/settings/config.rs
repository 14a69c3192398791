use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use vetshield_core::settings::security::SecuritySettings;
use vetshield_core::utils::redact::mask_email;

#[derive(Debug, Deserialize, Clone)]
#[allow(unused)]
#[readonly::make]
pub struct ApiSettings {
    pub bind_address: String,
    /// `*` allows every origin.
    #[serde(default = "default_cors_allowed_origin")]
    pub cors_allowed_origin: String,
}

fn default_cors_allowed_origin() -> String {
    "*".to_string()
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            bind_address: "0.0.0.0:8080".to_string(),
            cors_allowed_origin: default_cors_allowed_origin(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct SeedAccount {
    pub email: String,
    pub password_hash: String,
}

impl std::fmt::Debug for SeedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedAccount")
            .field("email", &mask_email(&self.email))
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[allow(unused)]
#[readonly::make]
pub struct AccountSettings {
    #[serde(default = "default_password_hash_cost")]
    pub password_hash_cost: u32,
    #[serde(default = "default_reset_token_ttl_minutes")]
    pub reset_token_ttl_minutes: u64,
    #[serde(default)]
    pub seed: Vec<SeedAccount>,
}

const MIN_HASH_COST: u32 = 4;
const MAX_HASH_COST: u32 = 31;

fn default_password_hash_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_reset_token_ttl_minutes() -> u64 {
    60
}

impl Default for AccountSettings {
    fn default() -> Self {
        AccountSettings {
            password_hash_cost: default_password_hash_cost(),
            reset_token_ttl_minutes: default_reset_token_ttl_minutes(),
            seed: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[allow(unused)]
pub struct Settings {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub security: SecuritySettings,
    #[serde(default)]
    pub accounts: AccountSettings,
}

impl Settings {
    pub fn get_environment() -> Environment {
        Environment::default()
            .prefix("VETSHIELD")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("VETSHIELD_RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("api.bind_address", "0.0.0.0:8080")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Self::get_environment());

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.security
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&self.accounts.password_hash_cost) {
            return Err(ConfigError::Message(format!(
                "accounts.password_hash_cost must be between {MIN_HASH_COST} and {MAX_HASH_COST}"
            )));
        }

        if self.accounts.reset_token_ttl_minutes == 0 {
            return Err(ConfigError::Message(
                "accounts.reset_token_ttl_minutes must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_test_settings() -> Settings {
        let builder = Config::builder().add_source(config::File::with_name("tests/test_settings"));
        builder.build().unwrap().try_deserialize().unwrap()
    }

    #[test]
    fn test_settings_from_fixture() {
        let settings = load_test_settings();

        assert_eq!(settings.api.bind_address, "127.0.0.1:0");
        assert_eq!(settings.security.request_limit, 5);
        assert_eq!(settings.security.window_seconds, 900);
        assert_eq!(settings.security.blocked_ips, vec!["203.0.113.66".to_string()]);
        assert_eq!(settings.accounts.password_hash_cost, 4);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let builder = Config::builder()
            .set_default("api.bind_address", "127.0.0.1:9000")
            .unwrap();
        let settings: Settings = builder.build().unwrap().try_deserialize().unwrap();

        assert_eq!(settings.security.request_limit, 5);
        assert_eq!(settings.security.suspicious_agent_block_minutes, 60);
        assert_eq!(settings.accounts.reset_token_ttl_minutes, 60);
        assert_eq!(settings.api.cors_allowed_origin, "*");
    }

    #[test]
    fn test_security_settings_from_env() {
        env::set_var("VETSHIELD__SECURITY__REQUEST_LIMIT", "10");
        env::set_var("VETSHIELD__SECURITY__FAILURE_BLOCK_MINUTES", "45");

        let builder = Config::builder()
            .add_source(config::File::with_name("tests/test_settings"))
            .add_source(Settings::get_environment());
        let settings: Settings = builder.build().unwrap().try_deserialize().unwrap();

        env::remove_var("VETSHIELD__SECURITY__REQUEST_LIMIT");
        env::remove_var("VETSHIELD__SECURITY__FAILURE_BLOCK_MINUTES");

        assert_eq!(settings.security.request_limit, 10);
        assert_eq!(settings.security.failure_block_minutes, 45);
    }

    #[test]
    fn test_debug_output_hides_seed_hashes() {
        let hash = "$2b$04$abcdefghijklmnopqrstuu5DWz4bCq4pSn8jaGnPzmgXSUv8O0pMG";
        let seed = format!(
            "accounts:\n  seed:\n    - email: reception@clinic.example\n      password_hash: \"{hash}\"\n"
        );
        let builder = Config::builder()
            .add_source(config::File::with_name("tests/test_settings"))
            .add_source(config::File::from_str(&seed, config::FileFormat::Yaml));
        let settings: Settings = builder.build().unwrap().try_deserialize().unwrap();
        assert_eq!(settings.accounts.seed.len(), 1);

        let printed = format!("{settings:#?}");
        assert!(!printed.contains(hash));
        assert!(!printed.contains("reception@clinic.example"));
        assert!(printed.contains("[REDACTED]"));
    }

    #[test]
    fn test_invalid_hash_cost_rejected() {
        let builder = Config::builder()
            .add_source(config::File::with_name("tests/test_settings"))
            .set_override("accounts.password_hash_cost", 2)
            .unwrap();
        let settings: Settings = builder.build().unwrap().try_deserialize().unwrap();

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("password_hash_cost"));
    }

    #[test]
    fn test_invalid_security_settings_rejected() {
        let builder = Config::builder()
            .add_source(config::File::with_name("tests/test_settings"))
            .set_override("security.request_limit", 0)
            .unwrap();
        let settings: Settings = builder.build().unwrap().try_deserialize().unwrap();

        assert!(settings.validate().is_err());
    }
}
