pub mod cache;
pub mod clock;
pub mod events;
pub mod keys;
pub mod policy;
pub mod rate_limiter;
pub mod security_monitor;
pub mod settings;
pub mod utils;
