//! vetshield library
//!
//! Exposes the server pieces so the binary and the tests share them.

pub mod api;
pub mod app_state;
pub mod http;
pub mod init_telemetry;
pub mod services;
pub mod settings;
pub mod stop_flag;
pub mod tasks;

pub use app_state::AppState;
