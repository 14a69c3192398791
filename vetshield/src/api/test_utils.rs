//! Shared helpers for tests that need a full application state.

use std::sync::Arc;

use axum::http::{header::USER_AGENT, HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};
use config::Config;
use vetshield_core::clock::ManualClock;

use crate::api::router::ApiRoutes;
use crate::app_state::{AppState, SharedAppState};
use crate::services::reset_notifier::MemoryResetNotifier;
use crate::settings::config::Settings;

pub const TEST_SETTINGS: &str = "tests/test_settings";
pub const BROWSER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15 Safari/605.1.15";

/// Load settings from a config file, relative to the crate root.
pub fn load_test_settings(config_file: &str) -> Settings {
    let builder = Config::builder().add_source(config::File::with_name(config_file));
    builder.build().unwrap().try_deserialize().unwrap()
}

/// App state on a manual clock, built from the test fixture.
pub fn create_test_app_state() -> (SharedAppState, ManualClock) {
    let clock = ManualClock::starting_now();
    let state =
        AppState::from_settings(load_test_settings(TEST_SETTINGS), Arc::new(clock.clone()))
            .unwrap();
    (state, clock)
}

/// Like [`create_test_app_state`], but reset tokens are delivered to memory.
pub fn create_test_app_state_with_notifier() -> (SharedAppState, Arc<MemoryResetNotifier>) {
    let notifier = Arc::new(MemoryResetNotifier::new());
    let state = AppState::from_settings_with_notifier(
        load_test_settings(TEST_SETTINGS),
        Arc::new(ManualClock::starting_now()),
        notifier.clone(),
    )
    .unwrap();
    (state, notifier)
}

pub fn create_test_server(state: SharedAppState) -> TestServer {
    TestServer::new(ApiRoutes::create(state)).unwrap()
}

/// POST from a regular browser behind the proxy, coming from `ip`.
pub fn browser_post(server: &TestServer, path: &str, ip: &str) -> TestRequest {
    server
        .post(path)
        .add_header(
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_str(ip).unwrap(),
        )
        .add_header(USER_AGENT, HeaderValue::from_static(BROWSER_AGENT))
}
