//! Environment-driven runtime defaults.
//!
//! Values are resolved once, on first use, after loading any `.env` file in
//! scope. Per-connector overrides (for example
//! [`Input::with_refresh_interval`](crate::connectors::Input::with_refresh_interval))
//! always win over these defaults.

use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable overriding the default recv refresh interval, in
/// whole milliseconds. Zero and unparseable values are rejected.
pub const RECV_REFRESH_ENV: &str = "PIPEWEAVE_REFRESH_MS";

const DEFAULT_RECV_REFRESH: Duration = Duration::from_millis(25);

/// How often a blocked receive re-checks upstream completion state.
///
/// The interval only bounds how quickly a consumer notices end-of-stream;
/// data arriving on the queue wakes the consumer immediately regardless.
pub fn recv_refresh_interval() -> Duration {
    static CACHED: OnceLock<Duration> = OnceLock::new();
    *CACHED.get_or_init(|| {
        dotenvy::dotenv().ok();
        let Ok(raw) = std::env::var(RECV_REFRESH_ENV) else {
            return DEFAULT_RECV_REFRESH;
        };
        match raw.parse::<u64>() {
            Ok(ms) if ms > 0 => Duration::from_millis(ms),
            _ => {
                tracing::warn!(
                    value = %raw,
                    default_ms = DEFAULT_RECV_REFRESH.as_millis() as u64,
                    "ignoring invalid {RECV_REFRESH_ENV}; refresh interval must be a positive number of milliseconds"
                );
                DEFAULT_RECV_REFRESH
            }
        }
    })
}
