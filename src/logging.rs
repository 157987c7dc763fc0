//! Tracing subscriber setup.
//!
//! Logs go to **stderr** so stdout stays clean for command output. The
//! `GUIDEBOT_LOG` environment variable takes an `EnvFilter` directive
//! (e.g. `guidebot=debug,reqwest=warn`); the default level is `info`.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "GUIDEBOT_LOG";

/// Install the global subscriber. `json` switches to one JSON object per
/// event for log shippers.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = if json {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.try_init()
    };
}
