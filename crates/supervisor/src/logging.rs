//! Tracing subscriber setup
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `info`) |
//! | `SUPERVISOR_LOG_FORMAT=json` | Newline-delimited JSON logs |

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber. Call once at process startup.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = std::env::var("SUPERVISOR_LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().compact())
            .init();
    }
}
