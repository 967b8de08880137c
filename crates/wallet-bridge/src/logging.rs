use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_JSON_ENV: &str = "WALLET_BRIDGE_LOG_JSON";

/// Install a global subscriber filtered by `RUST_LOG` (default `info`).
///
/// Output is JSON when `WALLET_BRIDGE_LOG_JSON=1`. Safe to call more than
/// once; later calls are ignored.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = std::env::var(LOG_JSON_ENV)
        .map(|value| value == "1")
        .unwrap_or(false);

    if use_json {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
