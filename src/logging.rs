//! Process-level logging setup. `RUST_LOG`, when set, always wins;
//! otherwise `config.debug` picks between the `debug` and `info` default
//! filters.

use tracing_subscriber::EnvFilter;

pub fn init(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Initializes the optional Sentry error-reporting uplink (spec.md §6
/// `sentry:`). The returned guard must be held for the process's lifetime;
/// dropping it flushes any buffered events.
pub fn init_sentry(cfg: &cdcflow_providers::SentryConfig) -> sentry::ClientInitGuard {
    sentry::init((
        cfg.dsn.clone(),
        sentry::ClientOptions {
            environment: Some(cfg.environment.clone().into()),
            ..Default::default()
        },
    ))
}
