/// Logging setup for the evaluation service.
///
/// All modules log through the `log` facade; this module only wires up the
/// `env_logger` backend. Filtering is controlled via `RUST_LOG` as usual
/// (e.g. `RUST_LOG=aeroeval_service=debug`).

/// Initialise the global logger. Safe to call more than once; subsequent
/// calls are no-ops.
pub fn init() {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_secs()
        .try_init();
}

/// Initialise with an explicit default filter, still overridable via
/// `RUST_LOG`. Used by integration tests.
pub fn init_with_default(filter: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp_secs()
        .try_init();
}
