//! Tracing setup. Library code never installs a global subscriber (SPEC_FULL
//! §0.2); this helper exists solely for tests that want readable output.

/// Configures a `tracing-subscriber` `EnvFilter` subscriber for test runs.
/// Safe to call more than once — a subscriber already installed by an
/// earlier test in the same process is left in place.
#[cfg(test)]
pub fn init_test_subscriber() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
