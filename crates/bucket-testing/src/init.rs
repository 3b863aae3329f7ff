use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a `tracing-subscriber` env-filter/fmt layer once per test
/// process, so `RUST_LOG=debug cargo test -- --nocapture` shows the
/// `tracing::debug!` calls scattered through the other crates. Safe to call
/// from every test that wants logs; later calls are no-ops.
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}
