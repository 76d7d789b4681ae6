//! Shared test helpers

/// Install a tracing subscriber once per test binary so engine logs show up
/// under `RUST_LOG=occupancy_engine=debug cargo test -- --nocapture`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
