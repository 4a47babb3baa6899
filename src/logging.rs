use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// The filter is read from `CHX_LOG`, then `RUST_LOG`, falling back to
/// `info,contact_harness=debug`. Output goes to stderr so stdout stays
/// parseable.
pub fn init_tracing() {
    let filter = std::env::var("CHX_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info,contact_harness=debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
