use tracing::Level;

/// Installs the global fmt subscriber. Later calls are no-ops, so every test
/// may initialize tracing on its own.
pub fn initialize_tracing(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_thread_ids(true)
        .try_init();
}
