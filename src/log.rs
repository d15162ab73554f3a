// POWERCAP LOGGING
// CALL SITES USE log_info!/log_warn!/log_debug!. ALL OF THEM FORWARD TO tracing
// SO THE BINARY PICKS THE SINK AND FILTER IN ONE PLACE.

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { ::tracing::info!($($arg)*) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { ::tracing::warn!($($arg)*) };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { ::tracing::debug!($($arg)*) };
}

// INSTALL THE GLOBAL SUBSCRIBER. RUST_LOG WINS OVER --verbose.
pub fn init(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));

    // A SECOND init() (TESTS, RESTARTS) KEEPS THE FIRST SUBSCRIBER
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
