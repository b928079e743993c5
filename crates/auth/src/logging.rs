use log::LevelFilter;

/// Initialize logging for a binary.
/// Should be called once at the start of main(); later calls are ignored.
///
/// `RUST_LOG` still takes precedence over the level chosen here.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = env_logger::builder()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

/// Log level helper to determine if debug logging is enabled
#[must_use]
pub fn is_debug_enabled() -> bool {
    log::log_enabled!(log::Level::Debug)
}
