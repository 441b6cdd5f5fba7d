use std::env;
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Log to stderr, filtered by `RUST_LOG`.
pub fn initialize_tracing() {
    let (level, env_filter) = parse_rust_log();
    let format = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false);
    tracing_subscriber::registry()
        .with(format.with_filter(LevelFilter::from(level)))
        .with(env_filter)
        .init();
}

/// Treat `RUST_LOG` as a plain level when it parses as one, and as a full
/// filter directive otherwise.
fn parse_rust_log() -> (Level, EnvFilter) {
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<Level>() {
            Ok(level) => level,
            Err(_) => return (Level::TRACE, EnvFilter::new(value)),
        },
        Err(_) => Level::INFO,
    };
    // Maximum verbosity; `level` narrows it down.
    let env_filter = EnvFilter::new(
        "WARN,\
        retrocache=TRACE,\
        retrocache_cache=TRACE,\
        retrocache_config=TRACE,\
        retrocache_fetch=TRACE,\
        retrocache_storage=TRACE,\
        ",
    );
    (level, env_filter)
}
