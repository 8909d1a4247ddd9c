//! Log setup
//!
//! The trainer emits `tracing` events. [`Trainer::new`](crate::trainer::Trainer::new)
//! calls [`init`] with the configured verbosity; an application that installs
//! its own subscriber first keeps it.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Map a trainer verbosity to a tracing level
pub fn verbosity_to_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::WARN,
        2 => LevelFilter::INFO,
        3 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `verbosity`. Returns false when a global
/// subscriber was already installed.
pub fn init(verbosity: u8) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_to_level(verbosity).to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
