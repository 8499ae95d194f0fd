//! Logging shim.
//!
//! With the `tracing` feature (default) the macros below are the real
//! `tracing` macros; without it they compile to nothing and the crate has no
//! logging overhead at all.

/// Install an env-filtered fmt subscriber.
///
/// Intended for binaries and integration tests. `RUST_LOG` overrides the
/// default filter of `mdr=info`. Does nothing when the `tracing` feature is
/// disabled, or when a subscriber is already installed.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mdr=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_target(true)
        .try_init()
        .ok();
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! log_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use log_noop as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use log_noop as error;
#[cfg(not(feature = "tracing"))]
pub(crate) use log_noop as info;
#[cfg(not(feature = "tracing"))]
pub(crate) use log_noop as trace;
#[cfg(not(feature = "tracing"))]
pub(crate) use log_noop as warn;
