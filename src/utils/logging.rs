//! Logging macros for background workers, switched per module.
//!
//! A module opts in by declaring the switch before using the macros:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_error, log_info, log_warn};
//!
//! log_info!("recorder started");
//! ```
//! Flipping `ENABLE_LOGS` to `false` silences that module without touching
//! `RUST_LOG`, which stays the global filter.

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Not gated by `ENABLE_LOGS`. Expands to a bare expression so it can sit
/// in a match arm.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!($($arg)*)
    };
}
