//! Logging setup for docmap.
//!
//! Output is off unless one of the environment variables below asks for it.
//!
//! # Environment Variables
//!
//! - `DOCMAP_DEBUG=true|1|yes`: enable debug logging
//! - `DOCMAP_LOG_LEVEL=trace|debug|info|warn|error`: set the level explicitly
//! - `DOCMAP_LOG_FORMAT=json|pretty|compact`: output format (default: json)
//!
//! ```rust,no_run
//! use docmap_core::logging;
//!
//! logging::init();
//! ```
//!
//! Inside the crates the plain `tracing` macros are used: `trace!` for mapping
//! decisions, `debug!`/`info!` around bulk execution, `warn!` for suspicious
//! input.

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Whether `DOCMAP_DEBUG` is set to "true", "1" or "yes" (case-insensitive).
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("DOCMAP_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// The level from `DOCMAP_LOG_LEVEL`.
///
/// Falls back to "debug" when `DOCMAP_DEBUG` is enabled and "warn" otherwise.
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("DOCMAP_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// The format from `DOCMAP_LOG_FORMAT`, "json" by default.
pub fn get_log_format() -> &'static str {
    env::var("DOCMAP_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Install a global subscriber for the docmap crates.
///
/// Only the first call does anything. Without the `tracing-subscriber`
/// feature this is a no-op and callers install their own subscriber.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("DOCMAP_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!(
                "docmap={},docmap_core={},docmap_mongodb={}",
                level, level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            // try_init: the host application may already own the global subscriber.
            let installed = match get_log_format() {
                "compact" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact())
                    .try_init(),
                "pretty" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty())
                    .try_init(),
                _ => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .try_init(),
            };

            if installed.is_ok() {
                tracing::info!(level, format = get_log_format(), "docmap logging initialized");
            }
        }
    });
}

/// Set `DOCMAP_LOG_LEVEL` and initialize.
///
/// # Safety
///
/// This modifies the process environment. Call it at startup before any
/// threads are spawned.
pub fn init_with_level(level: &str) {
    // SAFETY: documented as startup-only, before threads exist.
    unsafe {
        env::set_var("DOCMAP_LOG_LEVEL", level);
    }
    init();
}

/// Debug logs only when `DOCMAP_DEBUG` is enabled at runtime.
#[macro_export]
macro_rules! docmap_debug {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_defaults() {
        // SAFETY: the only test touching these variables.
        unsafe {
            env::remove_var("DOCMAP_DEBUG");
            env::remove_var("DOCMAP_LOG_LEVEL");
            env::remove_var("DOCMAP_LOG_FORMAT");
        }
        assert!(!is_debug_enabled());
        assert_eq!(get_log_level(), "warn");
        assert_eq!(get_log_format(), "json");
    }
}
