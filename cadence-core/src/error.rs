//! Error types for cadence.
//!
//! One error hierarchy using `thiserror`. Configuration errors surface when a
//! cache is built, never at call time; key errors surface per call and are
//! routed through the fail-open/fail-closed policy.

use thiserror::Error;

/// Result type alias using `CadenceError`.
pub type Result<T> = std::result::Result<T, CadenceError>;

/// Main error type for all cadence operations.
#[derive(Debug, Error)]
pub enum CadenceError {
    // ═══════════════════════════════════════════════════════════════════════════
    // CONFIGURATION ERRORS (build time)
    // ═══════════════════════════════════════════════════════════════════════════

    /// Interval schedule with a zero or unrepresentable interval.
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    /// Timezone name not present in the IANA database.
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    /// Cron expression that failed to parse.
    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCron {
        /// The expression as supplied.
        expr: String,
        /// Parser diagnostic.
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // KEY DERIVATION ERRORS (call time)
    // ═══════════════════════════════════════════════════════════════════════════

    /// Argument that cannot be normalized into a stable, hashable key atom.
    #[error("Unhashable argument ({arg}): {reason}")]
    UnhashableArgument {
        /// Which argument, e.g. `positional 2` or `named 'limit'`.
        arg: String,
        /// Why normalization failed.
        reason: String,
    },

    /// The same named argument supplied more than once.
    #[error("Duplicate named argument: {0}")]
    DuplicateArgument(String),
}

impl CadenceError {
    /// Returns true if this error comes from schedule or timezone
    /// configuration and can only occur while building a cache.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CadenceError::InvalidInterval(_)
                | CadenceError::UnknownTimezone(_)
                | CadenceError::InvalidCron { .. }
        )
    }

    /// Returns true if this error comes from call-argument key derivation.
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            CadenceError::UnhashableArgument { .. } | CadenceError::DuplicateArgument(_)
        )
    }
}
