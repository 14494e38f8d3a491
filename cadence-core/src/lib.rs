//! # Cadence Core
//!
//! Core types for the cadence windowed memoization cache.
//!
//! This crate provides the foundational building blocks used by the other
//! cadence crates:
//!
//! - **Errors**: One error type covering configuration and key derivation
//! - **Zones**: Timezone specification and IANA resolution
//! - **Clock**: A wall-clock seam so caches are testable without sleeping
//! - **Config**: Cache behavior flags with environment overrides
//!
//! ## Example
//!
//! ```rust
//! use cadence_core::{CacheConfig, ZoneSpec};
//!
//! let zone = ZoneSpec::parse("America/New_York");
//! assert!(zone.resolve().is_ok());
//!
//! let config = CacheConfig::default();
//! assert!(!config.disabled);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod zone;

// Re-export commonly used items at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use constants::*;
pub use error::{CadenceError, Result};
pub use zone::{Zone, ZoneSpec};
