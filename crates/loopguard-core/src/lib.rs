//! # loopguard-core — Foundational Types
//!
//! Shared building blocks for the loopguard workspace:
//!
//! - **Configuration** (`config.rs`): the JSON configuration document
//!   with per-option defaults and secret-redacting `Debug`.
//! - **Temporal** (`temporal.rs`): UTC second-precision `Timestamp`; the
//!   single source of age and window arithmetic.
//! - **Identity** (`identity.rs`): release-name normalization and the
//!   dedup identity (duplicate key vs normalized name) under which a
//!   download is tracked.

pub mod config;
pub mod identity;
pub mod temporal;

pub use config::{ArrInstance, Config, ConfigError, LogLevel, NotifierConfig};
pub use identity::{normalize_release_name, Identity};
pub use temporal::Timestamp;
