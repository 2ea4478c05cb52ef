//! # hdcp-core
//!
//! Core types, register definitions, and error definitions shared across all
//! HDCP transmitter crates.
//!
//! This crate provides:
//! - Key Selection Vectors and their legality rule
//! - The sink-side DDC register map and capability/status bit fields
//! - Link status, authentication result and protocol version enums
//! - Engine configuration (timeouts, retry limits, DDC windows)
//! - Common error types

pub mod config;
pub mod error;
pub mod ksv;
pub mod registers;
pub mod status;

pub use config::{DdcConfig, EngineConfig, RetryLimits, Timeouts};
pub use error::{
    ConfigError, DdcError, Error, KeyStoreError, ProtocolError, Result, SrmError,
};
pub use ksv::{is_ksv_legal, Ksv, KSV_LEN};
pub use registers::{Bcaps, Bstatus};
pub use status::{
    AuthProgress, AuthResult, HotplugState, InterruptKind, LinkStatus, ProtocolVersion,
    RevocationResult,
};
