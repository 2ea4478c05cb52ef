//! # hdcp-ddc
//!
//! DDC transaction engine for the HDCP transmitter.
//!
//! This crate provides:
//! - The [`DdcBus`] trait for single-burst bus access
//! - [`DdcEngine`], which splits long reads into windows, retries failed
//!   transactions and recovers a stuck bus
//! - [`DdcTransaction`] diagnostic records

pub mod engine;
pub mod traits;
pub mod transaction;

pub use engine::DdcEngine;
pub use traits::DdcBus;
pub use transaction::{DdcTransaction, Direction, Outcome};

#[cfg(test)]
pub use traits::MockDdcBus;
