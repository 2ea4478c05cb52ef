//! # hdcp-srm
//!
//! System Renewability Message handling for the HDCP transmitter.
//!
//! This crate provides:
//! - [`SrmList`], a parsed HDCP 1.x revocation list
//! - [`RevocationValidator`], pure KSV and topology checks against it

pub mod srm;
pub mod validator;

pub use srm::{SrmHeader, SrmList};
pub use validator::RevocationValidator;
