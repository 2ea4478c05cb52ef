//! # hdcp-keystore
//!
//! Narrow gateway to the trusted environment that holds the HDCP device
//! keys and the HDCP 2.x protocol firmware.
//!
//! The engine only ever sees the [`KeyStore`] capability. Key material
//! never crosses it; the secure side loads keys straight into the cipher.

pub mod command;
pub mod gateway;
pub mod protected;
pub mod traits;

pub use command::{Command, RpcResponse, STATUS_OK};
pub use gateway::KeyStoreGateway;
pub use traits::{KeyStore, SecureChannel};
