//! Traits for the secure key-store.

use hdcp_core::{KeyStoreError, Ksv};

use crate::command::{Command, RpcResponse};

/// RPC transport into the trusted environment.
#[cfg_attr(test, mockall::automock)]
pub trait SecureChannel: Send {
    /// Open a session with the trusted application.
    fn open(&mut self) -> Result<(), KeyStoreError>;

    /// Close the session.
    fn close(&mut self);

    /// Invoke a command with up to two scalar parameters.
    fn invoke(&mut self, command: Command, p0: u32, p1: u32) -> Result<RpcResponse, KeyStoreError>;
}

/// Capability over the HDCP device keys and protocol firmware.
///
/// Every call is synchronous and may fail independently; a failure never
/// leaves partial state behind on the caller's side.
pub trait KeyStore: Send {
    fn open_session(&mut self) -> Result<(), KeyStoreError>;

    fn close_session(&mut self) -> Result<(), KeyStoreError>;

    fn is_open(&self) -> bool;

    fn write_protected_register(&mut self, addr: u32, value: u32) -> Result<(), KeyStoreError>;

    /// Set the reset/clock bits in `mask` to the matching bits of `value`.
    fn write_reset_control(&mut self, value: u32, mask: u32) -> Result<(), KeyStoreError>;

    /// The transmitter's own AKSV.
    fn get_own_public_key(&mut self) -> Result<Ksv, KeyStoreError>;

    /// Load the private device keys into the HDCP 1.x cipher.
    fn load_key_material(&mut self) -> Result<(), KeyStoreError>;

    /// Load the HDCP 2.x protocol firmware.
    fn load_firmware(&mut self) -> Result<(), KeyStoreError>;

    /// Restart the already loaded HDCP 2.x firmware.
    fn reset_firmware(&mut self) -> Result<(), KeyStoreError>;
}
