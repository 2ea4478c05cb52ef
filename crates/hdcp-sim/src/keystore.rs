//! Simulated secure-side key-store.

use std::sync::{Arc, Mutex};

use hdcp_core::{KeyStoreError, Ksv};
use hdcp_keystore::{Command, RpcResponse, SecureChannel};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Private device keys (40 x 56 bits). Wiped when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
struct DeviceKeys {
    keys: [u8; 280],
}

impl DeviceKeys {
    fn generate() -> Self {
        let mut keys = [0u8; 280];
        rand::Rng::fill(&mut rand::thread_rng(), &mut keys[..]);
        Self { keys }
    }
}

/// One call seen by the secure side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    pub command: Command,
    pub p0: u32,
    pub p1: u32,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// [`SecureChannel`] backed by an in-process key vault.
pub struct SimSecureChannel {
    aksv: Ksv,
    keys: DeviceKeys,
    keys_in_cipher: bool,
    open: bool,
    refuse_open: bool,
    fail: Option<(Command, u32)>,
    calls: CallLog,
}

impl SimSecureChannel {
    pub fn new(aksv: Ksv) -> Self {
        Self {
            aksv,
            keys: DeviceKeys::generate(),
            keys_in_cipher: false,
            open: false,
            refuse_open: false,
            fail: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reject session opens.
    pub fn refuse_open(mut self) -> Self {
        self.refuse_open = true;
        self
    }

    /// Answer every `command` with `status`.
    pub fn fail_command(mut self, command: Command, status: u32) -> Self {
        self.fail = Some((command, status));
        self
    }

    pub fn calls(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    pub fn keys_in_cipher(&self) -> bool {
        self.keys_in_cipher
    }
}

impl SecureChannel for SimSecureChannel {
    fn open(&mut self) -> Result<(), KeyStoreError> {
        if self.refuse_open {
            return Err(KeyStoreError::Channel("trusted application unavailable".to_string()));
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.keys_in_cipher = false;
    }

    fn invoke(&mut self, command: Command, p0: u32, p1: u32) -> Result<RpcResponse, KeyStoreError> {
        if !self.open {
            return Err(KeyStoreError::Channel("channel not open".to_string()));
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Call { command, p0, p1 });
        }
        if let Some((failing, status)) = self.fail {
            if failing == command {
                return Ok(RpcResponse::failed(status));
            }
        }
        let response = match command {
            Command::GetAksv => RpcResponse::with_payload(*self.aksv.as_bytes()),
            Command::LoadKey => {
                self.keys_in_cipher = self.keys.keys.iter().any(|b| *b != 0);
                debug!("Device keys loaded into cipher");
                RpcResponse::ok()
            }
            _ => RpcResponse::ok(),
        };
        Ok(response)
    }
}
