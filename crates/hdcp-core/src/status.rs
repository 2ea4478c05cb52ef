//! Link status and authentication progress types.

use serde::{Deserialize, Serialize};

/// Link status observable by the rest of the display stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkStatus {
    #[default]
    Disconnected,
    ConnectedUnencrypted,
    ConnectedEncrypted,
}

impl LinkStatus {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, LinkStatus::ConnectedEncrypted)
    }
}

/// Final result of an authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthResult {
    #[default]
    Undetermined,
    Authenticated,
    Failed,
}

/// HDCP protocol generation negotiated with the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProtocolVersion {
    #[default]
    Undetermined,
    Hdcp1x,
    Hdcp2x,
}

/// Hot-plug and sink power state reported by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum HotplugState {
    #[default]
    Unplugged = 0,
    PluggedSinkOff = 1,
    PluggedSinkOn = 2,
}

impl HotplugState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            2 => HotplugState::PluggedSinkOn,
            1 => HotplugState::PluggedSinkOff,
            _ => HotplugState::Unplugged,
        }
    }

    /// Plugged in and the sink is powered: the only state in which
    /// authentication may proceed.
    pub fn is_active(&self) -> bool {
        matches!(self, HotplugState::PluggedSinkOn)
    }
}

/// Outcome of checking a topology against the revocation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationResult {
    /// No revocation list is loaded.
    NotChecked,
    Revoked,
    Clean,
}

/// Interrupt sources forwarded from the transmitter hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptKind {
    /// HDCP 1.x Ri updated (every 128 frames).
    RiReady,
    /// HDCP 1.x V computation finished.
    VReady,
    /// HDCP 2.x firmware code check done.
    CodeCheckDone,
    /// HDCP 2.x AKE_Init sent and answered.
    AkeSent,
    /// HDCP 2.x receiver certificate received.
    CertReceived,
    /// HDCP 2.x repeater receiver-ID list changed.
    ReceiverIdChanged,
    /// HDCP 2.x stream management transfer done.
    StreamManageDone,
    AuthDone,
    AuthFail,
    /// Sink requested re-authentication.
    ReauthRequest,
}

/// HDCP 1.x progress bits, one per verified step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthProgress(pub u8);

impl AuthProgress {
    pub const R0_VERIFIED: u8 = 0x01;
    pub const V_VERIFIED: u8 = 0x02;
    pub const RI_VERIFIED: u8 = 0x04;
    pub const COMPLETE: u8 = 0x08;

    pub fn set(&mut self, bits: u8) {
        self.0 |= bits;
    }

    pub fn contains(&self, bits: u8) -> bool {
        self.0 & bits == bits
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}
