//! Error types for the HDCP transmitter.

use thiserror::Error;

use crate::ksv::Ksv;

/// Primary error type for all authentication operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("DDC transport error: {0}")]
    Transport(#[from] DdcError),

    #[error("Secure key-store error: {0}")]
    SecureCall(#[from] KeyStoreError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("SRM error: {0}")]
    Srm(#[from] SrmError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HDCP engine reported hardware fault 0x{code:02x}")]
    HardwareFault { code: u8 },

    #[error("Worker thread error: {0}")]
    Worker(String),

    #[error("Operation timed out")]
    Timeout,
}

/// Errors on the DDC sideband bus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DdcError {
    #[error("No acknowledge from device 0x{device:02x} at offset 0x{offset:02x}")]
    Nack { device: u8, offset: u8 },

    #[error("Bus held low after clock recovery")]
    BusLow,

    #[error("Transaction timed out")]
    Timeout,

    #[error("Invalid transfer length: {0}")]
    InvalidLength(usize),

    #[error("Bus unavailable: {0}")]
    BusUnavailable(String),
}

/// Errors from the secure key-store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyStoreError {
    #[error("Key-store session is not open")]
    SessionClosed,

    #[error("Key-store session already open")]
    SessionAlreadyOpen,

    #[error("Key-store command {command} failed with status 0x{status:08x}")]
    CallFailed { command: &'static str, status: u32 },

    #[error("Key-store returned an invalid payload for {0}")]
    InvalidPayload(&'static str),

    #[error("Secure channel error: {0}")]
    Channel(String),
}

/// HDCP protocol violations. Each one forces a full re-authentication.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Illegal KSV {0} (must contain exactly twenty 1 bits)")]
    IllegalKsv(Ksv),

    #[error("KSV {0} is revoked")]
    RevokedKsv(Ksv),

    #[error("KSV {0} appears more than once in the topology")]
    DuplicateKsv(Ksv),

    #[error("{what} mismatch")]
    ValueMismatch { what: &'static str },

    #[error("Retries exhausted in {state}")]
    RetriesExhausted { state: &'static str },

    #[error("Downstream topology exceeded: {0}")]
    TopologyExceeded(&'static str),

    #[error("Invalid receiver ID list: {0}")]
    InvalidReceiverIdList(String),

    #[error("{0} not ready")]
    NotReady(&'static str),
}

/// Errors while parsing a System Renewability Message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SrmError {
    #[error("SRM too short: {0} bytes")]
    TooShort(usize),

    #[error("Unsupported SRM id 0x{0:x}")]
    UnsupportedId(u8),

    #[error("Invalid VRL length {0}")]
    InvalidLength(u32),

    #[error("Revocation record truncated at byte {0}")]
    Truncated(usize),
}

/// Errors in engine configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}

/// Result type alias using the HDCP error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this failure must escalate to a physical-link power cycle.
    pub fn is_hardware_fault(&self) -> bool {
        matches!(self, Error::HardwareFault { .. })
    }
}
