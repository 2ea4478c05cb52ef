//! Secure key-store RPC commands and replies.

use std::fmt;

use hdcp_core::KSV_LEN;

/// Status word of a successful call.
pub const STATUS_OK: u32 = 0;

/// Commands understood by the secure side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    WriteRegister = 1,
    WriteReset = 2,
    GetAksv = 3,
    LoadKey = 4,
    LoadFirmware = 5,
    ResetFirmware = 6,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::WriteRegister => "write-register",
            Command::WriteReset => "write-reset",
            Command::GetAksv => "get-aksv",
            Command::LoadKey => "load-key",
            Command::LoadFirmware => "load-firmware",
            Command::ResetFirmware => "reset-firmware",
        }
    }

    pub fn code(&self) -> u32 {
        *self as u32
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reply to a command: a status word plus, for get-AKSV, five key bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RpcResponse {
    pub status: u32,
    pub payload: Option<[u8; KSV_LEN]>,
}

impl RpcResponse {
    pub fn ok() -> Self {
        Self {
            status: STATUS_OK,
            payload: None,
        }
    }

    pub fn with_payload(payload: [u8; KSV_LEN]) -> Self {
        Self {
            status: STATUS_OK,
            payload: Some(payload),
        }
    }

    pub fn failed(status: u32) -> Self {
        Self {
            status,
            payload: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}
