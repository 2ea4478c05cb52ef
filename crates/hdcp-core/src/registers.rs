//! Sink-side DDC register map and bit fields.

/// 7-bit DDC address of the HDCP port on the sink.
pub const HDCP_DEVICE: u8 = 0x3a;

/// 7-bit DDC address of the SCDC block on the sink.
pub const SCDC_DEVICE: u8 = 0x54;

// HDCP port register offsets
pub const BKSV: u8 = 0x00;
pub const RI_PRIME: u8 = 0x08;
pub const AKSV: u8 = 0x10;
pub const AN: u8 = 0x18;
pub const V_PRIME: u8 = 0x20;
pub const BCAPS: u8 = 0x40;
pub const BSTATUS: u8 = 0x41;
pub const KSV_FIFO: u8 = 0x43;
pub const HDCP2_VERSION: u8 = 0x50;

// SCDC register offsets
pub const SCDC_TMDS_CONFIG: u8 = 0x20;

/// Length of An in bytes.
pub const AN_LEN: usize = 8;
/// Length of Ri / R0 in bytes.
pub const RI_LEN: usize = 2;
/// Length of V' in bytes (five 32-bit words H0..H4).
pub const V_PRIME_LEN: usize = 20;
/// Length of BSTATUS in bytes.
pub const BSTATUS_LEN: usize = 2;

/// HDCP2Version bit advertising HDCP 2.2 support.
pub const HDCP2_VERSION_22: u8 = 0x04;

/// SCDC TMDS configuration bits.
pub const SCDC_SCRAMBLING_ENABLE: u8 = 1 << 0;
pub const SCDC_TMDS_CLOCK_RATIO_40: u8 = 1 << 1;

/// BCAPS capability register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bcaps(pub u8);

impl Bcaps {
    pub const FAST_REAUTH: u8 = 1 << 0;
    pub const FEATURES_1_1: u8 = 1 << 1;
    pub const FAST: u8 = 1 << 4;
    pub const READY: u8 = 1 << 5;
    pub const REPEATER: u8 = 1 << 6;
    pub const HDMI_RESERVED: u8 = 1 << 7;

    pub fn is_repeater(&self) -> bool {
        self.0 & Self::REPEATER != 0
    }

    /// KSV FIFO ready (repeaters only).
    pub fn ksv_fifo_ready(&self) -> bool {
        self.0 & Self::READY != 0
    }

    pub fn supports_fast_reauth(&self) -> bool {
        self.0 & Self::FAST_REAUTH != 0
    }
}

/// BSTATUS topology register, read as two bytes least-significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bstatus(pub u16);

impl Bstatus {
    pub const DEVICE_COUNT_MASK: u16 = 0x007f;
    pub const MAX_DEVS_EXCEEDED: u16 = 1 << 7;
    pub const DEPTH_MASK: u16 = 0x0700;
    pub const MAX_CASCADE_EXCEEDED: u16 = 1 << 11;
    pub const HDMI_MODE: u16 = 1 << 12;

    pub fn from_bytes(bytes: [u8; BSTATUS_LEN]) -> Self {
        Self(u16::from_le_bytes(bytes))
    }

    pub fn to_bytes(self) -> [u8; BSTATUS_LEN] {
        self.0.to_le_bytes()
    }

    pub fn device_count(&self) -> u8 {
        (self.0 & Self::DEVICE_COUNT_MASK) as u8
    }

    pub fn depth(&self) -> u8 {
        ((self.0 & Self::DEPTH_MASK) >> 8) as u8
    }

    pub fn max_devs_exceeded(&self) -> bool {
        self.0 & Self::MAX_DEVS_EXCEEDED != 0
    }

    pub fn max_cascade_exceeded(&self) -> bool {
        self.0 & Self::MAX_CASCADE_EXCEEDED != 0
    }

    pub fn hdmi_mode(&self) -> bool {
        self.0 & Self::HDMI_MODE != 0
    }

    /// Compose a BSTATUS value for a topology.
    pub fn for_topology(device_count: u8, depth: u8, hdmi_mode: bool) -> Self {
        let mut v = (device_count as u16 & Self::DEVICE_COUNT_MASK)
            | (((depth as u16) << 8) & Self::DEPTH_MASK);
        if hdmi_mode {
            v |= Self::HDMI_MODE;
        }
        Self(v)
    }
}
