//! Transmitter-side hardware seams.
//!
//! [`HdcpHardware`] is the HDCP block of the HDMI transmitter (cipher, hash
//! engine, 2.x protocol engine). [`LinkControl`] is the rest of the
//! connector the engine needs to touch: A/V mute and PHY power.

use hdcp_core::registers::{AN_LEN, RI_LEN, V_PRIME_LEN};
use hdcp_core::{Bstatus, Ksv, KSV_LEN};

/// First HDCP 2.x engine state code that signals an error.
pub const HDCP2_ERR_FIRST: u8 = 0x30;
/// Last HDCP 2.x engine state code that signals an error.
pub const HDCP2_ERR_LAST: u8 = 0x3e;
/// Error code raised when the physical link misbehaves.
pub const HDCP2_ERR_LINK: u8 = 0x30;

/// Whether a 2.x engine state code is an error.
pub fn is_hdcp2_error(code: u8) -> bool {
    (HDCP2_ERR_FIRST..=HDCP2_ERR_LAST).contains(&code)
}

/// Result of the hardware V comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VStatus {
    NotReady,
    Match,
    Mismatch,
}

/// HDCP 2.x interrupt status bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hdcp2Interrupts(pub u32);

impl Hdcp2Interrupts {
    pub const CODE_CHECK_DONE: u32 = 1 << 0;
    pub const AKE_SENT: u32 = 1 << 1;
    pub const CERT_RECEIVED: u32 = 1 << 2;
    pub const RECEIVER_ID_CHANGED: u32 = 1 << 3;
    pub const STREAM_MANAGE_DONE: u32 = 1 << 4;
    pub const AUTH_DONE: u32 = 1 << 5;
    pub const AUTH_FAIL: u32 = 1 << 6;

    pub fn intersects(&self, bits: u32) -> bool {
        self.0 & bits != 0
    }

    pub fn set(&mut self, bits: u32) {
        self.0 |= bits;
    }
}

/// Downstream topology reported by the 2.x engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Topology2x {
    pub device_count: u8,
    pub depth: u8,
    pub max_devs_exceeded: bool,
    pub max_cascade_exceeded: bool,
}

/// HDCP block of the transmitter.
#[cfg_attr(test, mockall::automock)]
pub trait HdcpHardware: Send {
    fn reset_hdcp1x(&mut self);

    fn reset_hdcp2x(&mut self);

    /// Tell the cipher whether the downstream device is a repeater.
    fn set_repeater_mode(&mut self, downstream_is_repeater: bool);

    /// Latch a fresh An.
    fn generate_an(&mut self) -> [u8; AN_LEN];

    fn write_bksv(&mut self, bksv: &Ksv);

    /// Signal that the key-store finished loading device keys.
    fn key_load_done(&mut self);

    fn ri_ready(&mut self) -> bool;

    /// Ri (R0 right after authentication) as computed locally.
    fn local_ri(&mut self) -> [u8; RI_LEN];

    fn enable_encryption_1x(&mut self, enable: bool);

    /// Feed KSV list, BSTATUS and V' into the hash engine.
    fn load_repeater_hash(&mut self, ksv_list: &[Ksv], bstatus: Bstatus, v_prime: &[u8; V_PRIME_LEN]);

    fn v_status(&mut self) -> VStatus;

    fn clear_interrupts_2x(&mut self);

    /// Start the firmware code update after it was (re)loaded.
    fn start_code_update(&mut self);

    /// Program and kick the 2.x protocol engine.
    fn start_authentication_2x(&mut self);

    fn interrupts_2x(&mut self) -> Hdcp2Interrupts;

    fn clear_auth_fail(&mut self);

    /// Current 2.x engine state code.
    fn state_2x(&mut self) -> u8;

    fn is_repeater_2x(&mut self) -> bool;

    fn receiver_id(&mut self) -> Ksv;

    fn topology_2x(&mut self) -> Topology2x;

    /// Latch the repeater's receiver-ID list into the status registers.
    fn latch_receiver_ids(&mut self);

    /// One 5-byte receiver ID from the latched list.
    fn receiver_id_at(&mut self, index: usize) -> [u8; KSV_LEN];

    /// Acknowledge RepeaterAuth_Stream_Manage.
    fn ack_stream_manage(&mut self);

    fn enable_encryption_2x(&mut self, enable: bool);

    /// Let the hardware poll the sink's RxStatus over DDC.
    fn set_ddc_hw_poll(&mut self, enable: bool);
}

/// Connector-level controls.
#[cfg_attr(test, mockall::automock)]
pub trait LinkControl: Send {
    fn av_mute(&mut self);

    fn av_unmute(&mut self);

    fn phy_power_off(&mut self);

    fn phy_power_on(&mut self);

    fn tmds_above_340mhz(&self) -> bool;

    /// Sink driven as DVI; HDCP 2.x is not used then.
    fn is_dvi_mode(&self) -> bool;
}
