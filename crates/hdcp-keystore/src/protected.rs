//! Addresses and values of registers only the secure side may write.

/// HDCP control register in the secure world.
pub const HDCP_CTRL: u32 = 0x8888_0000;

/// Sink plugged in and powered.
pub const HPD_ACTIVE: u32 = 0xaaaa_0005;
/// Sink unplugged or powered off.
pub const HPD_INACTIVE: u32 = 0xaaaa_0006;
/// Start the HDCP 2.x state machine.
pub const HDCP2_SM_START: u32 = 0xaaaa_0000;

/// Soft reset and clock bits for `write_reset_control`.
pub mod reset {
    pub const HDCP1X: u32 = 1 << 0;
    pub const HDCP2X_CORE: u32 = 1 << 1;
    pub const HDCP2X_CLOCK_EN: u32 = 1 << 2;
}
