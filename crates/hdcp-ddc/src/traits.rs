//! Traits for the physical DDC bus.

use hdcp_core::DdcError;

/// Raw I2C-style access to the DDC sideband bus.
///
/// Implementations perform exactly one bus burst per call; windowing,
/// retries and stuck-bus recovery live in [`DdcEngine`](crate::DdcEngine).
#[cfg_attr(test, mockall::automock)]
pub trait DdcBus: Send {
    /// Read `buf.len()` bytes starting at `offset` in one burst.
    fn read(&mut self, device: u8, offset: u8, buf: &mut [u8]) -> Result<(), DdcError>;

    /// Write `data` starting at `offset` in one burst.
    fn write(&mut self, device: u8, offset: u8, data: &[u8]) -> Result<(), DdcError>;

    /// SDA or SCL held low by a device.
    fn is_bus_low(&mut self) -> bool;

    /// Toggle SCL to release a device holding the bus.
    fn clock_recovery(&mut self);
}
