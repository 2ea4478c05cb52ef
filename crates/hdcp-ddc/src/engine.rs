//! Windowed, retrying DDC transactions.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use hdcp_core::registers::{HDCP_DEVICE, KSV_FIFO};
use hdcp_core::{DdcConfig, DdcError};
use tracing::{debug, warn};

use crate::transaction::{DdcTransaction, Direction, Outcome};
use crate::DdcBus;

/// A failed attempt, and whether it already consumed device state.
struct Failed {
    err: DdcError,
    consumed: bool,
}

impl From<DdcError> for Failed {
    fn from(err: DdcError) -> Self {
        Self {
            err,
            consumed: false,
        }
    }
}

/// Transaction engine over a shared DDC bus.
///
/// The bus sits behind `Arc<Mutex<_>>` so other users of the same wires
/// (EDID reads, SCDC polling) can share it. The lock is held for exactly one
/// logical transaction.
pub struct DdcEngine<B: DdcBus> {
    bus: Arc<Mutex<B>>,
    config: DdcConfig,
    last: Option<DdcTransaction>,
}

impl<B: DdcBus> DdcEngine<B> {
    pub fn new(bus: B, config: DdcConfig) -> Self {
        Self::with_shared_bus(Arc::new(Mutex::new(bus)), config)
    }

    /// Build on a bus already shared with other users.
    pub fn with_shared_bus(bus: Arc<Mutex<B>>, config: DdcConfig) -> Self {
        Self {
            bus,
            config,
            last: None,
        }
    }

    /// Handle to the underlying bus for other bus users.
    pub fn shared_bus(&self) -> Arc<Mutex<B>> {
        Arc::clone(&self.bus)
    }

    /// Most recent issued transaction.
    pub fn last_transaction(&self) -> Option<&DdcTransaction> {
        self.last.as_ref()
    }

    /// Read `length` bytes starting at `offset`.
    ///
    /// Lengths above the burst window are split into sub-reads. The KSV FIFO
    /// is read through a fixed offset; every other register advances the
    /// offset by the window size and must stay inside the 256-byte register
    /// space. Each sub-read after the first re-checks the bus, and any failure
    /// aborts the whole read. A FIFO read is not retried once a window has
    /// drained bytes from it. The result only equals an atomic read when the
    /// registers do not change mid-sequence.
    pub fn read(&mut self, device: u8, offset: u8, length: usize) -> Result<Vec<u8>, DdcError> {
        let fifo = device == HDCP_DEVICE && offset == KSV_FIFO;
        if length == 0 || (!fifo && offset as usize + length > 256) {
            return Err(DdcError::InvalidLength(length));
        }
        let window = if fifo {
            self.config.ksv_fifo_burst_len
        } else {
            self.config.burst_len
        };
        if window == 0 {
            return Err(DdcError::InvalidLength(window));
        }

        let settle = self.settle();
        let mut buf = vec![0u8; length];
        self.with_retries(Direction::Read, device, offset, length, |bus| {
            Self::recover_if_stuck(bus, settle)?;
            let mut done = 0usize;
            for (i, chunk) in buf.chunks_mut(window).enumerate() {
                if i > 0 && bus.is_bus_low() {
                    return Err(DdcError::BusLow.into());
                }
                let sub_offset = if fifo {
                    offset
                } else {
                    (offset as usize + done) as u8
                };
                bus.read(device, sub_offset, chunk).map_err(|err| Failed {
                    err,
                    consumed: fifo && done > 0,
                })?;
                done += chunk.len();
            }
            Ok(())
        })?;
        Ok(buf)
    }

    /// Read a fixed-size register block.
    pub fn read_array<const N: usize>(&mut self, device: u8, offset: u8) -> Result<[u8; N], DdcError> {
        let data = self.read(device, offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&data);
        Ok(out)
    }

    pub fn read_u8(&mut self, device: u8, offset: u8) -> Result<u8, DdcError> {
        let [b] = self.read_array::<1>(device, offset)?;
        Ok(b)
    }

    /// Write `data` starting at `offset` in a single burst.
    pub fn write(&mut self, device: u8, offset: u8, data: &[u8]) -> Result<(), DdcError> {
        if data.is_empty() {
            return Err(DdcError::InvalidLength(0));
        }
        let settle = self.settle();
        self.with_retries(Direction::Write, device, offset, data.len(), |bus| {
            Self::recover_if_stuck(bus, settle)?;
            Ok(bus.write(device, offset, data)?)
        })
    }

    fn settle(&self) -> Duration {
        Duration::from_millis(self.config.settle_ms as u64)
    }

    fn lock(&self) -> Result<MutexGuard<'_, B>, DdcError> {
        self.bus
            .lock()
            .map_err(|_| DdcError::BusUnavailable("bus lock poisoned".to_string()))
    }

    /// Run one logical transaction, retrying the whole of it on Nack or
    /// Timeout unless the failed attempt consumed device state. The bus lock
    /// is released between attempts.
    fn with_retries<F>(
        &mut self,
        direction: Direction,
        device: u8,
        offset: u8,
        length: usize,
        mut op: F,
    ) -> Result<(), DdcError>
    where
        F: FnMut(&mut B) -> Result<(), Failed>,
    {
        let mut retries = 0u32;
        loop {
            let result = {
                let mut bus = self.lock()?;
                op(&mut bus)
            };

            match result {
                Ok(()) => {
                    self.record(direction, device, offset, length, retries, Outcome::Ok);
                    return Ok(());
                }
                Err(Failed {
                    err: err @ (DdcError::Nack { .. } | DdcError::Timeout),
                    consumed: false,
                }) if retries < self.config.transaction_retries => {
                    retries += 1;
                    debug!(
                        "DDC {:?} 0x{:02x}@0x{:02x} failed ({}), retry {}",
                        direction, device, offset, err, retries
                    );
                }
                Err(Failed { err, consumed }) => {
                    if consumed {
                        debug!(
                            "DDC read 0x{:02x}@0x{:02x} already drained, not retrying",
                            device, offset
                        );
                    }
                    if let Some(outcome) = Outcome::from_error(&err) {
                        self.record(direction, device, offset, length, retries, outcome);
                    }
                    warn!(
                        "DDC {:?} 0x{:02x}@0x{:02x} len {} failed: {}",
                        direction, device, offset, length, err
                    );
                    return Err(err);
                }
            }
        }
    }

    fn recover_if_stuck(bus: &mut B, settle: Duration) -> Result<(), DdcError> {
        if !bus.is_bus_low() {
            return Ok(());
        }
        debug!("DDC bus held low, issuing clock recovery");
        bus.clock_recovery();
        thread::sleep(settle);
        if bus.is_bus_low() {
            return Err(DdcError::BusLow);
        }
        Ok(())
    }

    fn record(
        &mut self,
        direction: Direction,
        device: u8,
        offset: u8,
        length: usize,
        retries: u32,
        outcome: Outcome,
    ) {
        self.last = Some(DdcTransaction {
            direction,
            device,
            offset,
            length,
            retries,
            outcome,
        });
    }
}
