//! Simulated HDMI sink and the DDC bus it sits on.
//!
//! The sink answers reads from its HDCP port the way a receiver or repeater
//! would. R0/Ri' and V' come from a SHA-256 based stand-in for the real
//! cipher; the simulated transmitter uses the same derivation, so the two
//! sides agree unless a corruption flag is set.

use std::sync::{Arc, Mutex, MutexGuard};

use hdcp_core::registers::{
    AKSV, AN, AN_LEN, BCAPS, BKSV, BSTATUS, BSTATUS_LEN, HDCP2_VERSION, HDCP2_VERSION_22, HDCP_DEVICE,
    KSV_FIFO, RI_LEN, RI_PRIME, SCDC_DEVICE, SCDC_TMDS_CONFIG, V_PRIME, V_PRIME_LEN,
};
use hdcp_core::{Bcaps, Bstatus, DdcError, Ksv, KSV_LEN};
use hdcp_ddc::DdcBus;
use sha2::{Digest, Sha256};
use tracing::trace;

/// R0 / Ri for a given An, AKSV and BKSV.
pub fn derive_ri(an: &[u8; AN_LEN], aksv: &Ksv, bksv: &Ksv) -> [u8; RI_LEN] {
    let digest = Sha256::new()
        .chain_update(b"ri")
        .chain_update(an)
        .chain_update(aksv.as_bytes())
        .chain_update(bksv.as_bytes())
        .finalize();
    [digest[0], digest[1]]
}

/// V over a repeater's KSV list and BSTATUS.
pub fn derive_v(ksv_list: &[Ksv], bstatus: Bstatus) -> [u8; V_PRIME_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(b"v");
    for ksv in ksv_list {
        hasher.update(ksv.as_bytes());
    }
    hasher.update(bstatus.to_bytes());
    let digest = hasher.finalize();
    let mut v = [0u8; V_PRIME_LEN];
    v.copy_from_slice(&digest[..V_PRIME_LEN]);
    v
}

/// How the sink's HDCP 2.x receiver behaves once authentication starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Hdcp2Behavior {
    /// Every protocol step completes.
    #[default]
    Normal,
    /// AKE completes, the certificate never arrives and the engine keeps
    /// reporting the link fault code.
    LinkFault,
    /// The receiver rejects authentication.
    AuthFail,
}

/// HDCP 2.x view of the sink, consumed by the simulated transmitter engine.
#[derive(Debug, Clone, Default)]
pub struct Hdcp2Sink {
    pub receiver_id: Ksv,
    pub is_repeater: bool,
    pub receiver_ids: Vec<[u8; KSV_LEN]>,
    pub depth: u8,
    pub max_devs_exceeded: bool,
    pub max_cascade_exceeded: bool,
    pub behavior: Hdcp2Behavior,
    /// Engine status reads that still show AKE in progress.
    pub ake_polls: u32,
    /// Further status reads before the certificate arrives.
    pub cert_polls: u32,
}

/// Everything the sink knows and everything it has been told.
#[derive(Debug, Clone, Default)]
pub struct SinkModel {
    pub bksv: Ksv,
    pub bcaps: Bcaps,
    pub bstatus: Bstatus,
    /// Downstream KSVs of a 1.x repeater.
    pub ksv_list: Vec<Ksv>,
    /// BCAPS reads after AKSV before the KSV FIFO reports ready.
    pub ready_after_reads: u32,
    pub hdcp2_capable: bool,
    pub hdcp2: Hdcp2Sink,

    pub corrupt_ri: bool,
    pub corrupt_v: bool,

    /// Reads to NACK before answering again.
    pub pending_nacks: u32,
    /// Bus held low until the next clock recovery.
    pub bus_stuck: bool,

    pub an: Option<[u8; AN_LEN]>,
    pub aksv: Option<Ksv>,
    pub bcaps_reads: u32,
    pub fifo_pos: usize,
    pub scdc_writes: Vec<u8>,
    pub clock_recoveries: u32,
}

/// Sink state shared between the bus, the transmitter and test probes.
pub type SharedSink = Arc<Mutex<SinkModel>>;

pub(crate) fn lock(sink: &SharedSink) -> MutexGuard<'_, SinkModel> {
    sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SinkModel {
    pub fn ri_prime(&self) -> [u8; RI_LEN] {
        let (Some(an), Some(aksv)) = (self.an, self.aksv) else {
            return [0; RI_LEN];
        };
        let mut ri = derive_ri(&an, &aksv, &self.bksv);
        if self.corrupt_ri {
            ri[0] ^= 0xff;
        }
        ri
    }

    pub fn v_prime(&self) -> [u8; V_PRIME_LEN] {
        let mut v = derive_v(&self.ksv_list, self.bstatus);
        if self.corrupt_v {
            v[0] ^= 0xff;
        }
        v
    }

    fn current_bcaps(&self) -> u8 {
        let mut caps = self.bcaps.0;
        if self.bcaps.is_repeater() && self.aksv.is_some() && self.bcaps_reads > self.ready_after_reads {
            caps |= Bcaps::READY;
        }
        caps
    }

    fn fifo(&self) -> Vec<u8> {
        self.ksv_list
            .iter()
            .flat_map(|ksv| ksv.as_bytes().iter().copied())
            .collect()
    }

    fn hdcp_byte(&self, offset: u8) -> u8 {
        let at = |base: u8, bytes: &[u8]| bytes.get((offset - base) as usize).copied().unwrap_or(0);
        let within = |base: u8, len: usize| (base..base + len as u8).contains(&offset);
        match offset {
            _ if within(BKSV, KSV_LEN) => at(BKSV, self.bksv.as_bytes()),
            _ if within(RI_PRIME, RI_LEN) => at(RI_PRIME, &self.ri_prime()),
            _ if within(V_PRIME, V_PRIME_LEN) => at(V_PRIME, &self.v_prime()),
            BCAPS => self.current_bcaps(),
            _ if within(BSTATUS, BSTATUS_LEN) => at(BSTATUS, &self.bstatus.to_bytes()),
            HDCP2_VERSION if self.hdcp2_capable => HDCP2_VERSION_22,
            _ => 0,
        }
    }

    fn read_hdcp(&mut self, offset: u8, buf: &mut [u8]) {
        if offset == KSV_FIFO {
            let fifo = self.fifo();
            for b in buf.iter_mut() {
                *b = fifo.get(self.fifo_pos).copied().unwrap_or(0);
                self.fifo_pos += 1;
            }
            return;
        }
        if offset == BCAPS {
            self.bcaps_reads += 1;
        }
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.hdcp_byte(offset.wrapping_add(i as u8));
        }
    }

    fn write_hdcp(&mut self, offset: u8, data: &[u8]) {
        match offset {
            AN if data.len() == AN_LEN => {
                let mut an = [0u8; AN_LEN];
                an.copy_from_slice(data);
                self.an = Some(an);
            }
            AKSV => {
                self.aksv = Ksv::from_slice(data);
                self.bcaps_reads = 0;
                self.fifo_pos = 0;
            }
            _ => trace!("Sink ignores write at 0x{:02x}", offset),
        }
    }
}

/// [`DdcBus`] in front of a [`SinkModel`].
#[derive(Clone)]
pub struct SimDdcBus {
    sink: SharedSink,
}

impl SimDdcBus {
    pub fn new(sink: SharedSink) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> SharedSink {
        Arc::clone(&self.sink)
    }
}

impl DdcBus for SimDdcBus {
    fn read(&mut self, device: u8, offset: u8, buf: &mut [u8]) -> Result<(), DdcError> {
        let mut sink = lock(&self.sink);
        if sink.pending_nacks > 0 {
            sink.pending_nacks -= 1;
            return Err(DdcError::Nack { device, offset });
        }
        match device {
            HDCP_DEVICE => {
                sink.read_hdcp(offset, buf);
                Ok(())
            }
            _ => Err(DdcError::Nack { device, offset }),
        }
    }

    fn write(&mut self, device: u8, offset: u8, data: &[u8]) -> Result<(), DdcError> {
        let mut sink = lock(&self.sink);
        match (device, offset) {
            (HDCP_DEVICE, _) => {
                sink.write_hdcp(offset, data);
                Ok(())
            }
            (SCDC_DEVICE, SCDC_TMDS_CONFIG) => {
                sink.scdc_writes.extend_from_slice(data);
                Ok(())
            }
            _ => Err(DdcError::Nack { device, offset }),
        }
    }

    fn is_bus_low(&mut self) -> bool {
        lock(&self.sink).bus_stuck
    }

    fn clock_recovery(&mut self) {
        let mut sink = lock(&self.sink);
        sink.bus_stuck = false;
        sink.clock_recoveries += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdcp_core::DdcConfig;
    use hdcp_ddc::DdcEngine;

    fn ksv(seed: u8) -> Ksv {
        Ksv::new([0x0f, 0x0f, seed, 0xf0, 0xf0])
    }

    fn shared(model: SinkModel) -> SharedSink {
        Arc::new(Mutex::new(model))
    }

    #[test]
    fn ri_prime_matches_transmitter_derivation() {
        let bksv = ksv(0xf0);
        let aksv = ksv(0x0f);
        let an = [7u8; AN_LEN];
        let sink = shared(SinkModel {
            bksv,
            ..SinkModel::default()
        });
        let mut ddc = DdcEngine::new(SimDdcBus::new(sink), DdcConfig::default());
        ddc.write(HDCP_DEVICE, AN, &an).unwrap();
        ddc.write(HDCP_DEVICE, AKSV, aksv.as_bytes()).unwrap();

        let ri: [u8; RI_LEN] = ddc.read_array(HDCP_DEVICE, RI_PRIME).unwrap();
        assert_eq!(ri, derive_ri(&an, &aksv, &bksv));
    }

    #[test]
    fn fifo_streams_across_windows() {
        let list: Vec<Ksv> = (0..5).map(|i| ksv(0xf0 ^ i)).collect();
        let sink = shared(SinkModel {
            ksv_list: list.clone(),
            ..SinkModel::default()
        });
        let config = DdcConfig {
            ksv_fifo_burst_len: 8,
            ..DdcConfig::default()
        };
        let mut ddc = DdcEngine::new(SimDdcBus::new(sink), config);
        let raw = ddc.read(HDCP_DEVICE, KSV_FIFO, list.len() * KSV_LEN).unwrap();
        assert_eq!(Ksv::split_list(&raw), list);
    }

    #[test]
    fn v_prime_spans_two_windows() {
        let list = vec![ksv(0xf0), ksv(0xe1)];
        let bstatus = Bstatus::for_topology(2, 1, true);
        let sink = shared(SinkModel {
            ksv_list: list.clone(),
            bstatus,
            ..SinkModel::default()
        });
        let mut ddc = DdcEngine::new(SimDdcBus::new(sink), DdcConfig::default());
        let v: [u8; V_PRIME_LEN] = ddc.read_array(HDCP_DEVICE, V_PRIME).unwrap();
        assert_eq!(v, derive_v(&list, bstatus));
    }

    #[test]
    fn repeater_ready_after_polls() {
        let sink = shared(SinkModel {
            bcaps: Bcaps(Bcaps::REPEATER),
            ready_after_reads: 1,
            aksv: Some(ksv(0x0f)),
            ..SinkModel::default()
        });
        let mut bus = SimDdcBus::new(Arc::clone(&sink));
        let mut b = [0u8; 1];
        bus.read(HDCP_DEVICE, BCAPS, &mut b).unwrap();
        assert!(!Bcaps(b[0]).ksv_fifo_ready());
        bus.read(HDCP_DEVICE, BCAPS, &mut b).unwrap();
        assert!(Bcaps(b[0]).ksv_fifo_ready());
    }

    #[test]
    fn pending_nacks_are_retried_by_engine() {
        let sink = shared(SinkModel {
            bcaps: Bcaps(Bcaps::HDMI_RESERVED),
            pending_nacks: 2,
            ..SinkModel::default()
        });
        let mut ddc = DdcEngine::new(SimDdcBus::new(Arc::clone(&sink)), DdcConfig::default());
        assert_eq!(ddc.read_u8(HDCP_DEVICE, BCAPS).unwrap(), Bcaps::HDMI_RESERVED);
        assert_eq!(ddc.last_transaction().unwrap().retries, 2);
    }

    #[test]
    fn scdc_writes_are_recorded() {
        let sink = shared(SinkModel::default());
        let mut bus = SimDdcBus::new(Arc::clone(&sink));
        bus.write(SCDC_DEVICE, SCDC_TMDS_CONFIG, &[0x03]).unwrap();
        assert_eq!(lock(&sink).scdc_writes, vec![0x03]);
        assert!(bus.read(SCDC_DEVICE, 0, &mut [0u8; 1]).is_err());
    }
}
