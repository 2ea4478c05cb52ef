//! Simulated HDCP block of the transmitter.

use std::sync::{Arc, Mutex, MutexGuard};

use hdcp_core::registers::{AN_LEN, RI_LEN, V_PRIME_LEN};
use hdcp_core::{Bstatus, Ksv, KSV_LEN};
use hdcp_engine::{Hdcp2Interrupts, HdcpHardware, Topology2x, VStatus};
use tracing::debug;

use crate::sink::{self, derive_ri, derive_v, Hdcp2Behavior, Hdcp2Sink, SharedSink};

/// 2.x engine state code while idle or progressing normally.
pub const HDCP2_STATE_OK: u8 = 0x00;
/// 2.x engine state code while a protocol step is still in flight.
pub const HDCP2_STATE_BUSY: u8 = 0x05;

/// Observable transmitter state.
#[derive(Debug, Clone, Default)]
pub struct TransmitterState {
    pub an: Option<[u8; AN_LEN]>,
    pub bksv: Option<Ksv>,
    pub keys_loaded: bool,
    pub repeater_mode: bool,
    pub encryption_1x: bool,
    pub encryption_2x: bool,
    pub v_status: Option<VStatus>,
    pub hdcp1x_resets: u32,
    pub hdcp2x_resets: u32,

    pub code_checked: bool,
    pub interrupts: Hdcp2Interrupts,
    pub state_code: u8,
    pub receiver_ids_latched: bool,
    pub stream_manage_acks: u32,
    pub ddc_hw_poll: bool,
    pub auth_starts: u32,
    /// Status reads since the running authentication started.
    pub auth_reads: Option<u32>,
}

impl TransmitterState {
    /// Move a running 2.x authentication along by the sink's script.
    fn progress(&mut self, sink: &Hdcp2Sink) {
        let Some(reads) = self.auth_reads else {
            return;
        };
        if reads < sink.ake_polls {
            self.state_code = HDCP2_STATE_BUSY;
            return;
        }
        self.interrupts.set(Hdcp2Interrupts::AKE_SENT);
        if sink.behavior == Hdcp2Behavior::LinkFault {
            self.state_code = hdcp_engine::hardware::HDCP2_ERR_LINK;
            self.auth_reads = None;
            return;
        }
        if reads < sink.ake_polls + sink.cert_polls {
            self.state_code = HDCP2_STATE_BUSY;
            return;
        }

        let mut bits = Hdcp2Interrupts::CERT_RECEIVED;
        if sink.behavior == Hdcp2Behavior::AuthFail {
            bits |= Hdcp2Interrupts::AUTH_FAIL;
        } else {
            bits |= Hdcp2Interrupts::AUTH_DONE;
            if sink.is_repeater {
                bits |= Hdcp2Interrupts::RECEIVER_ID_CHANGED | Hdcp2Interrupts::STREAM_MANAGE_DONE;
            }
        }
        self.interrupts.set(bits);
        self.state_code = HDCP2_STATE_OK;
        self.auth_reads = None;
    }
}

pub type SharedTransmitter = Arc<Mutex<TransmitterState>>;

fn lock(state: &SharedTransmitter) -> MutexGuard<'_, TransmitterState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// [`HdcpHardware`] wired to a simulated sink.
///
/// The device private keys never reach this side; it only needs the AKSV the
/// key-store would program into the cipher.
pub struct SimHardware {
    sink: SharedSink,
    aksv: Ksv,
    state: SharedTransmitter,
}

impl SimHardware {
    pub fn new(sink: SharedSink, aksv: Ksv) -> Self {
        Self {
            sink,
            aksv,
            state: Arc::new(Mutex::new(TransmitterState::default())),
        }
    }

    /// Shared view of the transmitter state for probes.
    pub fn state(&self) -> SharedTransmitter {
        Arc::clone(&self.state)
    }

    /// Raise 2.x interrupt bits as the engine would on its own.
    pub fn raise(&self, bits: u32) {
        lock(&self.state).interrupts.set(bits);
    }
}

impl HdcpHardware for SimHardware {
    fn reset_hdcp1x(&mut self) {
        let mut state = lock(&self.state);
        state.an = None;
        state.bksv = None;
        state.keys_loaded = false;
        state.v_status = None;
        state.hdcp1x_resets += 1;
    }

    fn reset_hdcp2x(&mut self) {
        let mut state = lock(&self.state);
        state.interrupts = Hdcp2Interrupts::default();
        state.state_code = HDCP2_STATE_OK;
        state.receiver_ids_latched = false;
        state.auth_reads = None;
        state.hdcp2x_resets += 1;
    }

    fn set_repeater_mode(&mut self, downstream_is_repeater: bool) {
        lock(&self.state).repeater_mode = downstream_is_repeater;
    }

    fn generate_an(&mut self) -> [u8; AN_LEN] {
        let an: [u8; AN_LEN] = rand::random();
        lock(&self.state).an = Some(an);
        an
    }

    fn write_bksv(&mut self, bksv: &Ksv) {
        lock(&self.state).bksv = Some(*bksv);
    }

    fn key_load_done(&mut self) {
        lock(&self.state).keys_loaded = true;
    }

    fn ri_ready(&mut self) -> bool {
        let state = lock(&self.state);
        state.keys_loaded && state.an.is_some() && state.bksv.is_some()
    }

    fn local_ri(&mut self) -> [u8; RI_LEN] {
        let state = lock(&self.state);
        match (state.an, state.bksv) {
            (Some(an), Some(bksv)) if state.keys_loaded => derive_ri(&an, &self.aksv, &bksv),
            _ => [0; RI_LEN],
        }
    }

    fn enable_encryption_1x(&mut self, enable: bool) {
        lock(&self.state).encryption_1x = enable;
    }

    fn load_repeater_hash(&mut self, ksv_list: &[Ksv], bstatus: Bstatus, v_prime: &[u8; V_PRIME_LEN]) {
        let v = derive_v(ksv_list, bstatus);
        let status = if &v == v_prime {
            VStatus::Match
        } else {
            VStatus::Mismatch
        };
        debug!("Repeater hash over {} KSVs: {:?}", ksv_list.len(), status);
        lock(&self.state).v_status = Some(status);
    }

    fn v_status(&mut self) -> VStatus {
        lock(&self.state).v_status.unwrap_or(VStatus::NotReady)
    }

    fn clear_interrupts_2x(&mut self) {
        lock(&self.state).interrupts = Hdcp2Interrupts::default();
    }

    fn start_code_update(&mut self) {
        let mut state = lock(&self.state);
        state.code_checked = true;
        state.interrupts.set(Hdcp2Interrupts::CODE_CHECK_DONE);
    }

    fn start_authentication_2x(&mut self) {
        let sink = sink::lock(&self.sink).hdcp2.clone();
        let mut state = lock(&self.state);
        state.auth_starts += 1;
        if !state.code_checked {
            return;
        }
        state.auth_reads = Some(0);
        state.progress(&sink);
    }

    fn interrupts_2x(&mut self) -> Hdcp2Interrupts {
        let sink = sink::lock(&self.sink).hdcp2.clone();
        let mut state = lock(&self.state);
        state.progress(&sink);
        if let Some(reads) = state.auth_reads.as_mut() {
            *reads += 1;
        }
        state.interrupts
    }

    fn clear_auth_fail(&mut self) {
        // The receiver keeps rejecting; the bit comes straight back.
        let behavior = sink::lock(&self.sink).hdcp2.behavior;
        if behavior != Hdcp2Behavior::AuthFail {
            let mut state = lock(&self.state);
            state.interrupts.0 &= !Hdcp2Interrupts::AUTH_FAIL;
        }
    }

    fn state_2x(&mut self) -> u8 {
        lock(&self.state).state_code
    }

    fn is_repeater_2x(&mut self) -> bool {
        sink::lock(&self.sink).hdcp2.is_repeater
    }

    fn receiver_id(&mut self) -> Ksv {
        sink::lock(&self.sink).hdcp2.receiver_id
    }

    fn topology_2x(&mut self) -> Topology2x {
        let sink = sink::lock(&self.sink);
        Topology2x {
            device_count: sink.hdcp2.receiver_ids.len() as u8,
            depth: sink.hdcp2.depth,
            max_devs_exceeded: sink.hdcp2.max_devs_exceeded,
            max_cascade_exceeded: sink.hdcp2.max_cascade_exceeded,
        }
    }

    fn latch_receiver_ids(&mut self) {
        lock(&self.state).receiver_ids_latched = true;
    }

    fn receiver_id_at(&mut self, index: usize) -> [u8; KSV_LEN] {
        if !lock(&self.state).receiver_ids_latched {
            return [0; KSV_LEN];
        }
        sink::lock(&self.sink)
            .hdcp2
            .receiver_ids
            .get(index)
            .copied()
            .unwrap_or([0; KSV_LEN])
    }

    fn ack_stream_manage(&mut self) {
        lock(&self.state).stream_manage_acks += 1;
    }

    fn enable_encryption_2x(&mut self, enable: bool) {
        lock(&self.state).encryption_2x = enable;
    }

    fn set_ddc_hw_poll(&mut self, enable: bool) {
        lock(&self.state).ddc_hw_poll = enable;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkModel;

    fn hardware(model: SinkModel) -> SimHardware {
        SimHardware::new(
            Arc::new(Mutex::new(model)),
            Ksv::new([0x0f, 0x0f, 0x0f, 0xf0, 0xf0]),
        )
    }

    #[test]
    fn ri_needs_keys_an_and_bksv() {
        let mut hw = hardware(SinkModel::default());
        assert!(!hw.ri_ready());
        hw.generate_an();
        hw.write_bksv(&Ksv::new([0xf0; 5]));
        assert!(!hw.ri_ready());
        hw.key_load_done();
        assert!(hw.ri_ready());

        hw.reset_hdcp1x();
        assert!(!hw.ri_ready());
        assert_eq!(hw.local_ri(), [0; RI_LEN]);
    }

    #[test]
    fn repeater_hash_compares_v() {
        let mut hw = hardware(SinkModel::default());
        assert_eq!(hw.v_status(), VStatus::NotReady);

        let list = [Ksv::new([0x0f, 0x0f, 0xf0, 0xf0, 0xf0])];
        let bstatus = Bstatus::for_topology(1, 1, true);
        hw.load_repeater_hash(&list, bstatus, &derive_v(&list, bstatus));
        assert_eq!(hw.v_status(), VStatus::Match);

        hw.load_repeater_hash(&list, bstatus, &[0; V_PRIME_LEN]);
        assert_eq!(hw.v_status(), VStatus::Mismatch);
    }

    #[test]
    fn auth_waits_for_code_check() {
        let mut hw = hardware(SinkModel::default());
        hw.start_authentication_2x();
        assert_eq!(hw.interrupts_2x(), Hdcp2Interrupts::default());

        hw.start_code_update();
        hw.start_authentication_2x();
        let irq = hw.interrupts_2x();
        assert!(irq.intersects(Hdcp2Interrupts::AKE_SENT));
        assert!(irq.intersects(Hdcp2Interrupts::AUTH_DONE));
        assert!(!irq.intersects(Hdcp2Interrupts::RECEIVER_ID_CHANGED));
    }

    #[test]
    fn link_fault_reports_error_code() {
        let mut model = SinkModel::default();
        model.hdcp2.behavior = Hdcp2Behavior::LinkFault;
        let mut hw = hardware(model);
        hw.start_code_update();
        hw.start_authentication_2x();
        assert!(hw.interrupts_2x().intersects(Hdcp2Interrupts::AKE_SENT));
        assert!(!hw.interrupts_2x().intersects(Hdcp2Interrupts::CERT_RECEIVED));
        assert_eq!(hw.state_2x(), hdcp_engine::hardware::HDCP2_ERR_LINK);
    }

    #[test]
    fn scripted_polls_delay_each_step() {
        let mut model = SinkModel::default();
        model.hdcp2.ake_polls = 1;
        model.hdcp2.cert_polls = 2;
        let mut hw = hardware(model);
        hw.start_code_update();
        hw.start_authentication_2x();
        assert_eq!(hw.state_2x(), HDCP2_STATE_BUSY);

        // One read with AKE still in flight.
        assert!(!hw.interrupts_2x().intersects(Hdcp2Interrupts::AKE_SENT));
        assert_eq!(hw.state_2x(), HDCP2_STATE_BUSY);

        let irq = hw.interrupts_2x();
        assert!(irq.intersects(Hdcp2Interrupts::AKE_SENT));
        assert!(!irq.intersects(Hdcp2Interrupts::CERT_RECEIVED));
        assert!(!hw.interrupts_2x().intersects(Hdcp2Interrupts::CERT_RECEIVED));

        let irq = hw.interrupts_2x();
        assert!(irq.intersects(Hdcp2Interrupts::CERT_RECEIVED));
        assert!(irq.intersects(Hdcp2Interrupts::AUTH_DONE));
        assert_eq!(hw.state_2x(), HDCP2_STATE_OK);
        assert_eq!(lock(&hw.state).auth_reads, None);
    }

    #[test]
    fn link_fault_follows_busy_ake() {
        let mut model = SinkModel::default();
        model.hdcp2.behavior = Hdcp2Behavior::LinkFault;
        model.hdcp2.ake_polls = 1;
        let mut hw = hardware(model);
        hw.start_code_update();
        hw.start_authentication_2x();

        hw.interrupts_2x();
        assert_eq!(hw.state_2x(), HDCP2_STATE_BUSY);
        assert!(hw.interrupts_2x().intersects(Hdcp2Interrupts::AKE_SENT));
        assert_eq!(hw.state_2x(), hdcp_engine::hardware::HDCP2_ERR_LINK);
    }

    #[test]
    fn receiver_ids_need_latch() {
        let mut model = SinkModel::default();
        model.hdcp2.receiver_ids = vec![[0x0f, 0x0f, 0xf0, 0xf0, 0xf0]];
        let mut hw = hardware(model);
        assert_eq!(hw.receiver_id_at(0), [0; KSV_LEN]);
        hw.latch_receiver_ids();
        assert_eq!(hw.receiver_id_at(0), [0x0f, 0x0f, 0xf0, 0xf0, 0xf0]);
        assert_eq!(hw.receiver_id_at(1), [0; KSV_LEN]);
    }
}
