//! HDCP 1.x state handlers.
//!
//! Every unrecoverable failure ends in `ReDoAuthentication`, which resets
//! the cipher and, after a back-off, starts over at `InitAuthentication`.

use hdcp_core::registers::{
    AN, AKSV, BCAPS, BKSV, BSTATUS, HDCP_DEVICE, KSV_FIFO, RI_LEN, RI_PRIME, V_PRIME,
    V_PRIME_LEN,
};
use hdcp_core::{AuthProgress, Bcaps, Bstatus, Ksv, ProtocolError, Result, KSV_LEN};
use hdcp_ddc::DdcBus;
use hdcp_keystore::KeyStore;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::hardware::{HdcpHardware, LinkControl, VStatus};
use crate::state::{Flow, Hdcp1State, State};

use Hdcp1State::*;

impl<B, K, H, L> Dispatcher<B, K, H, L>
where
    B: DdcBus,
    K: KeyStore,
    H: HdcpHardware,
    L: LinkControl,
{
    pub(crate) fn step_hdcp1(&mut self, state: Hdcp1State) -> Flow {
        let result = match state {
            WaitResChgOk => self.hdcp1_wait_res_chg_ok(),
            InitAuthentication => self.init_authentication(),
            WaitR0 => Ok(self.go(CompareR0)),
            CompareR0 => self.compare_r0(),
            RecompareR0 => self.recompare_r0(),
            CheckRepeater => self.check_repeater(),
            WaitKsvList => self.wait_ksv_list(),
            ReadKsvList => self.read_ksv_list(),
            CompareV => self.compare_v(),
            WaitRi => self.wait_ri(),
            CheckLinkIntegrity => self.check_link_integrity(),
            RecompareRi => self.recompare_ri(),
            ReDoAuthentication => Ok(self.redo_authentication()),
            WaitResetOk => Ok(self.go(InitAuthentication)),
        };
        result.unwrap_or_else(|err| {
            self.record_failure(err);
            self.go(ReDoAuthentication)
        })
    }

    /// Move to `next` and run it in this dispatch.
    fn go(&mut self, next: Hdcp1State) -> Flow {
        self.enter_awaiting(State::Hdcp1(next));
        Flow::Continue
    }

    /// Move to `next` and run it after `wait_ms`.
    fn wait(&mut self, next: Hdcp1State, wait_ms: u32) -> Flow {
        self.enter(State::Hdcp1(next), wait_ms);
        Flow::Yield
    }

    fn hdcp1_wait_res_chg_ok(&mut self) -> Result<Flow> {
        self.hw.reset_hdcp1x();
        Ok(self.go(InitAuthentication))
    }

    fn init_authentication(&mut self) -> Result<Flow> {
        if self.session.repeater_class && !self.session.hotplug.is_active() {
            self.enter_awaiting(State::Idle);
            return Ok(Flow::Yield);
        }
        self.mute_if_configured();

        let bcaps = match self.ddc.read_u8(HDCP_DEVICE, BCAPS) {
            Ok(b) => Bcaps(b),
            Err(err) => {
                debug!("BCAPS read failed ({}), retrying", err);
                return Ok(self.wait(InitAuthentication, self.config.timeouts.bcaps_retry_ms));
            }
        };

        if !self.link.is_dvi_mode() {
            let bstatus = self.read_bstatus()?;
            if !bstatus.hdmi_mode()
                && self.session.counters.hdmi_mode_polls < self.config.retries.hdmi_mode
            {
                self.session.counters.hdmi_mode_polls += 1;
                debug!(
                    "Sink not in HDMI mode yet (poll {})",
                    self.session.counters.hdmi_mode_polls
                );
                return Ok(self.wait(InitAuthentication, self.config.timeouts.hdmi_mode_retry_ms));
            }
        }

        let is_repeater = bcaps.is_repeater();
        self.session.topology.bcaps = bcaps;
        self.session.topology.is_repeater = is_repeater;
        self.hw.set_repeater_mode(is_repeater);

        let an = self.hw.generate_an();
        self.ddc.write(HDCP_DEVICE, AN, &an)?;
        let aksv = self.own_aksv()?;
        self.ddc.write(HDCP_DEVICE, AKSV, aksv.as_bytes())?;

        let bksv = Ksv::new(self.ddc.read_array::<KSV_LEN>(HDCP_DEVICE, BKSV)?);
        self.session.bksv = Some(bksv);
        if !bksv.is_legal() {
            return Err(ProtocolError::IllegalKsv(bksv).into());
        }
        self.hw.write_bksv(&bksv);
        if self.revocation.is_revoked(&bksv) {
            return Err(ProtocolError::RevokedKsv(bksv).into());
        }

        self.keystore.load_key_material()?;
        self.hw.key_load_done();
        debug!("BKSV {} repeater={}", bksv, is_repeater);
        Ok(self.wait(WaitR0, self.config.timeouts.r0_ms))
    }

    fn read_bstatus(&mut self) -> Result<Bstatus> {
        Ok(Bstatus::from_bytes(
            self.ddc.read_array(HDCP_DEVICE, BSTATUS)?,
        ))
    }

    /// Compare the sink's Ri' against the local Ri.
    fn ri_matches(&mut self) -> Result<bool> {
        let remote: [u8; RI_LEN] = self.ddc.read_array(HDCP_DEVICE, RI_PRIME)?;
        let local = self.hw.local_ri();
        if local != remote {
            debug!(
                "Ri mismatch: local {:02x?} sink {:02x?}",
                local, remote
            );
        }
        Ok(local == remote)
    }

    fn compare_r0(&mut self) -> Result<Flow> {
        if !self.hw.ri_ready() {
            return Err(ProtocolError::NotReady("R0").into());
        }
        if self.ri_matches()? {
            return Ok(self.r0_verified());
        }
        self.session.counters.recompare_r0 = 0;
        Ok(self.wait(RecompareR0, 0))
    }

    fn recompare_r0(&mut self) -> Result<Flow> {
        self.session.counters.recompare_r0 += 1;
        if self.session.counters.recompare_r0 > self.config.retries.recompare_r0 {
            return Err(ProtocolError::ValueMismatch { what: "R0" }.into());
        }
        if self.ri_matches()? {
            return Ok(self.r0_verified());
        }
        Ok(self.wait(RecompareR0, 0))
    }

    fn r0_verified(&mut self) -> Flow {
        self.hw.enable_encryption_1x(true);
        self.session.progress.set(AuthProgress::R0_VERIFIED);
        self.go(CheckRepeater)
    }

    fn check_repeater(&mut self) -> Result<Flow> {
        if self.session.topology.is_repeater {
            self.session.counters.ksv_list_polls = 0;
            Ok(self.go(WaitKsvList))
        } else {
            Ok(self.go(WaitRi))
        }
    }

    fn wait_ksv_list(&mut self) -> Result<Flow> {
        let bcaps = Bcaps(self.ddc.read_u8(HDCP_DEVICE, BCAPS)?);
        if bcaps.ksv_fifo_ready() {
            return Ok(self.go(ReadKsvList));
        }
        self.session.counters.ksv_list_polls += 1;
        if self.session.counters.ksv_list_polls >= self.config.retries.ksv_list_ready {
            return Err(ProtocolError::RetriesExhausted {
                state: "WaitKsvList",
            }
            .into());
        }
        Ok(self.wait(WaitKsvList, self.config.timeouts.ksv_list_poll_ms))
    }

    fn read_ksv_list(&mut self) -> Result<Flow> {
        let mut bstatus = self.read_bstatus()?;
        if bstatus.max_devs_exceeded() {
            return Err(ProtocolError::TopologyExceeded("MAX_DEVS_EXCEEDED").into());
        }
        if bstatus.max_cascade_exceeded() {
            return Err(ProtocolError::TopologyExceeded("MAX_CASCADE_EXCEEDED").into());
        }

        let limit = self.config.max_ksv_devices;
        let mut rereads = 0;
        while bstatus.device_count() > limit && rereads < self.config.retries.device_count_reread {
            rereads += 1;
            bstatus = self.read_bstatus()?;
        }
        if bstatus.device_count() > limit {
            warn!(
                "Repeater reports {} devices, hardware holds {}",
                bstatus.device_count(),
                limit
            );
        }
        let count = bstatus.device_count().min(limit);

        let list = if count > 0 {
            let raw = self
                .ddc
                .read(HDCP_DEVICE, KSV_FIFO, count as usize * KSV_LEN)?;
            Ksv::split_list(&raw)
        } else {
            Vec::new()
        };
        if let Some(bad) = list.iter().find(|ksv| !ksv.is_legal()) {
            return Err(ProtocolError::IllegalKsv(*bad).into());
        }

        let bstatus = self.read_bstatus()?;
        let v_prime: [u8; V_PRIME_LEN] = self.ddc.read_array(HDCP_DEVICE, V_PRIME)?;
        self.check_topology(&list)?;

        self.session.topology.device_count = count;
        self.session.topology.depth = bstatus.depth();
        self.session.topology.bstatus = bstatus;
        self.hw.load_repeater_hash(&list, bstatus, &v_prime);
        self.session.ksv_list = list;
        self.session.v_prime = v_prime;
        Ok(self.wait(CompareV, self.config.timeouts.v_ready_ms))
    }

    fn compare_v(&mut self) -> Result<Flow> {
        if !self.session.topology.is_repeater {
            return Err(ProtocolError::NotReady("repeater topology").into());
        }
        match self.hw.v_status() {
            VStatus::Match => {
                self.session.progress.set(AuthProgress::V_VERIFIED);
                Ok(self.go(WaitRi))
            }
            VStatus::Mismatch => Err(ProtocolError::ValueMismatch { what: "V" }.into()),
            VStatus::NotReady => Err(ProtocolError::NotReady("V").into()),
        }
    }

    fn wait_ri(&mut self) -> Result<Flow> {
        self.unmute();
        self.mark_authenticated();
        self.session.timer.disarm();
        Ok(Flow::Yield)
    }

    fn check_link_integrity(&mut self) -> Result<Flow> {
        if let Some(bksv) = self.session.bksv {
            if self.revocation.is_revoked(&bksv) {
                return Err(ProtocolError::RevokedKsv(bksv).into());
            }
        }
        if self.ri_matches()? {
            self.ri_verified();
            return Ok(Flow::Yield);
        }
        self.session.counters.recompare_ri = 0;
        Ok(self.wait(RecompareRi, 0))
    }

    fn recompare_ri(&mut self) -> Result<Flow> {
        self.session.counters.recompare_ri += 1;
        if self.session.counters.recompare_ri > self.config.retries.recompare_ri {
            return Err(ProtocolError::ValueMismatch { what: "Ri" }.into());
        }
        if self.ri_matches()? {
            self.ri_verified();
            self.enter_awaiting(State::Hdcp1(CheckLinkIntegrity));
            return Ok(Flow::Yield);
        }
        Ok(self.wait(RecompareRi, 0))
    }

    fn ri_verified(&mut self) {
        let progress = &mut self.session.progress;
        progress.set(AuthProgress::RI_VERIFIED);
        let repeater_ok = !self.session.topology.is_repeater
            || progress.contains(AuthProgress::V_VERIFIED);
        if progress.contains(AuthProgress::R0_VERIFIED) && repeater_ok {
            progress.set(AuthProgress::COMPLETE);
        }
        self.session.counters.recompare_ri = 0;
    }

    fn redo_authentication(&mut self) -> Flow {
        self.mute_if_configured();
        self.reset_protocol_hardware();
        self.session.reset_attempt();

        if !self.session.enabled || !self.session.hotplug.is_active() {
            info!("Sink not ready, HDCP 1.x going idle");
            self.enter_awaiting(State::Idle);
            return Flow::Yield;
        }
        self.wait(WaitResetOk, self.config.timeouts.redo_backoff_ms)
    }
}
