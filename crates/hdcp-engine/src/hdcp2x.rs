//! HDCP 2.x state handlers.
//!
//! The protocol itself runs in the transmitter's 2.x engine and its
//! firmware; these handlers load the firmware, kick the engine and poll its
//! interrupt status. Failures restart from `WaitResChgOk` through
//! [`Dispatcher::restart_authentication`]; engine error codes abort to
//! `WaitResChgOk` directly and, for repeated link faults, power-cycle the
//! PHY on the way.

use hdcp_core::registers::{
    SCDC_DEVICE, SCDC_SCRAMBLING_ENABLE, SCDC_TMDS_CLOCK_RATIO_40, SCDC_TMDS_CONFIG,
};
use hdcp_core::{Error, Ksv, ProtocolError, Result};
use hdcp_ddc::DdcBus;
use hdcp_keystore::{protected, KeyStore};
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::hardware::{is_hdcp2_error, Hdcp2Interrupts, HdcpHardware, LinkControl, HDCP2_ERR_LINK};
use crate::state::{Flow, Hdcp2State, State};

use Hdcp2State::*;

/// A done-bit poll: which bits complete the state and where to go next.
struct Poll {
    state: Hdcp2State,
    done: u32,
    limit: u32,
    next: Hdcp2State,
    next_wait_ms: u32,
}

impl<B, K, H, L> Dispatcher<B, K, H, L>
where
    B: DdcBus,
    K: KeyStore,
    H: HdcpHardware,
    L: LinkControl,
{
    pub(crate) fn step_hdcp2(&mut self, state: Hdcp2State) -> Flow {
        let t = self.config.timeouts.clone();
        let r = self.config.retries.clone();
        let result = match state {
            WaitResChgOk => self.hdcp2_wait_res_chg_ok(),
            LoadFw => self.load_fw(),
            InitialOk => self.initial_ok(),
            Authentication => self.authentication(),
            CheckAkeOk => self.poll_done(Poll {
                state,
                done: Hdcp2Interrupts::AKE_SENT,
                limit: r.ake_polls,
                next: CheckCertOk,
                next_wait_ms: t.hdcp2_cert_ms,
            }),
            CheckCertOk => self.poll_done(Poll {
                state,
                done: Hdcp2Interrupts::CERT_RECEIVED,
                limit: r.cert_polls,
                next: RepeaterCheck,
                next_wait_ms: t.hdcp2_repeater_check_ms,
            }),
            RepeaterCheck => self.repeater_check(),
            RepeaterCheckOk => self.poll_done(Poll {
                state,
                done: Hdcp2Interrupts::RECEIVER_ID_CHANGED
                    | Hdcp2Interrupts::STREAM_MANAGE_DONE
                    | Hdcp2Interrupts::AUTH_DONE,
                limit: r.repeater_check_polls,
                next: ResetReceiver,
                next_wait_ms: t.hdcp2_reset_receiver_ms,
            }),
            ResetReceiver => self.reset_receiver(),
            RepeatMsgDone => self.repeat_msg_done(),
            AuthenCheck => self.authen_check(),
            Encryption => Ok(self.encryption()),
        };
        result.unwrap_or_else(|err| {
            self.record_failure(err);
            self.mute_if_configured();
            self.restart_authentication();
            Flow::Yield
        })
    }

    fn wait2(&mut self, next: Hdcp2State, wait_ms: u32) -> Flow {
        self.enter(State::Hdcp2(next), wait_ms);
        Flow::Yield
    }

    fn go2(&mut self, next: Hdcp2State) -> Flow {
        self.enter_awaiting(State::Hdcp2(next));
        Flow::Continue
    }

    fn idle(&mut self) -> Flow {
        self.enter_awaiting(State::Idle);
        Flow::Yield
    }

    fn hdcp2_wait_res_chg_ok(&mut self) -> Result<Flow> {
        if !self.session.hotplug.is_active() {
            return Ok(self.idle());
        }
        if !self.session.enabled {
            self.unmute();
            return Ok(self.idle());
        }
        self.mute_if_configured();

        if self.session.link_powered_off {
            self.session.link_powered_off = false;
            self.send_tmds_config();
            info!("Powering link back on");
            self.link.phy_power_on();
        }

        self.session.counters.hdcp2_polls = 0;
        self.hw.clear_interrupts_2x();
        Ok(self.go2(LoadFw))
    }

    /// Restore the sink's SCDC TMDS configuration after a PHY power cycle.
    fn send_tmds_config(&mut self) {
        let value = if self.link.tmds_above_340mhz() {
            SCDC_SCRAMBLING_ENABLE | SCDC_TMDS_CLOCK_RATIO_40
        } else {
            0
        };
        if let Err(err) = self.ddc.write(SCDC_DEVICE, SCDC_TMDS_CONFIG, &[value]) {
            warn!("SCDC TMDS config write failed: {}", err);
        }
    }

    fn load_fw(&mut self) -> Result<Flow> {
        if self.session.repeater_class && !self.session.hotplug.is_active() {
            return Ok(self.idle());
        }
        let core = protected::reset::HDCP2X_CORE;
        let clock = protected::reset::HDCP2X_CLOCK_EN;

        self.keystore.write_reset_control(core, core)?;
        if self.session.fw_loaded {
            self.keystore.reset_firmware()?;
        } else {
            self.keystore.load_firmware()?;
            self.session.fw_loaded = true;
            debug!("HDCP 2.x firmware loaded");
        }
        self.hw.start_code_update();
        self.keystore.write_reset_control(0, core)?;
        self.keystore.write_reset_control(clock, clock)?;
        Ok(self.wait2(InitialOk, self.config.timeouts.hdcp2_initial_ms))
    }

    fn initial_ok(&mut self) -> Result<Flow> {
        if self
            .hw
            .interrupts_2x()
            .intersects(Hdcp2Interrupts::CODE_CHECK_DONE)
        {
            return Ok(self.go2(Authentication));
        }
        self.session.fw_loaded = false;
        Err(ProtocolError::NotReady("HDCP 2.x firmware code check").into())
    }

    fn authentication(&mut self) -> Result<Flow> {
        self.hw.start_authentication_2x();
        self.keystore
            .write_protected_register(protected::HDCP_CTRL, protected::HDCP2_SM_START)?;
        self.session.counters.hdcp2_polls = 0;
        Ok(self.wait2(CheckAkeOk, self.config.timeouts.hdcp2_ake_ms))
    }

    /// Read the engine state code and track consecutive link faults.
    ///
    /// Only error codes move the streak: 0x30 extends it, any other error
    /// ends it. In-progress codes leave it alone.
    fn engine_error(&mut self) -> Option<u8> {
        let code = self.hw.state_2x();
        if !is_hdcp2_error(code) {
            return None;
        }
        if code == HDCP2_ERR_LINK {
            self.session.counters.link_fault_streak += 1;
        } else {
            self.session.counters.link_fault_streak = 0;
        }
        Some(code)
    }

    /// Abort to `WaitResChgOk` on an engine error, powering off the PHY
    /// once the link-fault streak reaches the threshold.
    fn abort_on_engine_error(&mut self, code: u8) -> Flow {
        let streak = self.session.counters.link_fault_streak;
        if code == HDCP2_ERR_LINK && streak >= self.config.retries.hw_fault_threshold {
            warn!("{} consecutive link faults, powering link off", streak);
            self.session.counters.link_fault_streak = 0;
            self.link.phy_power_off();
            self.session.link_powered_off = true;
            self.hardware_fault(code);
        }
        self.record_failure(Error::HardwareFault { code });
        self.hw.set_ddc_hw_poll(false);
        self.session.counters.hdcp2_polls = 0;
        self.wait2(WaitResChgOk, self.config.timeouts.hdcp2_res_chg_ok_ms)
    }

    fn poll_done(&mut self, poll: Poll) -> Result<Flow> {
        let irq = self.hw.interrupts_2x();
        if irq.intersects(poll.done) {
            self.session.counters.hdcp2_polls = 0;
            if poll.state == CheckCertOk {
                self.session.counters.link_fault_streak = 0;
            }
            return Ok(self.wait2(poll.next, poll.next_wait_ms));
        }
        if let Some(code) = self.engine_error() {
            return Ok(self.abort_on_engine_error(code));
        }
        if self.session.counters.hdcp2_polls >= poll.limit {
            if poll.state == CheckCertOk {
                self.session.counters.link_fault_streak = 0;
            }
            return Err(ProtocolError::RetriesExhausted {
                state: state_name(poll.state),
            }
            .into());
        }
        self.session.counters.hdcp2_polls += 1;
        Ok(self.wait2(poll.state, self.config.timeouts.hdcp2_poll_ms))
    }

    fn repeater_check(&mut self) -> Result<Flow> {
        let receiver_id = self.hw.receiver_id();
        if !receiver_id.is_legal() {
            return Err(ProtocolError::IllegalKsv(receiver_id).into());
        }
        self.session.bksv = Some(receiver_id);
        self.session.counters.hdcp2_polls = 0;

        if self.hw.is_repeater_2x() {
            self.session.topology.is_repeater = true;
            return Ok(self.wait2(
                RepeaterCheckOk,
                self.config.timeouts.hdcp2_repeater_check_ms,
            ));
        }

        self.session.topology.is_repeater = false;
        self.session.topology.device_count = 0;
        self.session.topology.hdcp2 = self.hw.topology_2x();
        self.check_topology(&[])?;
        Ok(self.wait2(AuthenCheck, self.config.timeouts.hdcp2_authen_check_ms))
    }

    fn reset_receiver(&mut self) -> Result<Flow> {
        if !self.session.topology.is_repeater {
            return Err(ProtocolError::NotReady("repeater topology").into());
        }
        self.hw.latch_receiver_ids();
        let topology = self.hw.topology_2x();
        if topology.max_devs_exceeded {
            return Err(ProtocolError::TopologyExceeded("MAX_DEVS_EXCEEDED").into());
        }
        if topology.max_cascade_exceeded {
            return Err(ProtocolError::TopologyExceeded("MAX_CASCADE_EXCEEDED").into());
        }
        if topology.depth == 0 && topology.device_count != 0 {
            return Err(ProtocolError::InvalidReceiverIdList(format!(
                "depth 0 with {} devices",
                topology.device_count
            ))
            .into());
        }

        let limit = self.config.max_receiver_ids;
        if topology.device_count > limit {
            warn!(
                "Repeater reports {} receivers, reading {}",
                topology.device_count, limit
            );
        }
        let count = topology.device_count.min(limit) as usize;
        let mut ids = Vec::with_capacity(count);
        for index in 0..count {
            let id = Ksv::new(self.hw.receiver_id_at(index));
            if !id.is_legal() {
                return Err(ProtocolError::InvalidReceiverIdList(format!(
                    "receiver ID {} ({}) has {} set bits",
                    index,
                    id,
                    id.count_ones()
                ))
                .into());
            }
            ids.push(id);
        }
        self.check_topology(&ids)?;

        self.session.topology.hdcp2 = topology;
        self.session.topology.device_count = count as u8;
        self.session.topology.depth = topology.depth;
        self.session.ksv_list = ids;
        self.session.counters.hdcp2_polls = 0;
        Ok(self.wait2(RepeatMsgDone, self.config.timeouts.hdcp2_repeat_msg_ms))
    }

    fn repeat_msg_done(&mut self) -> Result<Flow> {
        if !self.session.topology.is_repeater {
            return Err(ProtocolError::NotReady("repeater topology").into());
        }
        let irq = self.hw.interrupts_2x();
        if irq.intersects(Hdcp2Interrupts::STREAM_MANAGE_DONE | Hdcp2Interrupts::AUTH_DONE) {
            self.hw.ack_stream_manage();
            self.session.counters.hdcp2_polls = 0;
            return Ok(self.wait2(AuthenCheck, self.config.timeouts.hdcp2_authen_check_ms));
        }
        if let Some(code) = self.engine_error() {
            return Ok(self.abort_on_engine_error(code));
        }
        if self.session.counters.hdcp2_polls >= self.config.retries.repeat_msg_polls {
            return Err(ProtocolError::RetriesExhausted {
                state: "RepeatMsgDone",
            }
            .into());
        }
        self.session.counters.hdcp2_polls += 1;
        Ok(self.wait2(RepeatMsgDone, self.config.timeouts.hdcp2_poll_ms))
    }

    fn authen_check(&mut self) -> Result<Flow> {
        let irq = self.hw.interrupts_2x();
        let error = self.engine_error();
        let polls = self.session.counters.hdcp2_polls;

        if irq.intersects(Hdcp2Interrupts::AUTH_DONE) && error.is_none() {
            self.session.counters.hdcp2_polls = 0;
            return Ok(self.wait2(Encryption, self.config.timeouts.hdcp2_encrypt_delay_ms));
        }
        if irq.intersects(Hdcp2Interrupts::AUTH_FAIL) {
            self.hw.clear_auth_fail();
            if polls != 0 {
                return Err(ProtocolError::ValueMismatch {
                    what: "HDCP 2.x authentication",
                }
                .into());
            }
        }
        if let Some(code) = error {
            return Err(Error::HardwareFault { code });
        }
        if polls > self.config.retries.authen_polls {
            return Err(ProtocolError::RetriesExhausted {
                state: "AuthenCheck",
            }
            .into());
        }
        self.session.counters.hdcp2_polls += 1;
        Ok(self.wait2(AuthenCheck, self.config.timeouts.hdcp2_poll_ms))
    }

    fn encryption(&mut self) -> Flow {
        if !self.session.hotplug.is_active() {
            return self.idle();
        }
        self.hw.enable_encryption_2x(true);
        self.unmute();
        self.session.counters.link_fault_streak = 0;
        self.mark_authenticated();
        self.session.timer.disarm();
        Flow::Yield
    }
}

fn state_name(state: Hdcp2State) -> &'static str {
    match state {
        CheckAkeOk => "CheckAkeOk",
        CheckCertOk => "CheckCertOk",
        RepeaterCheckOk => "RepeaterCheckOk",
        RepeatMsgDone => "RepeatMsgDone",
        AuthenCheck => "AuthenCheck",
        _ => "Hdcp2",
    }
}
