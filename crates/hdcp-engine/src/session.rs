//! Per-link authentication session.

use hdcp_core::registers::V_PRIME_LEN;
use hdcp_core::{
    AuthProgress, AuthResult, Bcaps, Bstatus, Error, HotplugState, Ksv, LinkStatus,
    ProtocolVersion,
};

use crate::hardware::Topology2x;
use crate::state::State;

/// Countdown timer driven by dispatcher ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Countdown {
    #[default]
    Disarmed,
    /// Remaining milliseconds. Goes negative once ticks overshoot.
    Armed(i64),
}

impl Countdown {
    pub fn arm(&mut self, ms: u32) {
        *self = Countdown::Armed(ms as i64);
    }

    pub fn disarm(&mut self) {
        *self = Countdown::Disarmed;
    }

    pub fn tick(&mut self, elapsed_ms: u32) {
        if let Countdown::Armed(remaining) = self {
            *remaining -= elapsed_ms as i64;
        }
    }

    pub fn remaining(&self) -> Option<i64> {
        match self {
            Countdown::Armed(ms) => Some(*ms),
            Countdown::Disarmed => None,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Countdown::Armed(ms) if *ms <= 0)
    }

    /// Consume an expiry. Returns true once per expiry.
    pub fn take_expired(&mut self) -> bool {
        if self.is_expired() {
            *self = Countdown::Disarmed;
            true
        } else {
            false
        }
    }
}

/// Downstream topology as learned during authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Topology {
    pub is_repeater: bool,
    pub device_count: u8,
    pub depth: u8,
    pub bcaps: Bcaps,
    pub bstatus: Bstatus,
    pub hdcp2: Topology2x,
}

/// Per-state retry and error counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub recompare_r0: u32,
    pub recompare_ri: u32,
    pub ksv_list_polls: u32,
    pub hdmi_mode_polls: u32,
    /// Done-bit polls in the current 2.x Check state.
    pub hdcp2_polls: u32,
    /// Consecutive 0x30 fault codes seen by the 2.x engine.
    pub link_fault_streak: u32,
    /// Failed attempts since the link came up.
    pub failures: u32,
}

/// One authentication session per physical link.
#[derive(Debug, Default)]
pub struct Session {
    pub(crate) version: ProtocolVersion,
    pub(crate) state: State,
    pub(crate) timer: Countdown,
    pub(crate) topology: Topology,
    pub(crate) aksv: Option<Ksv>,
    /// BKSV (1.x) or receiver ID (2.x) of the directly attached sink.
    pub(crate) bksv: Option<Ksv>,
    pub(crate) ksv_list: Vec<Ksv>,
    pub(crate) v_prime: [u8; V_PRIME_LEN],
    pub(crate) counters: Counters,
    pub(crate) result: AuthResult,
    pub(crate) progress: AuthProgress,
    pub(crate) last_error: Option<Error>,

    pub(crate) hotplug: HotplugState,
    pub(crate) enabled: bool,
    /// This transmitter is the output stage of an HDMI repeater.
    pub(crate) repeater_class: bool,
    pub(crate) fw_loaded: bool,
    /// PHY was powered off after repeated link faults.
    pub(crate) link_powered_off: bool,
    pub(crate) av_muted: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn timer(&self) -> Countdown {
        self.timer
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn bksv(&self) -> Option<Ksv> {
        self.bksv
    }

    pub fn ksv_list(&self) -> &[Ksv] {
        &self.ksv_list
    }

    pub fn v_prime(&self) -> &[u8; V_PRIME_LEN] {
        &self.v_prime
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn result(&self) -> AuthResult {
        self.result
    }

    pub fn progress(&self) -> AuthProgress {
        self.progress
    }

    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    pub fn hotplug(&self) -> HotplugState {
        self.hotplug
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn link_powered_off(&self) -> bool {
        self.link_powered_off
    }

    pub fn link_status(&self) -> LinkStatus {
        if !self.hotplug.is_active() {
            LinkStatus::Disconnected
        } else if self.result == AuthResult::Authenticated {
            LinkStatus::ConnectedEncrypted
        } else {
            LinkStatus::ConnectedUnencrypted
        }
    }

    /// Forget everything learned in the current attempt. Failure statistics
    /// and the link-fault streak survive.
    pub(crate) fn reset_attempt(&mut self) {
        self.topology = Topology::default();
        self.bksv = None;
        self.ksv_list.clear();
        self.v_prime = [0; V_PRIME_LEN];
        self.progress.clear();
        if self.result == AuthResult::Authenticated {
            self.result = AuthResult::Undetermined;
        }
        self.counters = Counters {
            link_fault_streak: self.counters.link_fault_streak,
            failures: self.counters.failures,
            ..Counters::default()
        };
    }

    /// Forget the link entirely (unplug or stop).
    pub(crate) fn reset_link(&mut self) {
        self.reset_attempt();
        self.version = ProtocolVersion::Undetermined;
        self.result = AuthResult::Undetermined;
        self.fw_loaded = false;
        self.counters = Counters::default();
        self.last_error = None;
    }
}
