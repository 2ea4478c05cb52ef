//! Dispatcher owning one session and its state machine.
//!
//! The dispatcher is synchronous. Every input is an [`Event`]; a tick only
//! advances the machine once the session countdown expires, an interrupt
//! only when the current state is waiting for it. Handlers that complete
//! immediately return [`Flow::Continue`] and the next state's handler runs
//! within the same dispatch.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use hdcp_core::registers::{HDCP2_VERSION, HDCP2_VERSION_22, HDCP_DEVICE};
use hdcp_core::{
    AuthResult, EngineConfig, Error, HotplugState, InterruptKind, Ksv, LinkStatus,
    ProtocolError, ProtocolVersion, Result, RevocationResult,
};
use hdcp_ddc::{DdcBus, DdcEngine};
use hdcp_keystore::{protected, KeyStore};
use hdcp_srm::RevocationValidator;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::events::{EngineEvent, Event, EventHandler};
use crate::hardware::{HdcpHardware, LinkControl};
use crate::session::Session;
use crate::state::{Flow, Hdcp1State, Hdcp2State, State};

/// Hot-plug state shared between the connector and the dispatcher.
///
/// Writers only store; the dispatcher reads it at the top of every dispatch
/// iteration so an unplug cancels authentication without waiting for the
/// event queue.
#[derive(Debug, Clone, Default)]
pub struct HotplugSignal(Arc<AtomicU8>);

impl HotplugSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, state: HotplugState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    pub fn get(&self) -> HotplugState {
        HotplugState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// HDCP dispatcher for one link.
pub struct Dispatcher<B, K, H, L>
where
    B: DdcBus,
    K: KeyStore,
    H: HdcpHardware,
    L: LinkControl,
{
    pub(crate) session: Session,
    pub(crate) ddc: DdcEngine<B>,
    pub(crate) keystore: K,
    pub(crate) hw: H,
    pub(crate) link: L,
    pub(crate) revocation: RevocationValidator,
    pub(crate) config: EngineConfig,
    events: Box<dyn EventHandler>,
    hotplug: HotplugSignal,
    status_tx: watch::Sender<LinkStatus>,
    published: LinkStatus,
}

impl<B, K, H, L> Dispatcher<B, K, H, L>
where
    B: DdcBus,
    K: KeyStore,
    H: HdcpHardware,
    L: LinkControl,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        ddc: DdcEngine<B>,
        keystore: K,
        hw: H,
        link: L,
        revocation: RevocationValidator,
        config: EngineConfig,
        events: Box<dyn EventHandler>,
        repeater_class: bool,
    ) -> Self {
        let (status_tx, _) = watch::channel(LinkStatus::Disconnected);
        let session = Session {
            repeater_class,
            ..Session::new()
        };
        Self {
            session,
            ddc,
            keystore,
            hw,
            link,
            revocation,
            config,
            events,
            hotplug: HotplugSignal::new(),
            status_tx,
            published: LinkStatus::Disconnected,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> State {
        self.session.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn link_status(&self) -> LinkStatus {
        self.session.link_status()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status_tx.subscribe()
    }

    pub fn hotplug_signal(&self) -> HotplugSignal {
        self.hotplug.clone()
    }

    pub fn ddc(&self) -> &DdcEngine<B> {
        &self.ddc
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn link_control(&self) -> &L {
        &self.link
    }

    pub fn keystore(&self) -> &K {
        &self.keystore
    }

    /// Feed one input into the state machine.
    pub fn dispatch(&mut self, event: Event) {
        self.sync_hotplug();
        match event {
            Event::Tick => {
                self.session.timer.tick(self.config.tick_interval_ms);
                if self.session.timer.take_expired() && !self.session.state.ignores_ticks() {
                    self.run();
                }
            }
            Event::Interrupt(kind) => self.on_interrupt(kind),
            Event::Hotplug(state) => self.notify_hotplug(state),
            Event::Start => self.start(),
            Event::Stop => self.stop(),
        }
        self.publish_link_status();
    }

    /// Enable HDCP and authenticate as soon as a powered sink is present.
    pub fn start(&mut self) {
        if self.session.enabled {
            return;
        }
        info!("HDCP enabled");
        self.session.enabled = true;
        if !self.keystore.is_open() {
            if let Err(err) = self.keystore.open_session() {
                self.record_failure(err.into());
                self.session.enabled = false;
                return;
            }
        }
        self.notify_keystore_hotplug();
        if self.session.hotplug.is_active() {
            self.restart_authentication();
        }
        self.publish_link_status();
    }

    /// Disable HDCP, tear down the session and release the key-store.
    pub fn stop(&mut self) {
        if !self.session.enabled {
            return;
        }
        info!("HDCP disabled");
        self.teardown();
        self.unmute();
        self.session.enabled = false;
        if self.keystore.is_open() {
            if let Err(err) = self.keystore.close_session() {
                warn!("Closing key-store session failed: {}", err);
            }
        }
        self.publish_link_status();
    }

    /// Connector reported a hot-plug change.
    pub fn notify_hotplug(&mut self, state: HotplugState) {
        self.hotplug.set(state);
        self.apply_hotplug(state);
        self.publish_link_status();
    }

    fn sync_hotplug(&mut self) {
        let state = self.hotplug.get();
        if state != self.session.hotplug {
            self.apply_hotplug(state);
        }
    }

    fn apply_hotplug(&mut self, state: HotplugState) {
        if state == self.session.hotplug {
            return;
        }
        debug!("Hot-plug {:?} -> {:?}", self.session.hotplug, state);
        self.session.hotplug = state;
        self.notify_keystore_hotplug();

        if !state.is_active() {
            if self.session.state != State::Idle {
                info!("Sink gone, cancelling authentication in {}", self.session.state);
            }
            self.teardown();
        } else if self.session.enabled && self.session.state == State::Idle {
            self.restart_authentication();
        }
    }

    fn notify_keystore_hotplug(&mut self) {
        if !self.keystore.is_open() {
            return;
        }
        let value = if self.session.hotplug.is_active() {
            protected::HPD_ACTIVE
        } else {
            protected::HPD_INACTIVE
        };
        if let Err(err) = self
            .keystore
            .write_protected_register(protected::HDCP_CTRL, value)
        {
            warn!("Hot-plug notification to key-store failed: {}", err);
        }
    }

    fn on_interrupt(&mut self, kind: InterruptKind) {
        let state = self.session.state;
        match kind {
            InterruptKind::RiReady if state.awaits(kind) => {
                self.enter_awaiting(State::Hdcp1(Hdcp1State::CheckLinkIntegrity));
                self.run();
            }
            InterruptKind::ReauthRequest if state.is_hdcp2() => {
                info!("Sink requested re-authentication in {}", state);
                self.restart_authentication();
            }
            _ if state.awaits(kind) => {
                self.session.timer.disarm();
                self.run();
            }
            _ => debug!("Ignoring {:?} in {}", kind, state),
        }
    }

    /// Run state handlers until one yields.
    fn run(&mut self) {
        for _ in 0..self.config.redispatch_limit {
            self.sync_hotplug();
            let flow = match self.session.state {
                State::Idle => Flow::Yield,
                State::Hdcp1(state) => self.step_hdcp1(state),
                State::Hdcp2(state) => self.step_hdcp2(state),
            };
            if flow == Flow::Yield {
                return;
            }
        }
        warn!(
            "Redispatch limit reached in {}, yielding",
            self.session.state
        );
    }

    /// Begin a fresh attempt: pick the protocol and enter its first state.
    pub(crate) fn restart_authentication(&mut self) {
        self.session.reset_attempt();
        self.session.counters.link_fault_streak = 0;

        let version = self.detect_version();
        self.session.version = version;
        self.reset_protocol_hardware();

        match version {
            ProtocolVersion::Hdcp2x => {
                let wait = if self.session.fw_loaded {
                    self.config.timeouts.hdcp2_res_chg_ok_ms
                } else {
                    self.config.timeouts.hdcp2_load_fw_ms
                };
                self.enter(State::Hdcp2(Hdcp2State::WaitResChgOk), wait);
            }
            _ => {
                self.enter(
                    State::Hdcp1(Hdcp1State::WaitResChgOk),
                    self.config.timeouts.res_chg_ok_ms,
                );
            }
        }
    }

    fn detect_version(&mut self) -> ProtocolVersion {
        if self.link.is_dvi_mode() {
            return ProtocolVersion::Hdcp1x;
        }
        match self.ddc.read_u8(HDCP_DEVICE, HDCP2_VERSION) {
            Ok(v) if v & HDCP2_VERSION_22 != 0 => ProtocolVersion::Hdcp2x,
            Ok(_) => ProtocolVersion::Hdcp1x,
            Err(err) => {
                debug!("HDCP2Version unreadable ({}), using HDCP 1.x", err);
                ProtocolVersion::Hdcp1x
            }
        }
    }

    /// Reset both cipher blocks. Never fails; key-store errors are logged.
    pub(crate) fn reset_protocol_hardware(&mut self) {
        self.hw.enable_encryption_1x(false);
        self.hw.enable_encryption_2x(false);
        self.hw.reset_hdcp1x();
        self.hw.reset_hdcp2x();
        if self.keystore.is_open() {
            let mask = protected::reset::HDCP1X;
            let result = self
                .keystore
                .write_reset_control(mask, mask)
                .and_then(|_| self.keystore.write_reset_control(0, mask));
            if let Err(err) = result {
                warn!("HDCP 1.x soft reset through key-store failed: {}", err);
            }
        }
    }

    fn teardown(&mut self) {
        self.reset_protocol_hardware();
        self.session.reset_link();
        self.enter_awaiting(State::Idle);
    }

    /// Enter `state` with a timeout.
    pub(crate) fn enter(&mut self, state: State, wait_ms: u32) {
        self.transition(state);
        self.session.timer.arm(wait_ms);
    }

    /// Enter `state` and wait for an interrupt only.
    pub(crate) fn enter_awaiting(&mut self, state: State) {
        self.transition(state);
        self.session.timer.disarm();
    }

    fn transition(&mut self, to: State) {
        let from = self.session.state;
        if from != to {
            debug!("{} -> {}", from, to);
            self.session.state = to;
            self.events.on_event(EngineEvent::StateChanged { from, to });
        }
    }

    pub(crate) fn mute_if_configured(&mut self) {
        if self.config.mute_during_auth && !self.session.av_muted {
            self.link.av_mute();
            self.session.av_muted = true;
        }
    }

    pub(crate) fn unmute(&mut self) {
        if self.session.av_muted {
            self.link.av_unmute();
            self.session.av_muted = false;
        }
    }

    pub(crate) fn mark_authenticated(&mut self) {
        if self.session.result != AuthResult::Authenticated {
            self.session.result = AuthResult::Authenticated;
            self.session.last_error = None;
            info!("{:?} authentication succeeded", self.session.version);
            self.events
                .on_event(EngineEvent::Authenticated(self.session.version));
        }
    }

    pub(crate) fn record_failure(&mut self, error: Error) {
        let state = self.session.state;
        warn!("Authentication failed in {}: {}", state, error);
        self.session.result = AuthResult::Failed;
        self.session.counters.failures += 1;
        if let Error::Protocol(ProtocolError::RevokedKsv(ksv)) = &error {
            self.events.on_event(EngineEvent::KsvRevoked(*ksv));
        }
        self.events.on_event(EngineEvent::AuthenticationFailed {
            state,
            error: error.clone(),
        });
        self.session.last_error = Some(error);
    }

    pub(crate) fn hardware_fault(&mut self, code: u8) {
        self.events.on_event(EngineEvent::HardwareFault { code });
    }

    /// AKSV from the key-store, cached once read.
    pub(crate) fn own_aksv(&mut self) -> Result<Ksv> {
        if let Some(aksv) = self.session.aksv {
            return Ok(aksv);
        }
        let aksv = self.keystore.get_own_public_key()?;
        if !aksv.is_legal() {
            return Err(ProtocolError::IllegalKsv(aksv).into());
        }
        self.session.aksv = Some(aksv);
        Ok(aksv)
    }

    /// Run the attached sink plus `downstream` through revocation and
    /// duplicate checks.
    pub(crate) fn check_topology(&self, downstream: &[Ksv]) -> Result<()> {
        let mut chain: Vec<Ksv> = self.session.bksv.into_iter().collect();
        chain.extend_from_slice(downstream);
        match self.revocation.validate_topology(&chain)? {
            RevocationResult::Revoked => {
                let ksv = self
                    .revocation
                    .first_revoked(&chain)
                    .unwrap_or_default();
                Err(ProtocolError::RevokedKsv(ksv).into())
            }
            RevocationResult::Clean | RevocationResult::NotChecked => Ok(()),
        }
    }

    fn publish_link_status(&mut self) {
        let status = self.session.link_status();
        if status != self.published {
            info!("Link status {:?} -> {:?}", self.published, status);
            self.published = status;
            self.status_tx.send_replace(status);
            self.events.on_event(EngineEvent::LinkStatusChanged(status));
        }
    }
}
