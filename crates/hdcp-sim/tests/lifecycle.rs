//! Enable/disable, hot-plug and worker-thread behavior.

mod common;

use std::time::Duration;

use hdcp_core::{
    AuthResult, Error, HotplugState, KeyStoreError, LinkStatus, ProtocolVersion, Timeouts,
};
use hdcp_engine::{EngineBuilder, EngineEvent, Event, Hdcp1State, HdcpHandle, State};
use hdcp_keystore::{protected, Command};
use hdcp_sim::{advance, LinkOp, SimulatedLink};

use common::{plugged, recorder, saw};

mod hotplug {
    use super::*;

    #[test]
    fn nothing_happens_until_plugged() {
        let (handler, log) = recorder();
        let (mut d, _probe) = SimulatedLink::hdcp1_sink()
            .build(EngineBuilder::new().event_handler(handler))
            .unwrap();
        d.dispatch(Event::Start);
        advance(&mut d, 1_000);
        assert_eq!(d.state(), State::Idle);
        assert_eq!(d.link_status(), LinkStatus::Disconnected);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn sink_off_does_not_authenticate() {
        let (mut d, _probe) = SimulatedLink::hdcp1_sink().build(EngineBuilder::new()).unwrap();
        d.dispatch(Event::Start);
        d.dispatch(Event::Hotplug(HotplugState::PluggedSinkOff));
        assert_eq!(d.state(), State::Idle);
        assert_eq!(d.link_status(), LinkStatus::Disconnected);
    }

    #[test]
    fn unplug_cancels_authentication() {
        let (mut d, probe, log) = plugged(SimulatedLink::hdcp1_sink(), EngineBuilder::new());
        advance(&mut d, 500);
        assert_eq!(d.state(), State::Hdcp1(Hdcp1State::WaitR0));

        d.dispatch(Event::Hotplug(HotplugState::Unplugged));
        assert_eq!(d.state(), State::Idle);
        assert_eq!(d.link_status(), LinkStatus::Disconnected);
        assert_eq!(d.session().version(), ProtocolVersion::Undetermined);
        assert!(saw(&log, &EngineEvent::LinkStatusChanged(LinkStatus::Disconnected)));

        advance(&mut d, 1_000);
        assert_eq!(d.state(), State::Idle);
        assert!(!probe.transmitter().encryption_1x);
    }

    #[test]
    fn unplug_drops_encrypted_link() {
        let (mut d, probe, _log) = plugged(SimulatedLink::hdcp2_sink(), EngineBuilder::new());
        advance(&mut d, 800);
        assert_eq!(d.link_status(), LinkStatus::ConnectedEncrypted);

        d.dispatch(Event::Hotplug(HotplugState::Unplugged));
        assert_eq!(d.state(), State::Idle);
        assert_eq!(d.session().result(), AuthResult::Undetermined);
        assert!(!probe.transmitter().encryption_2x);
    }

    #[test]
    fn signal_is_seen_without_an_event() {
        let (mut d, _probe, _log) = plugged(SimulatedLink::hdcp1_sink(), EngineBuilder::new());
        advance(&mut d, 500);

        d.hotplug_signal().set(HotplugState::Unplugged);
        d.dispatch(Event::Tick);
        assert_eq!(d.state(), State::Idle);
        assert_eq!(d.link_status(), LinkStatus::Disconnected);
    }

    #[test]
    fn replug_restarts() {
        let (mut d, _probe, _log) = plugged(SimulatedLink::hdcp1_sink(), EngineBuilder::new());
        advance(&mut d, 600);
        d.dispatch(Event::Hotplug(HotplugState::Unplugged));
        d.dispatch(Event::Hotplug(HotplugState::PluggedSinkOn));
        assert_eq!(d.state(), State::Hdcp1(Hdcp1State::WaitResChgOk));

        advance(&mut d, 600);
        assert_eq!(d.link_status(), LinkStatus::ConnectedEncrypted);
    }

    #[test]
    fn keystore_is_told_about_hotplug() {
        let (mut d, probe, _log) = plugged(SimulatedLink::hdcp1_sink(), EngineBuilder::new());
        d.dispatch(Event::Hotplug(HotplugState::Unplugged));
        let calls = d.keystore().channel().calls();
        let writes: Vec<u32> = calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.command == Command::WriteRegister)
            .map(|call| call.p1)
            .collect();
        assert_eq!(
            writes,
            vec![protected::HPD_INACTIVE, protected::HPD_ACTIVE, protected::HPD_INACTIVE]
        );
        assert!(probe.called(Command::WriteReset));
    }
}

mod enable {
    use super::*;

    #[test]
    fn start_while_plugged_authenticates() {
        let (handler, _log) = recorder();
        let (mut d, _probe) = SimulatedLink::hdcp1_sink()
            .build(EngineBuilder::new().event_handler(handler))
            .unwrap();
        d.dispatch(Event::Hotplug(HotplugState::PluggedSinkOn));
        assert_eq!(d.state(), State::Idle);
        assert_eq!(d.link_status(), LinkStatus::ConnectedUnencrypted);

        d.dispatch(Event::Start);
        assert_eq!(d.state(), State::Hdcp1(Hdcp1State::WaitResChgOk));
        advance(&mut d, 600);
        assert_eq!(d.link_status(), LinkStatus::ConnectedEncrypted);
    }

    #[test]
    fn stop_tears_down_and_unmutes() {
        let (mut d, probe, _log) = plugged(SimulatedLink::hdcp1_sink(), EngineBuilder::new());
        advance(&mut d, 500);
        assert_eq!(probe.count(LinkOp::AvMute), 1);

        d.dispatch(Event::Stop);
        assert_eq!(d.state(), State::Idle);
        assert!(!d.session().is_enabled());
        assert_eq!(probe.count(LinkOp::AvUnmute), 1);
        assert!(!d.keystore().channel().keys_in_cipher());
        assert_eq!(d.link_status(), LinkStatus::ConnectedUnencrypted);

        advance(&mut d, 1_000);
        assert_eq!(d.state(), State::Idle);
    }

    #[test]
    fn refused_keystore_keeps_hdcp_disabled() {
        let (mut d, _probe, log) = plugged(
            SimulatedLink::hdcp1_sink().refuse_keystore(),
            EngineBuilder::new(),
        );
        assert!(!d.session().is_enabled());
        assert_eq!(d.state(), State::Idle);
        assert!(matches!(
            d.session().last_error(),
            Some(Error::SecureCall(KeyStoreError::Channel(_)))
        ));
        assert!(log
            .lock()
            .unwrap()
            .iter()
            .any(|event| matches!(event, EngineEvent::AuthenticationFailed { .. })));

        advance(&mut d, 1_000);
        assert_eq!(d.link_status(), LinkStatus::ConnectedUnencrypted);
    }

    #[test]
    fn mute_can_be_disabled() {
        let (mut d, probe, _log) = plugged(
            SimulatedLink::hdcp1_sink(),
            EngineBuilder::new().mute_during_auth(false),
        );
        advance(&mut d, 600);
        assert_eq!(d.link_status(), LinkStatus::ConnectedEncrypted);
        assert!(probe.link_ops().is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = SimulatedLink::hdcp1_sink().build(EngineBuilder::new().tick_interval_ms(0));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

mod worker {
    use super::*;

    fn fast() -> EngineBuilder {
        EngineBuilder::new().timeouts(Timeouts {
            res_chg_ok_ms: 30,
            r0_ms: 20,
            ..Timeouts::default()
        })
    }

    #[tokio::test]
    async fn handle_publishes_link_status() {
        let (dispatcher, probe) = SimulatedLink::hdcp1_sink().build(fast()).unwrap();
        let mut handle = HdcpHandle::spawn(dispatcher).unwrap();
        assert_eq!(handle.link_status(), LinkStatus::Disconnected);

        assert!(handle.start());
        assert!(handle.notify_hotplug(HotplugState::PluggedSinkOn));
        handle
            .wait_for_status(LinkStatus::ConnectedEncrypted, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(probe.transmitter().encryption_1x);

        assert!(handle.notify_hotplug(HotplugState::Unplugged));
        handle
            .wait_for_status(LinkStatus::Disconnected, Duration::from_secs(5))
            .await
            .unwrap();

        handle.shutdown();
        assert!(!handle.is_running());
        assert!(!handle.start());
    }

    #[tokio::test]
    async fn wait_times_out() {
        let (dispatcher, _probe) = SimulatedLink::hdcp1_sink().build(fast()).unwrap();
        let handle = HdcpHandle::spawn(dispatcher).unwrap();
        let result = handle
            .wait_for_status(LinkStatus::ConnectedEncrypted, Duration::from_millis(100))
            .await;
        assert_eq!(result, Err(Error::Timeout));
    }
}
