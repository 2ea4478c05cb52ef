//! HDCP 2.x authentication through the simulated transmitter engine.

mod common;

use hdcp_core::{Error, InterruptKind, LinkStatus, ProtocolError, ProtocolVersion};
use hdcp_engine::{EngineBuilder, EngineEvent, Event, Hdcp2State, State};
use hdcp_keystore::Command;
use hdcp_sim::{advance, Hdcp2Behavior, LinkOp, SimulatedLink};

use common::{failures, plugged, saw, visited};

use Hdcp2State::*;

fn hdcp2(state: Hdcp2State) -> State {
    State::Hdcp2(state)
}

#[test]
fn receiver_authenticates() {
    let (mut d, probe, log) = plugged(SimulatedLink::hdcp2_sink(), EngineBuilder::new());
    assert_eq!(d.session().version(), ProtocolVersion::Hdcp2x);
    assert_eq!(d.state(), hdcp2(WaitResChgOk));

    advance(&mut d, 300);
    assert_eq!(d.state(), hdcp2(InitialOk));
    assert!(probe.called(Command::LoadFirmware));

    advance(&mut d, 500);
    assert_eq!(d.state(), hdcp2(Encryption));
    assert_eq!(d.link_status(), LinkStatus::ConnectedEncrypted);
    assert!(probe.transmitter().encryption_2x);
    assert!(!probe.transmitter().encryption_1x);
    assert!(saw(&log, &EngineEvent::Authenticated(ProtocolVersion::Hdcp2x)));
    assert_eq!(probe.count(LinkOp::AvUnmute), 1);

    assert_eq!(
        visited(&log),
        vec![
            hdcp2(WaitResChgOk),
            hdcp2(LoadFw),
            hdcp2(InitialOk),
            hdcp2(Authentication),
            hdcp2(CheckAkeOk),
            hdcp2(CheckCertOk),
            hdcp2(RepeaterCheck),
            hdcp2(AuthenCheck),
            hdcp2(Encryption),
        ]
    );

    // Encryption is terminal until something changes.
    advance(&mut d, 1_000);
    assert_eq!(d.state(), hdcp2(Encryption));
}

#[test]
fn repeater_authenticates() {
    let (mut d, probe, log) = plugged(SimulatedLink::hdcp2_repeater(2), EngineBuilder::new());
    advance(&mut d, 1_200);

    assert_eq!(d.state(), hdcp2(Encryption));
    assert_eq!(d.session().ksv_list().len(), 2);
    assert_eq!(d.session().topology().device_count, 2);
    assert!(d.session().topology().is_repeater);
    assert_eq!(probe.transmitter().stream_manage_acks, 1);

    let states = visited(&log);
    assert!(states.contains(&hdcp2(RepeaterCheckOk)));
    assert!(states.contains(&hdcp2(ResetReceiver)));
    assert!(states.contains(&hdcp2(RepeatMsgDone)));
}

#[test]
fn interrupt_shortcuts_cert_wait() {
    let (mut d, _probe, _log) = plugged(SimulatedLink::hdcp2_sink(), EngineBuilder::new());
    advance(&mut d, 520);
    assert_eq!(d.state(), hdcp2(CheckCertOk));

    d.dispatch(Event::Interrupt(InterruptKind::CertReceived));
    assert_eq!(d.state(), hdcp2(RepeaterCheck));
}

#[test]
fn receiver_id_with_wrong_popcount_fails() {
    let mut link = SimulatedLink::hdcp2_repeater(2);
    link.sink_mut().hdcp2.receiver_ids[1] = [0xff, 0x00, 0x00, 0x00, 0x01];
    let (mut d, probe, log) = plugged(link, EngineBuilder::new());
    advance(&mut d, 900);

    let failed = failures(&log);
    assert!(!failed.is_empty());
    assert_eq!(failed[0].0, hdcp2(ResetReceiver));
    assert!(matches!(
        failed[0].1,
        Error::Protocol(ProtocolError::InvalidReceiverIdList(_))
    ));
    assert!(!saw(&log, &EngineEvent::Authenticated(ProtocolVersion::Hdcp2x)));
    assert!(!probe.transmitter().encryption_2x);
}

#[test]
fn failure_restarts_without_reloading_firmware() {
    let link = SimulatedLink::hdcp2_sink().hdcp2_behavior(Hdcp2Behavior::AuthFail);
    let (mut d, probe, log) = plugged(link, EngineBuilder::new());
    advance(&mut d, 800);

    let failed = failures(&log);
    assert_eq!(failed[0].0, hdcp2(AuthenCheck));
    assert_eq!(d.state(), hdcp2(WaitResChgOk));

    advance(&mut d, 100);
    let calls = probe.keystore_calls();
    assert_eq!(calls.iter().filter(|c| **c == Command::LoadFirmware).count(), 1);
    assert!(calls.contains(&Command::ResetFirmware));
}

#[test]
fn firmware_load_failure_restarts() {
    let link = SimulatedLink::hdcp2_sink().fail_keystore_command(Command::LoadFirmware, 0xffff_000c);
    let (mut d, _probe, log) = plugged(link, EngineBuilder::new());
    advance(&mut d, 300);

    let failed = failures(&log);
    assert_eq!(failed[0].0, hdcp2(LoadFw));
    assert_eq!(d.state(), hdcp2(WaitResChgOk));
    assert_eq!(d.link_status(), LinkStatus::ConnectedUnencrypted);
}

#[test]
fn repeated_link_faults_power_cycle_phy() {
    let link = SimulatedLink::hdcp2_sink()
        .hdcp2_behavior(Hdcp2Behavior::LinkFault)
        .tmds_above_340mhz();
    let (mut d, probe, log) = plugged(link, EngineBuilder::new());

    // Two faults: aborted, PHY untouched.
    advance(&mut d, 1_100);
    assert_eq!(failures(&log).len(), 2);
    assert_eq!(probe.count(LinkOp::PhyPowerOff), 0);

    // Third consecutive fault powers the PHY off on the way to WaitResChgOk.
    advance(&mut d, 400);
    assert_eq!(d.state(), hdcp2(WaitResChgOk));
    assert!(d.session().link_powered_off());
    assert_eq!(probe.count(LinkOp::PhyPowerOff), 1);
    assert_eq!(probe.count(LinkOp::PhyPowerOn), 0);
    assert!(saw(&log, &EngineEvent::HardwareFault { code: 0x30 }));
    assert!(!probe.transmitter().ddc_hw_poll);
    for (state, error) in failures(&log) {
        assert_eq!(state, hdcp2(CheckCertOk));
        assert_eq!(error, Error::HardwareFault { code: 0x30 });
    }

    // WaitResChgOk restores the sink's TMDS config and powers back on.
    advance(&mut d, 100);
    assert!(!d.session().link_powered_off());
    assert_eq!(probe.sink().scdc_writes, vec![0x03]);
    let ops = probe.link_ops();
    let off = ops.iter().position(|op| *op == LinkOp::PhyPowerOff);
    let on = ops.iter().position(|op| *op == LinkOp::PhyPowerOn);
    assert!(off < on);
}

#[test]
fn slow_engine_still_authenticates() {
    let link = SimulatedLink::hdcp2_sink().hdcp2_polls(2, 3);
    let (mut d, probe, log) = plugged(link, EngineBuilder::new());
    advance(&mut d, 1_000);

    assert_eq!(d.state(), hdcp2(Encryption));
    assert!(failures(&log).is_empty());
    assert!(probe.transmitter().encryption_2x);
}

#[test]
fn ake_poll_exhaustion_restarts() {
    let link = SimulatedLink::hdcp2_sink().hdcp2_polls(1_000, 0);
    let (mut d, _probe, log) = plugged(link, EngineBuilder::new());
    advance(&mut d, 650);

    let failed = failures(&log);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, hdcp2(CheckAkeOk));
    assert_eq!(
        failed[0].1,
        Error::Protocol(ProtocolError::RetriesExhausted { state: "CheckAkeOk" })
    );
    assert_eq!(d.state(), hdcp2(WaitResChgOk));
}

#[test]
fn cert_poll_exhaustion_restarts() {
    let link = SimulatedLink::hdcp2_sink().hdcp2_polls(0, 1_000);
    let (mut d, probe, log) = plugged(link, EngineBuilder::new());
    advance(&mut d, 870);

    let failed = failures(&log);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, hdcp2(CheckCertOk));
    assert_eq!(
        failed[0].1,
        Error::Protocol(ProtocolError::RetriesExhausted { state: "CheckCertOk" })
    );
    assert_eq!(d.state(), hdcp2(WaitResChgOk));
    assert!(!probe.transmitter().encryption_2x);
}

#[test]
fn link_fault_streak_survives_busy_ake_polls() {
    // Every attempt polls AKE once while the engine is busy, then faults.
    let link = SimulatedLink::hdcp2_sink()
        .hdcp2_behavior(Hdcp2Behavior::LinkFault)
        .hdcp2_polls(1, 0);
    let (mut d, probe, log) = plugged(link, EngineBuilder::new());

    advance(&mut d, 1_100);
    assert_eq!(failures(&log).len(), 2);
    assert_eq!(d.session().counters().link_fault_streak, 2);
    assert_eq!(probe.count(LinkOp::PhyPowerOff), 0);

    advance(&mut d, 450);
    assert_eq!(failures(&log).len(), 3);
    assert_eq!(probe.count(LinkOp::PhyPowerOff), 1);
    assert!(d.session().link_powered_off());
    assert_eq!(d.session().counters().link_fault_streak, 0);
    assert!(saw(&log, &EngineEvent::HardwareFault { code: 0x30 }));
}

#[test]
fn cert_poll_exhaustion_clears_link_fault_streak() {
    let link = SimulatedLink::hdcp2_sink()
        .hdcp2_behavior(Hdcp2Behavior::LinkFault)
        .hdcp2_polls(1, 0);
    let (mut d, probe, log) = plugged(link, EngineBuilder::new());
    advance(&mut d, 1_100);
    assert_eq!(d.session().counters().link_fault_streak, 2);

    // The sink stops faulting but never sends its certificate.
    probe.with_sink(|sink| {
        sink.hdcp2.behavior = Hdcp2Behavior::Normal;
        sink.hdcp2.cert_polls = 1_000;
    });
    advance(&mut d, 650);

    let failed = failures(&log);
    assert_eq!(failed.len(), 3);
    assert_eq!(
        failed[2],
        (
            hdcp2(CheckCertOk),
            Error::Protocol(ProtocolError::RetriesExhausted { state: "CheckCertOk" })
        )
    );
    assert_eq!(d.session().counters().link_fault_streak, 0);
    assert_eq!(probe.count(LinkOp::PhyPowerOff), 0);
}

#[test]
fn reauth_request_restarts() {
    let (mut d, _probe, _log) = plugged(SimulatedLink::hdcp2_sink(), EngineBuilder::new());
    advance(&mut d, 800);
    assert_eq!(d.link_status(), LinkStatus::ConnectedEncrypted);

    d.dispatch(Event::Interrupt(InterruptKind::ReauthRequest));
    assert_eq!(d.state(), hdcp2(WaitResChgOk));
    assert_eq!(d.link_status(), LinkStatus::ConnectedUnencrypted);

    advance(&mut d, 600);
    assert_eq!(d.state(), hdcp2(Encryption));
}
