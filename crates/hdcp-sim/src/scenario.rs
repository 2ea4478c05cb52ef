//! Assembles a simulated link around an [`EngineBuilder`].

use std::sync::{Arc, Mutex};

use hdcp_core::{Bcaps, Bstatus, Ksv, Result, KSV_LEN};
use hdcp_engine::{Dispatcher, EngineBuilder, Event};
use hdcp_keystore::{Command, KeyStoreGateway};

use crate::keystore::{CallLog, SimSecureChannel};
use crate::link::{LinkLog, LinkOp, RecordingLink};
use crate::sink::{self, Hdcp2Behavior, SharedSink, SimDdcBus, SinkModel};
use crate::transmitter::{SharedTransmitter, SimHardware, TransmitterState};

pub type SimKeyStore = KeyStoreGateway<SimSecureChannel>;
pub type SimDispatcher = Dispatcher<SimDdcBus, SimKeyStore, SimHardware, RecordingLink>;

/// The transmitter's own AKSV in every simulation.
pub const SIM_AKSV: Ksv = Ksv([0x0f, 0x0f, 0x0f, 0xf0, 0xf0]);

/// A legal KSV distinct for every `n` below 20.
pub fn sim_ksv(n: u8) -> Ksv {
    // Rotate a 20-bit run through the 40-bit value.
    let bits: u64 = 0xf_ffff << (n % 21);
    let bytes = bits.to_le_bytes();
    let mut ksv = [0u8; KSV_LEN];
    ksv.copy_from_slice(&bytes[..KSV_LEN]);
    Ksv(ksv)
}

/// Description of a sink plus transmitter to simulate.
#[derive(Debug, Clone)]
pub struct SimulatedLink {
    sink: SinkModel,
    dvi: bool,
    tmds_above_340mhz: bool,
    refuse_open: bool,
    fail: Option<(Command, u32)>,
}

impl SimulatedLink {
    /// HDCP 1.x receiver.
    pub fn hdcp1_sink() -> Self {
        let sink = SinkModel {
            bksv: sim_ksv(1),
            bcaps: Bcaps(Bcaps::HDMI_RESERVED | Bcaps::FEATURES_1_1),
            bstatus: Bstatus::for_topology(0, 0, true),
            ..SinkModel::default()
        };
        Self::with_sink(sink)
    }

    /// HDCP 1.x repeater with `downstream` receivers behind it.
    pub fn hdcp1_repeater(downstream: u8) -> Self {
        let mut link = Self::hdcp1_sink();
        link.sink.bcaps = Bcaps(link.sink.bcaps.0 | Bcaps::REPEATER);
        link.sink.ksv_list = (0..downstream).map(|i| sim_ksv(2 + i)).collect();
        link.sink.bstatus = Bstatus::for_topology(downstream, 1, true);
        link.sink.ready_after_reads = 1;
        link
    }

    /// HDCP 2.2 receiver.
    pub fn hdcp2_sink() -> Self {
        let mut link = Self::hdcp1_sink();
        link.sink.hdcp2_capable = true;
        link.sink.hdcp2.receiver_id = sim_ksv(1);
        link
    }

    /// HDCP 2.2 repeater with `downstream` receivers behind it.
    pub fn hdcp2_repeater(downstream: u8) -> Self {
        let mut link = Self::hdcp2_sink();
        link.sink.hdcp2.is_repeater = true;
        link.sink.hdcp2.depth = 1;
        link.sink.hdcp2.receiver_ids = (0..downstream).map(|i| sim_ksv(2 + i).0).collect();
        link
    }

    pub fn with_sink(sink: SinkModel) -> Self {
        Self {
            sink,
            dvi: false,
            tmds_above_340mhz: false,
            refuse_open: false,
            fail: None,
        }
    }

    pub fn sink_mut(&mut self) -> &mut SinkModel {
        &mut self.sink
    }

    pub fn bksv(mut self, bksv: Ksv) -> Self {
        self.sink.bksv = bksv;
        self.sink.hdcp2.receiver_id = bksv;
        self
    }

    pub fn corrupt_ri(mut self) -> Self {
        self.sink.corrupt_ri = true;
        self
    }

    pub fn corrupt_v(mut self) -> Self {
        self.sink.corrupt_v = true;
        self
    }

    pub fn hdcp2_behavior(mut self, behavior: Hdcp2Behavior) -> Self {
        self.sink.hdcp2.behavior = behavior;
        self
    }

    /// Status polls the 2.x engine spends on AKE and then on the certificate.
    pub fn hdcp2_polls(mut self, ake: u32, cert: u32) -> Self {
        self.sink.hdcp2.ake_polls = ake;
        self.sink.hdcp2.cert_polls = cert;
        self
    }

    pub fn dvi(mut self) -> Self {
        self.dvi = true;
        self
    }

    pub fn tmds_above_340mhz(mut self) -> Self {
        self.tmds_above_340mhz = true;
        self
    }

    pub fn refuse_keystore(mut self) -> Self {
        self.refuse_open = true;
        self
    }

    pub fn fail_keystore_command(mut self, command: Command, status: u32) -> Self {
        self.fail = Some((command, status));
        self
    }

    /// Build the dispatcher and a probe into the simulated parts.
    pub fn build(self, builder: EngineBuilder) -> Result<(SimDispatcher, SimProbe)> {
        let sink: SharedSink = Arc::new(Mutex::new(self.sink));

        let mut channel = SimSecureChannel::new(SIM_AKSV);
        if self.refuse_open {
            channel = channel.refuse_open();
        }
        if let Some((command, status)) = self.fail {
            channel = channel.fail_command(command, status);
        }
        let hardware = SimHardware::new(Arc::clone(&sink), SIM_AKSV);
        let link = RecordingLink::new(self.dvi, self.tmds_above_340mhz);

        let probe = SimProbe {
            sink: Arc::clone(&sink),
            transmitter: hardware.state(),
            calls: channel.calls(),
            link_ops: link.log(),
        };
        let dispatcher = builder.build(
            SimDdcBus::new(sink),
            KeyStoreGateway::new(channel),
            hardware,
            link,
        )?;
        Ok((dispatcher, probe))
    }
}

/// Read-only window into a running simulation.
#[derive(Clone)]
pub struct SimProbe {
    sink: SharedSink,
    transmitter: SharedTransmitter,
    calls: CallLog,
    link_ops: LinkLog,
}

impl SimProbe {
    pub fn sink(&self) -> SinkModel {
        sink::lock(&self.sink).clone()
    }

    /// Change the sink mid-run.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut SinkModel) -> R) -> R {
        f(&mut sink::lock(&self.sink))
    }

    pub fn transmitter(&self) -> TransmitterState {
        self.transmitter
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    pub fn keystore_calls(&self) -> Vec<Command> {
        self.calls
            .lock()
            .map(|calls| calls.iter().map(|call| call.command).collect())
            .unwrap_or_default()
    }

    pub fn called(&self, command: Command) -> bool {
        self.keystore_calls().contains(&command)
    }

    pub fn link_ops(&self) -> Vec<LinkOp> {
        self.link_ops
            .lock()
            .map(|ops| ops.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, op: LinkOp) -> usize {
        self.link_ops().iter().filter(|o| **o == op).count()
    }
}

/// Dispatch ticks until `ms` of simulated time have passed.
pub fn advance(dispatcher: &mut SimDispatcher, ms: u32) {
    let step = dispatcher.config().tick_interval_ms.max(1);
    for _ in 0..ms.div_ceil(step) {
        dispatcher.dispatch(Event::Tick);
    }
}
