//! Connector controls that only record what they were asked to do.

use std::sync::{Arc, Mutex};

use hdcp_engine::LinkControl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOp {
    AvMute,
    AvUnmute,
    PhyPowerOff,
    PhyPowerOn,
}

pub type LinkLog = Arc<Mutex<Vec<LinkOp>>>;

pub struct RecordingLink {
    dvi: bool,
    tmds_above_340mhz: bool,
    ops: LinkLog,
}

impl RecordingLink {
    pub fn new(dvi: bool, tmds_above_340mhz: bool) -> Self {
        Self {
            dvi,
            tmds_above_340mhz,
            ops: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn log(&self) -> LinkLog {
        Arc::clone(&self.ops)
    }

    fn push(&self, op: LinkOp) {
        if let Ok(mut ops) = self.ops.lock() {
            ops.push(op);
        }
    }
}

impl LinkControl for RecordingLink {
    fn av_mute(&mut self) {
        self.push(LinkOp::AvMute);
    }

    fn av_unmute(&mut self) {
        self.push(LinkOp::AvUnmute);
    }

    fn phy_power_off(&mut self) {
        self.push(LinkOp::PhyPowerOff);
    }

    fn phy_power_on(&mut self) {
        self.push(LinkOp::PhyPowerOn);
    }

    fn tmds_above_340mhz(&self) -> bool {
        self.tmds_above_340mhz
    }

    fn is_dvi_mode(&self) -> bool {
        self.dvi
    }
}
