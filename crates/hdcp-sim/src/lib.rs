//! # hdcp-sim
//!
//! Software stand-ins for everything the HDCP engine talks to.
//!
//! This crate provides:
//! - [`SimDdcBus`] in front of a [`SinkModel`] (receiver or repeater)
//! - [`SimHardware`], a transmitter HDCP block with a scripted 2.x engine
//! - [`SimSecureChannel`], an in-process key-store
//! - [`RecordingLink`] connector controls
//! - [`SimulatedLink`] to wire them into a dispatcher, and [`SimProbe`]
//!   to observe them afterwards

pub mod keystore;
pub mod link;
pub mod scenario;
pub mod sink;
pub mod transmitter;

pub use keystore::{Call, SimSecureChannel};
pub use link::{LinkOp, RecordingLink};
pub use scenario::{
    advance, sim_ksv, SimDispatcher, SimKeyStore, SimProbe, SimulatedLink, SIM_AKSV,
};
pub use sink::{derive_ri, derive_v, Hdcp2Behavior, Hdcp2Sink, SharedSink, SimDdcBus, SinkModel};
pub use transmitter::{SimHardware, TransmitterState};
