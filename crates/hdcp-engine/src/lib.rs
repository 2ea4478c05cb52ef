//! # hdcp-engine
//!
//! HDCP authentication engine for an HDMI transmitter.
//!
//! This crate provides:
//! - The HDCP 1.x and HDCP 2.x authentication state machines
//! - [`Dispatcher`], which owns one link's session and advances it on
//!   timer expiry or relevant interrupts
//! - [`HdcpHandle`], a worker thread that drives the dispatcher and
//!   publishes link status
//! - The [`HdcpHardware`] and [`LinkControl`] seams to the transmitter
//!
//! ## Example
//!
//! ```ignore
//! let dispatcher = EngineBuilder::new()
//!     .srm(Arc::new(srm))
//!     .build(bus, keystore, hardware, connector)?;
//! let handle = HdcpHandle::spawn(dispatcher)?;
//! handle.start();
//! handle.notify_hotplug(HotplugState::PluggedSinkOn);
//! ```

pub mod builder;
pub mod dispatcher;
pub mod events;
pub mod hardware;
mod hdcp1x;
mod hdcp2x;
pub mod session;
pub mod state;
pub mod task;

pub use builder::EngineBuilder;
pub use dispatcher::{Dispatcher, HotplugSignal};
pub use events::{CallbackHandler, EngineEvent, Event, EventHandler, NoOpHandler};
pub use hardware::{Hdcp2Interrupts, HdcpHardware, LinkControl, Topology2x, VStatus};
pub use session::{Countdown, Session};
pub use state::{Flow, Hdcp1State, Hdcp2State, State};
pub use task::HdcpHandle;
