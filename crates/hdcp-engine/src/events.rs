//! Dispatcher inputs and engine events.

use hdcp_core::{Error, HotplugState, InterruptKind, Ksv, LinkStatus, ProtocolVersion};

use crate::state::State;

/// Input to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Periodic timer tick.
    Tick,
    Interrupt(InterruptKind),
    /// Hot-plug change; `Hotplug(Unplugged)` cancels everything in flight.
    Hotplug(HotplugState),
    /// Enable HDCP on this link.
    Start,
    /// Disable HDCP on this link.
    Stop,
}

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StateChanged { from: State, to: State },
    LinkStatusChanged(LinkStatus),
    Authenticated(ProtocolVersion),
    AuthenticationFailed { state: State, error: Error },
    KsvRevoked(Ksv),
    /// Physical link powered off after repeated faults.
    HardwareFault { code: u8 },
}

/// Handler for engine events. Called on the worker thread; keep it short.
pub trait EventHandler: Send {
    fn on_event(&self, event: EngineEvent);
}

/// No-op event handler.
pub struct NoOpHandler;

impl EventHandler for NoOpHandler {
    fn on_event(&self, _event: EngineEvent) {}
}

/// Callback-based event handler.
pub struct CallbackHandler<F>
where
    F: Fn(EngineEvent) + Send,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(EngineEvent) + Send,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(EngineEvent) + Send,
{
    fn on_event(&self, event: EngineEvent) {
        (self.callback)(event);
    }
}
