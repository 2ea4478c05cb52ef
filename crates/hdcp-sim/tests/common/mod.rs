//! Shared helpers for the simulated-link scenarios.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use hdcp_core::{Error, HotplugState};
use hdcp_engine::{CallbackHandler, EngineBuilder, EngineEvent, Event, EventHandler, State};
use hdcp_sim::{SimDispatcher, SimProbe, SimulatedLink};

pub type EventLog = Arc<Mutex<Vec<EngineEvent>>>;

pub fn recorder() -> (impl EventHandler + 'static, EventLog) {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let handler = CallbackHandler::new(move |event| sink.lock().unwrap().push(event));
    (handler, log)
}

/// Build `link`, enable HDCP and plug in a powered sink.
pub fn plugged(link: SimulatedLink, builder: EngineBuilder) -> (SimDispatcher, SimProbe, EventLog) {
    let (handler, log) = recorder();
    let (mut dispatcher, probe) = link.build(builder.event_handler(handler)).unwrap();
    dispatcher.dispatch(Event::Start);
    dispatcher.dispatch(Event::Hotplug(HotplugState::PluggedSinkOn));
    (dispatcher, probe, log)
}

/// States entered, in order.
pub fn visited(log: &EventLog) -> Vec<State> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            EngineEvent::StateChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect()
}

pub fn failures(log: &EventLog) -> Vec<(State, Error)> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            EngineEvent::AuthenticationFailed { state, error } => Some((*state, error.clone())),
            _ => None,
        })
        .collect()
}

pub fn saw(log: &EventLog, wanted: &EngineEvent) -> bool {
    count(log, wanted) > 0
}

pub fn count(log: &EventLog, wanted: &EngineEvent) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|event| *event == wanted)
        .count()
}
