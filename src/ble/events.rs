//! Link Event Dispatch
//!
//! The advertising task turns what it observes from the SoftDevice into
//! [`LinkEvent`]s and hands them to the callbacks registered here. Callbacks
//! only touch [`GapState`]; anything that needs the stack is returned as a
//! [`LinkAction`] and carried out by the task afterwards.

use defmt::{debug, Format};
use embassy_time::Instant;
use heapless::Vec;

use crate::ble::connection::{ConnectionParams, TerminateReason};
use crate::ble::gap_state::GapState;
use crate::config::RfPower;

/// Maximum actions a single event may produce
pub const MAX_ACTIONS: usize = 4;

/// Events raised by the link layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum LinkEvent {
    /// Peripheral connection established
    Connect { handle: u16, peer: [u8; 6] },
    /// Connection terminated
    Terminate { handle: u16, reason: TerminateReason },
    /// Radio resumed after a low-power period
    SuspendExit,
    /// An advertising duration elapsed without a connection
    AdvDurationTimeout,
}

/// Event kinds, one callback slot each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
#[repr(u8)]
pub enum LinkEventKind {
    Connect = 0,
    Terminate = 1,
    SuspendExit = 2,
    AdvDurationTimeout = 3,
}

impl LinkEventKind {
    pub const COUNT: usize = 4;
}

impl LinkEvent {
    pub fn kind(&self) -> LinkEventKind {
        match self {
            LinkEvent::Connect { .. } => LinkEventKind::Connect,
            LinkEvent::Terminate { .. } => LinkEventKind::Terminate,
            LinkEvent::SuspendExit => LinkEventKind::SuspendExit,
            LinkEvent::AdvDurationTimeout => LinkEventKind::AdvDurationTimeout,
        }
    }
}

/// Stack operations requested by callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum LinkAction {
    RequestConnParams(ConnectionParams),
    SetTxPower(RfPower),
    Disconnect,
}

pub type Actions = Vec<LinkAction, MAX_ACTIONS>;

/// Callback signature
pub type LinkEventHandler = fn(&LinkEvent, &mut GapState, Instant, &mut Actions);

/// Callback registry
pub struct EventCallbacks {
    handlers: [Option<LinkEventHandler>; LinkEventKind::COUNT],
}

impl Default for EventCallbacks {
    fn default() -> Self {
        Self::new()
    }
}

impl EventCallbacks {
    pub const fn new() -> Self {
        Self {
            handlers: [None; LinkEventKind::COUNT],
        }
    }

    /// Register the callback for an event kind, replacing any previous one
    pub fn register(&mut self, kind: LinkEventKind, handler: LinkEventHandler) {
        if self.handlers[kind as usize].replace(handler).is_some() {
            debug!("EVENTS: Replaced callback for {}", kind);
        }
    }

    /// Remove the callback for an event kind
    pub fn unregister(&mut self, kind: LinkEventKind) {
        self.handlers[kind as usize] = None;
    }

    pub fn is_registered(&self, kind: LinkEventKind) -> bool {
        self.handlers[kind as usize].is_some()
    }

    /// Run the registered callback, returning the stack actions it asked for
    pub fn dispatch(&self, event: &LinkEvent, state: &mut GapState, now: Instant) -> Actions {
        let mut actions = Actions::new();
        match self.handlers[event.kind() as usize] {
            Some(handler) => handler(event, state, now, &mut actions),
            None => debug!("EVENTS: No callback for {}", event.kind()),
        }
        actions
    }
}
