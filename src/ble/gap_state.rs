//! GAP State Management
//!
//! Application-level link state shared between the advertising task, the
//! link event callbacks and the power manager. Static allocation only.

use defmt::Format;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::Instant;

use crate::ble::connection::{ConnectionManager, TerminateReason, INVALID_CONN_HANDLE};
use crate::config::{RfPower, APP_RF_POWER};

/// Maximum device name length (GAP specification limit)
pub const MAX_DEVICE_NAME_LEN: usize = 32;

/// Advertising state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
#[repr(u8)]
pub enum AdvState {
    Stopped = 0,
    Connectable = 1,
    Beacon = 2,
}

/// Progress of the "disconnect before deep sleep" sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum TerminateHandshake {
    /// Nothing pending
    Idle,
    /// Local disconnect requested, waiting for the terminate event
    Queued,
    /// Terminate observed, ready for deep sleep
    Sent,
}

/// Link state
pub struct GapState {
    // Device identity
    pub device_name: [u8; MAX_DEVICE_NAME_LEN],
    pub device_name_len: u8,
    pub device_addr: [u8; 6],
    pub addr_type: u8, // 0=Public, 1=Random static

    // Advertising
    pub adv_state: AdvState,
    pub advertise_begin: Instant,

    // Connection
    pub conn_handle: u16,
    pub connected: bool,
    pub latest_user_event: Instant,
    /// Set when connection parameters were requested, `None` before
    pub interval_update: Option<Instant>,
    pub last_terminate: Option<TerminateReason>,
    pub terminate_handshake: TerminateHandshake,
    pub connections: ConnectionManager,

    // Radio
    pub tx_power: RfPower,
}

impl Default for GapState {
    fn default() -> Self {
        let mut state = Self::new();
        state.set_device_name(crate::config::DEVICE_NAME.as_bytes());
        state
    }
}

impl GapState {
    /// Initialize a new GAP state with defaults
    pub const fn new() -> Self {
        Self {
            device_name: [0; MAX_DEVICE_NAME_LEN],
            device_name_len: 0,
            device_addr: [0; 6],
            addr_type: 0,

            adv_state: AdvState::Stopped,
            advertise_begin: Instant::from_ticks(0),

            conn_handle: INVALID_CONN_HANDLE,
            connected: false,
            latest_user_event: Instant::from_ticks(0),
            interval_update: None,
            last_terminate: None,
            terminate_handshake: TerminateHandshake::Idle,
            connections: ConnectionManager::new(),

            tx_power: APP_RF_POWER,
        }
    }

    /// Check if currently connected
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Set connection status
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
        if !connected {
            self.conn_handle = INVALID_CONN_HANDLE;
        }
    }

    /// Record user activity (button press, host write)
    pub fn mark_user_event(&mut self, now: Instant) {
        self.latest_user_event = now;
    }

    /// Restart the advertising idle clock
    pub fn restart_advertising_clock(&mut self, now: Instant) {
        self.advertise_begin = now;
    }

    /// Set device name (truncated to MAX_DEVICE_NAME_LEN if too long)
    pub fn set_device_name(&mut self, name: &[u8]) {
        let len = name.len().min(MAX_DEVICE_NAME_LEN);
        self.device_name[..len].copy_from_slice(&name[..len]);
        self.device_name_len = len as u8;

        if len < MAX_DEVICE_NAME_LEN {
            self.device_name[len..].fill(0);
        }
    }

    /// Get device name as slice
    pub fn device_name(&self) -> &[u8] {
        &self.device_name[..self.device_name_len as usize]
    }
}

/// Global GAP state - single static instance
static GAP_STATE: Mutex<CriticalSectionRawMutex, GapState> = Mutex::new(GapState::new());

/// Latest user activity reported from synchronous contexts (GATT callbacks)
static USER_ACTIVITY: Signal<CriticalSectionRawMutex, Instant> = Signal::new();

/// Report user activity without holding the state lock
pub fn note_user_activity(now: Instant) {
    USER_ACTIVITY.signal(now);
}

/// Fold pending activity reports into the state
pub fn absorb_user_activity(state: &mut GapState) {
    if let Some(at) = USER_ACTIVITY.try_take() {
        if at > state.latest_user_event {
            state.mark_user_event(at);
        }
    }
}

/// Get reference to global GAP state
pub fn gap_state() -> &'static Mutex<CriticalSectionRawMutex, GapState> {
    &GAP_STATE
}

/// Initialize GAP state with the device name and start the advertising clock
pub async fn init(now: Instant) {
    let mut state = GAP_STATE.lock().await;
    state.set_device_name(crate::config::DEVICE_NAME.as_bytes());
    state.restart_advertising_clock(now);
    state.mark_user_event(now);
}
