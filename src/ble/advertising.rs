//! BLE Advertising Controller
//!
//! The application runs two advertising sets: a connectable set for the
//! remote and a non-connectable iBeacon set. The SoftDevice exposes a single
//! advertising set, so the two are multiplexed in time. While disconnected
//! the connectable set runs in windows that end when the beacon is due, the
//! beacon sends one event, and the cycle repeats. While connected only the
//! beacon runs, at its own interval, alongside the GATT server. Both sets go
//! out at the radio power the link callbacks keep in `GapState::tx_power`.

use defmt::{debug, info, warn, Format};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use nrf_softdevice::ble::peripheral::{
    self, AdvertiseError, Config as PeripheralConfig, ConnectableAdvertisement, FilterPolicy,
    NonconnectableAdvertisement,
};
use nrf_softdevice::ble::{gatt_server, Connection, Phy};
use nrf_softdevice::Softdevice;

use crate::ble::adv_data::{ADV_DATA, IBEACON_DATA, SCAN_RSP};
use crate::ble::connection::{TerminateReason, INVALID_CONN_HANDLE};
use crate::ble::events::{Actions, EventCallbacks, LinkAction, LinkEvent};
use crate::ble::gap_state::{self, AdvState, TerminateHandshake};
use crate::ble::services::Server;
use crate::ble::stack;
use crate::config::{RfPower, ADV_INTERVAL_BEACON, ADV_INTERVAL_CONNECTABLE};

/// Shortest connectable window worth starting (advertising timeout granularity)
pub const MIN_WINDOW: Duration = Duration::from_millis(10);

/// Advertising set handles
pub const ADV_HANDLE_CONNECTABLE: u8 = 0;
pub const ADV_HANDLE_BEACON: u8 = 1;

/// Advertising set role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum AdvSetKind {
    /// Legacy connectable, scannable, undirected
    Connectable,
    /// Legacy non-connectable, non-scannable, undirected
    Beacon,
}

/// One logical advertising set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct AdvSet {
    pub handle: u8,
    pub kind: AdvSetKind,
    /// Interval in 0.625ms units
    pub interval: u32,
}

impl AdvSet {
    /// Advertising set id carried in extended headers
    pub const fn sid(&self) -> u8 {
        self.handle
    }

    /// Interval as a duration
    pub const fn interval_duration(&self) -> Duration {
        Duration::from_micros(self.interval as u64 * 625)
    }
}

/// What to put on the air next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum AdvSlot {
    /// Connectable advertising until the beacon is due
    Connectable { window: Duration },
    /// A single beacon advertising event
    BeaconEvent,
    /// Beacon at its own interval until cancelled (during a connection)
    BeaconContinuous,
}

/// Time-multiplexing planner for the two advertising sets
pub struct AdvScheduler {
    sets: [AdvSet; 2],
    beacon_due: Instant,
}

impl AdvScheduler {
    /// The first beacon goes out at `start`
    pub const fn new(start: Instant) -> Self {
        Self {
            sets: [
                AdvSet {
                    handle: ADV_HANDLE_CONNECTABLE,
                    kind: AdvSetKind::Connectable,
                    interval: ADV_INTERVAL_CONNECTABLE,
                },
                AdvSet {
                    handle: ADV_HANDLE_BEACON,
                    kind: AdvSetKind::Beacon,
                    interval: ADV_INTERVAL_BEACON,
                },
            ],
            beacon_due: start,
        }
    }

    pub fn set(&self, handle: u8) -> Option<&AdvSet> {
        self.sets.iter().find(|s| s.handle == handle)
    }

    pub const fn connectable(&self) -> AdvSet {
        self.sets[0]
    }

    pub const fn beacon(&self) -> AdvSet {
        self.sets[1]
    }

    pub fn beacon_due(&self) -> Instant {
        self.beacon_due
    }

    /// Plan the next slot while disconnected
    pub fn next_slot(&self, now: Instant) -> AdvSlot {
        let remaining = self.beacon_due.saturating_duration_since(now);
        if remaining < MIN_WINDOW {
            AdvSlot::BeaconEvent
        } else {
            AdvSlot::Connectable { window: remaining }
        }
    }

    /// The beacon sent an event at `now`; schedule the next one
    pub fn beacon_sent(&mut self, now: Instant) {
        self.beacon_due = now + self.sets[1].interval_duration();
    }
}

/// SoftDevice advertising configuration for a set at the current radio power
pub fn peripheral_config(set: &AdvSet, slot: AdvSlot, power: RfPower) -> PeripheralConfig {
    let (timeout, max_events) = match slot {
        // Timeout is passed as # of 10 ms periods
        AdvSlot::Connectable { window } => {
            let units = (window.as_millis() / 10).clamp(1, u16::MAX as u64) as u16;
            (Some(units), None)
        }
        AdvSlot::BeaconEvent => (None, Some(1)),
        AdvSlot::BeaconContinuous => (None, None),
    };

    PeripheralConfig {
        primary_phy: Phy::M1,
        secondary_phy: Phy::M1,
        tx_power: power.tx_power(),
        timeout,
        max_events,
        interval: set.interval,
        filter_policy: FilterPolicy::Any,
    }
}

/// Local disconnect requests from the power manager
static DISCONNECT_REQUEST: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Ask the advertising task to terminate the current connection
pub fn request_disconnect() {
    DISCONNECT_REQUEST.signal(());
}

/// Dispatch a link event against the shared state
async fn raise(callbacks: &EventCallbacks, event: LinkEvent) -> Actions {
    let mut state = gap_state::gap_state().lock().await;
    callbacks.dispatch(&event, &mut state, Instant::now())
}

async fn set_adv_state(adv_state: AdvState) {
    gap_state::gap_state().lock().await.adv_state = adv_state;
}

/// Carry out what the callbacks asked for
fn apply_actions(conn: Option<&Connection>, actions: &Actions) {
    for action in actions {
        match (*action, conn) {
            (LinkAction::RequestConnParams(params), Some(conn)) => {
                if let Err(e) = conn.set_conn_params(params.into()) {
                    warn!("set_conn_params error - {:?}", defmt::Debug2Format(&e));
                } else {
                    debug!("Requested connection parameters {}", params);
                }
            }
            (LinkAction::SetTxPower(power), Some(conn)) => {
                let handle = conn.handle().unwrap_or(INVALID_CONN_HANDLE);
                if let Err(e) = stack::set_conn_tx_power(handle, power) {
                    warn!("TX power {} dBm rejected: {:?}", power.dbm(), e);
                }
            }
            // Advertising picks up `GapState::tx_power` when it next starts
            (LinkAction::SetTxPower(power), None) => debug!("TX power {} dBm for next radio session", power.dbm()),
            (LinkAction::Disconnect, Some(conn)) => {
                if conn.disconnect().is_err() {
                    debug!("Disconnect requested on a closed link");
                }
            }
            (action, None) => debug!("Action {} needs a connection, skipped", action),
        }
    }
}

/// Radio power currently configured by the callbacks
async fn radio_power() -> RfPower {
    gap_state::gap_state().lock().await.tx_power
}

/// Beacon on the air until the future is dropped
async fn beacon_while_connected(sd: &'static Softdevice, set: AdvSet) {
    let config = peripheral_config(&set, AdvSlot::BeaconContinuous, radio_power().await);
    loop {
        let adv = NonconnectableAdvertisement::NonscannableUndirected {
            adv_data: &IBEACON_DATA,
        };
        if let Err(e) = peripheral::advertise(sd, adv, &config).await {
            debug!("Beacon during connection stopped: {:?}", defmt::Debug2Format(&e));
            Timer::after(set.interval_duration()).await;
        }
    }
}

/// Serve one connection to completion
async fn run_connection(
    sd: &'static Softdevice,
    server: &Server,
    callbacks: &EventCallbacks,
    scheduler: &AdvScheduler,
    conn: Connection,
) {
    let handle = conn.handle().unwrap_or(INVALID_CONN_HANDLE);
    let peer = conn.peer_address().bytes();
    DISCONNECT_REQUEST.reset();

    let actions = raise(callbacks, LinkEvent::Connect { handle, peer }).await;
    apply_actions(Some(&conn), &actions);

    let beacon = scheduler.beacon();
    let gatt_fut = gatt_server::run(&conn, server, |e| server.handle_event(e));
    let side_fut = async {
        set_adv_state(AdvState::Beacon).await;
        let _ = select(beacon_while_connected(sd, beacon), DISCONNECT_REQUEST.wait()).await;

        info!("Terminating connection {}", handle);
        let mut actions = Actions::new();
        let _ = actions.push(LinkAction::Disconnect);
        apply_actions(Some(&conn), &actions);
        core::future::pending::<()>().await
    };

    match select(gatt_fut, side_fut).await {
        Either::First(e) => debug!("gatt_server run exited: {:?}", defmt::Debug2Format(&e)),
        Either::Second(()) => {}
    }

    let reason = {
        let state = gap_state::gap_state().lock().await;
        if state.terminate_handshake == TerminateHandshake::Queued {
            TerminateReason::LocalHostTerminated
        } else {
            TerminateReason::RemoteUserTerminated
        }
    };
    let actions = raise(callbacks, LinkEvent::Terminate { handle, reason }).await;
    apply_actions(None, &actions);
}

/// Advertising and connection loop
#[embassy_executor::task]
pub async fn advertising_task(sd: &'static Softdevice, server: Server, callbacks: EventCallbacks) {
    info!("Starting advertising task...");

    let mut scheduler = AdvScheduler::new(Instant::now());
    let connectable = scheduler.connectable();
    let beacon = scheduler.beacon();
    // Radio starts from reset, same as leaving suspend
    let mut resumed = true;

    loop {
        if resumed {
            let actions = raise(&callbacks, LinkEvent::SuspendExit).await;
            apply_actions(None, &actions);
            resumed = false;
        }

        let power = radio_power().await;
        let slot = scheduler.next_slot(Instant::now());

        match slot {
            AdvSlot::Connectable { .. } => {
                set_adv_state(AdvState::Connectable).await;
                let adv = ConnectableAdvertisement::ScannableUndirected {
                    adv_data: &ADV_DATA,
                    scan_data: &SCAN_RSP,
                };
                let config = peripheral_config(&connectable, slot, power);

                match peripheral::advertise_connectable(sd, adv, &config).await {
                    Ok(conn) => {
                        run_connection(sd, &server, &callbacks, &scheduler, conn).await;
                        resumed = true;
                    }
                    Err(AdvertiseError::Timeout) => {
                        let actions = raise(&callbacks, LinkEvent::AdvDurationTimeout).await;
                        apply_actions(None, &actions);
                    }
                    Err(e) => {
                        warn!("BLE advertising failed: {:?}", defmt::Debug2Format(&e));
                        set_adv_state(AdvState::Stopped).await;
                        Timer::after(beacon.interval_duration()).await;
                        resumed = true;
                    }
                }
            }
            // Disconnected, the beacon only gets single events between windows
            AdvSlot::BeaconEvent | AdvSlot::BeaconContinuous => {
                set_adv_state(AdvState::Beacon).await;
                let adv = NonconnectableAdvertisement::NonscannableUndirected {
                    adv_data: &IBEACON_DATA,
                };
                let config = peripheral_config(&beacon, AdvSlot::BeaconEvent, power);
                match peripheral::advertise(sd, adv, &config).await {
                    Ok(()) | Err(AdvertiseError::Timeout) => {}
                    Err(e) => warn!("Beacon event failed: {:?}", defmt::Debug2Format(&e)),
                }
                scheduler.beacon_sent(Instant::now());
            }
        }
    }
}
