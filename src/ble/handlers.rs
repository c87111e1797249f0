//! Link event callbacks for the remote-control application.

use defmt::{debug, info, warn};
use embassy_time::Instant;

use crate::ble::connection::{ConnectionParams, TerminateReason};
use crate::ble::events::{Actions, EventCallbacks, LinkAction, LinkEvent, LinkEventKind};
use crate::ble::gap_state::{GapState, TerminateHandshake};
use crate::config::{self, APP_RF_POWER};

/// Queue an action; callbacks never produce more than `MAX_ACTIONS`
fn push(actions: &mut Actions, action: LinkAction) {
    if actions.push(action).is_err() {
        warn!("EVENTS: Action list full, dropping {}", action);
    }
}

/// Connect: ask for a low-duty connection, mark the link as active
pub fn task_connect(event: &LinkEvent, state: &mut GapState, now: Instant, actions: &mut Actions) {
    let LinkEvent::Connect { handle, peer } = *event else {
        return;
    };
    info!("Connected, handle {}", handle);

    if let Err(e) = state.connections.add_connection(handle, peer) {
        warn!("Connection {} not tracked: {}", handle, e);
    }

    if config::request_big_latency() {
        let params = ConnectionParams::APP_REQUEST;
        if let Err(e) = state.connections.update_params(handle, params) {
            warn!("Connection {} params not recorded: {}", handle, e);
        }
        push(actions, LinkAction::RequestConnParams(params));
    }
    push(actions, LinkAction::SetTxPower(state.tx_power));

    state.mark_user_event(now);
    state.connected = true;
    state.conn_handle = handle;
    state.interval_update = Some(now);
}

/// Terminate: drop the link, note why, restart the advertising clock
pub fn task_terminate(event: &LinkEvent, state: &mut GapState, now: Instant, _actions: &mut Actions) {
    let LinkEvent::Terminate { handle, reason } = *event else {
        return;
    };
    state.set_connected(false);
    if let Err(e) = state.connections.remove_connection(handle, reason) {
        warn!("Terminated connection {} was not tracked: {}", handle, e);
    }
    state.last_terminate = Some(reason);

    match reason {
        TerminateReason::ConnectionTimeout => info!("Disconnected: supervision timeout"),
        TerminateReason::RemoteUserTerminated => info!("Disconnected by peer"),
        TerminateReason::MicFailure => warn!("Disconnected: MIC failure"),
        TerminateReason::LocalHostTerminated => info!("Disconnected locally"),
        TerminateReason::Other(code) => info!("Disconnected, reason 0x{:02x}", code),
    }

    if cfg!(feature = "pm") && state.terminate_handshake == TerminateHandshake::Queued {
        state.terminate_handshake = TerminateHandshake::Sent;
    }

    state.restart_advertising_clock(now);
}

/// Suspend exit: the radio loses its power setting while suspended
pub fn user_set_rf_power(_event: &LinkEvent, state: &mut GapState, _now: Instant, actions: &mut Actions) {
    state.tx_power = APP_RF_POWER;
    push(actions, LinkAction::SetTxPower(APP_RF_POWER));
}

/// Advertising duration timeout: no directed advertising is used, nothing to switch
pub fn switch_to_indirect_adv(_event: &LinkEvent, _state: &mut GapState, _now: Instant, _actions: &mut Actions) {
    debug!("Advertising window elapsed");
}

/// Install the application callbacks
pub fn register_all(callbacks: &mut EventCallbacks) {
    callbacks.register(LinkEventKind::SuspendExit, user_set_rf_power);
    callbacks.register(LinkEventKind::Connect, task_connect);
    callbacks.register(LinkEventKind::Terminate, task_terminate);
    callbacks.register(LinkEventKind::AdvDurationTimeout, switch_to_indirect_adv);
}
