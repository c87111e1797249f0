#![no_std]
#![no_main]

mod common;

use embassy_time::Duration;
use vhid_remote_firmware::ble::connection::TerminateReason;
use vhid_remote_firmware::ble::events::LinkEvent;
use vhid_remote_firmware::ble::gap_state::{self, TerminateHandshake};
use vhid_remote_firmware::config;
use vhid_remote_firmware::power::{app_mask, pm_proc, power_down_failed, PowerAction, PowerPolicy, SuspendMask};

const PEER: [u8; 6] = [1, 2, 3, 4, 5, 6];

/// Policy of a build with a wake button
fn wake_button_policy() -> PowerPolicy {
    PowerPolicy {
        power_down: true,
        ..PowerPolicy::default()
    }
}

#[defmt_test::tests]
mod tests {
    use defmt::{assert, assert_eq};

    use super::*;
    use crate::common::*;

    #[init]
    fn init() {
        ensure_heap_initialized();
    }

    #[test]
    fn test_mask_bits() {
        assert_eq!(SuspendMask::SUSPEND_ADV.bits(), 0x01);
        assert_eq!(SuspendMask::SUSPEND_CONN.bits(), 0x02);
        assert_eq!(SuspendMask::DEEPSLEEP_RETENTION_ADV.bits(), 0x04);
        assert_eq!(SuspendMask::DEEPSLEEP_RETENTION_CONN.bits(), 0x08);

        let mut mask = SuspendMask::NONE;
        assert!(mask.is_empty());
        mask |= SuspendMask::SUSPEND_ADV;
        let mask = mask | SuspendMask::SUSPEND_CONN;
        assert!(mask.contains(SuspendMask::SUSPEND_ADV));
        assert!(!mask.contains(SuspendMask::DEEPSLEEP_RETENTION_ADV));
    }

    #[test]
    fn test_default_build_mask() {
        assert_eq!(app_mask().bits(), 0x0F);
    }

    #[test]
    fn test_default_build_keeps_advertising() {
        // No wake button: retention only means sleeping between radio events
        assert!(config::wake_button().is_none());
        let policy = PowerPolicy::default();
        assert!(!policy.power_down);

        let mut state = state_at(0);
        assert_eq!(pm_proc(&policy, &mut state, at(61_001)), PowerAction::Stay);
        assert_eq!(pm_proc(&policy, &mut state, at(3_600_000)), PowerAction::Stay);
    }

    #[test]
    fn test_default_build_never_drops_idle_connection() {
        let policy = PowerPolicy::default();
        let callbacks = app_callbacks();
        let mut state = state_at(0);
        callbacks.dispatch(&LinkEvent::Connect { handle: 0, peer: PEER }, &mut state, at(0));

        assert_eq!(pm_proc(&policy, &mut state, at(600_000)), PowerAction::Stay);
        assert_eq!(state.terminate_handshake, TerminateHandshake::Idle);
    }

    #[test]
    fn test_advertising_idle_with_wake_button() {
        let policy = wake_button_policy();
        let mut state = state_at(1_000);

        assert_eq!(pm_proc(&policy, &mut state, at(31_000)), PowerAction::Stay);
        assert_eq!(pm_proc(&policy, &mut state, at(61_000)), PowerAction::Stay);
        assert_eq!(pm_proc(&policy, &mut state, at(61_001)), PowerAction::SystemOff);

        // Terminate restarts the advertising clock
        state.restart_advertising_clock(at(61_001));
        assert_eq!(pm_proc(&policy, &mut state, at(90_000)), PowerAction::Stay);
    }

    #[test]
    fn test_suspend_only_mask_never_powers_down() {
        let policy = wake_button_policy();
        let state = state_at(0);
        let mask = SuspendMask::SUSPEND_ADV | SuspendMask::SUSPEND_CONN;
        assert_eq!(policy.evaluate(&state, at(600_000), mask), PowerAction::Stay);
        assert_eq!(policy.evaluate(&state, at(600_000), SuspendMask::NONE), PowerAction::Stay);
    }

    #[test]
    fn test_connection_idle_handshake() {
        let policy = wake_button_policy();
        let callbacks = app_callbacks();
        let mut state = state_at(0);
        callbacks.dispatch(&LinkEvent::Connect { handle: 0, peer: PEER }, &mut state, at(5_000));

        assert_eq!(pm_proc(&policy, &mut state, at(65_000)), PowerAction::Stay);
        assert_eq!(pm_proc(&policy, &mut state, at(65_100)), PowerAction::Disconnect);
        assert_eq!(state.terminate_handshake, TerminateHandshake::Queued);

        // Requested once, then wait for the terminate event
        assert_eq!(pm_proc(&policy, &mut state, at(65_200)), PowerAction::Stay);
        assert_eq!(pm_proc(&policy, &mut state, at(70_000)), PowerAction::Stay);

        callbacks.dispatch(
            &LinkEvent::Terminate { handle: 0, reason: TerminateReason::LocalHostTerminated },
            &mut state,
            at(70_050),
        );
        assert_eq!(state.terminate_handshake, TerminateHandshake::Sent);
        assert_eq!(pm_proc(&policy, &mut state, at(70_100)), PowerAction::SystemOff);
    }

    #[test]
    fn test_failed_power_down_backs_off() {
        let policy = wake_button_policy();
        let mut state = state_at(0);
        state.terminate_handshake = TerminateHandshake::Sent;
        assert_eq!(pm_proc(&policy, &mut state, at(70_000)), PowerAction::SystemOff);

        power_down_failed(&mut state, at(70_000));
        assert_eq!(state.terminate_handshake, TerminateHandshake::Idle);
        assert_eq!(state.advertise_begin, at(70_000));

        // No retry on the next loop, only after another idle period
        assert_eq!(pm_proc(&policy, &mut state, at(70_100)), PowerAction::Stay);
        assert_eq!(pm_proc(&policy, &mut state, at(130_000)), PowerAction::Stay);
        assert_eq!(pm_proc(&policy, &mut state, at(130_001)), PowerAction::SystemOff);
    }

    #[test]
    fn test_user_activity_defers_disconnect() {
        let policy = wake_button_policy();
        let callbacks = app_callbacks();
        let mut state = state_at(0);
        callbacks.dispatch(&LinkEvent::Connect { handle: 0, peer: PEER }, &mut state, at(0));

        gap_state::note_user_activity(at(50_000));
        gap_state::absorb_user_activity(&mut state);
        assert_eq!(state.latest_user_event, at(50_000));
        assert_eq!(pm_proc(&policy, &mut state, at(100_000)), PowerAction::Stay);
        assert_eq!(pm_proc(&policy, &mut state, at(110_001)), PowerAction::Disconnect);

        // Stale reports never move the clock back
        gap_state::note_user_activity(at(10));
        gap_state::absorb_user_activity(&mut state);
        assert_eq!(state.latest_user_event, at(50_000));
    }

    #[test]
    fn test_custom_policy() {
        let policy = PowerPolicy {
            adv_idle: Duration::from_secs(5),
            conn_idle: Duration::from_secs(5),
            power_down: true,
        };
        let state = state_at(0);
        assert_eq!(policy.evaluate(&state, at(5_001), app_mask()), PowerAction::SystemOff);
    }
}
