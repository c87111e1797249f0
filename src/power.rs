//! Power Management
//!
//! The CPU sleeps between radio events whenever the executor is idle, with
//! RAM retained and the RTC waking it for the next event. The suspend mask
//! says which link states allow that; `DEEPSLEEP_RETENTION_*` additionally
//! allow leaving the air altogether, which only happens on builds with a wake
//! button ([`config::wake_button`]):
//!
//! - advertising for longer than [`ADV_IDLE_ENTER_DEEP`] without a central
//!   showing up;
//! - connected without user activity for longer than
//!   [`CONN_IDLE_ENTER_DEEP`], in which case the link is terminated first
//!   and System OFF follows once the terminate event has been seen.
//!
//! Without a wake button the device advertises indefinitely.

use core::ops::{BitOr, BitOrAssign};

use defmt::{debug, info, warn, Format};
use embassy_time::Instant;

use crate::ble::gap_state::{GapState, TerminateHandshake};
use crate::config::{self, ADV_IDLE_ENTER_DEEP, CONN_IDLE_ENTER_DEEP};

/// States in which the device may enter low power
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct SuspendMask(u8);

impl SuspendMask {
    pub const NONE: SuspendMask = SuspendMask(0);
    pub const SUSPEND_ADV: SuspendMask = SuspendMask(1 << 0);
    pub const SUSPEND_CONN: SuspendMask = SuspendMask(1 << 1);
    pub const DEEPSLEEP_RETENTION_ADV: SuspendMask = SuspendMask(1 << 2);
    pub const DEEPSLEEP_RETENTION_CONN: SuspendMask = SuspendMask(1 << 3);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: SuspendMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: SuspendMask) -> SuspendMask {
        SuspendMask(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for SuspendMask {
    type Output = SuspendMask;

    fn bitor(self, rhs: SuspendMask) -> SuspendMask {
        self.union(rhs)
    }
}

impl BitOrAssign for SuspendMask {
    fn bitor_assign(&mut self, rhs: SuspendMask) {
        *self = self.union(rhs);
    }
}

/// Suspend mask for this build
pub const fn app_mask() -> SuspendMask {
    if !cfg!(feature = "pm") {
        SuspendMask::NONE
    } else if cfg!(feature = "deep-retention") {
        SuspendMask::SUSPEND_ADV
            .union(SuspendMask::DEEPSLEEP_RETENTION_ADV)
            .union(SuspendMask::SUSPEND_CONN)
            .union(SuspendMask::DEEPSLEEP_RETENTION_CONN)
    } else {
        SuspendMask::SUSPEND_ADV.union(SuspendMask::SUSPEND_CONN)
    }
}

/// What the main loop should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum PowerAction {
    Stay,
    /// Terminate the connection, deep sleep follows the terminate event
    Disconnect,
    /// Power the system down, the wake button resets it
    SystemOff,
}

/// Idle timeouts
#[derive(Debug, Clone, Copy, Format)]
pub struct PowerPolicy {
    pub adv_idle: embassy_time::Duration,
    pub conn_idle: embassy_time::Duration,
    /// Idle power-down allowed; only true when a wake source exists
    pub power_down: bool,
}

impl Default for PowerPolicy {
    fn default() -> Self {
        Self {
            adv_idle: ADV_IDLE_ENTER_DEEP,
            conn_idle: CONN_IDLE_ENTER_DEEP,
            power_down: config::wake_button().is_some(),
        }
    }
}

impl PowerPolicy {
    /// Decide based on the current link state. Pure; see [`pm_proc`] for the
    /// state update that goes with `Disconnect`.
    pub fn evaluate(&self, state: &GapState, now: Instant, mask: SuspendMask) -> PowerAction {
        if !self.power_down {
            return PowerAction::Stay;
        }

        if state.terminate_handshake == TerminateHandshake::Sent {
            return PowerAction::SystemOff;
        }

        if state.is_connected() {
            let idle = now.saturating_duration_since(state.latest_user_event);
            if state.terminate_handshake == TerminateHandshake::Idle
                && mask.contains(SuspendMask::DEEPSLEEP_RETENTION_CONN)
                && idle > self.conn_idle
            {
                return PowerAction::Disconnect;
            }
            return PowerAction::Stay;
        }

        let advertising_for = now.saturating_duration_since(state.advertise_begin);
        if mask.contains(SuspendMask::DEEPSLEEP_RETENTION_ADV) && advertising_for > self.adv_idle {
            return PowerAction::SystemOff;
        }
        PowerAction::Stay
    }
}

/// One power-management step, run from the main loop.
///
/// Moves the terminate handshake to `Queued` when asking for a disconnect so
/// the request is made only once.
pub fn pm_proc(policy: &PowerPolicy, state: &mut GapState, now: Instant) -> PowerAction {
    let mask = app_mask();
    if mask.is_empty() {
        return PowerAction::Stay;
    }

    let action = policy.evaluate(state, now, mask);
    match action {
        PowerAction::Disconnect => {
            info!("PM: Connection idle, terminating before deep sleep");
            state.terminate_handshake = TerminateHandshake::Queued;
        }
        PowerAction::SystemOff => {
            info!("PM: Powering down (handshake {})", state.terminate_handshake);
        }
        PowerAction::Stay => {}
    }
    if action != PowerAction::Stay {
        debug!("PM: mask 0x{:02x}", mask.bits());
    }
    action
}

/// System OFF was refused: start over so the next attempt waits a full idle
/// period instead of retrying every loop.
pub fn power_down_failed(state: &mut GapState, now: Instant) {
    warn!("PM: Power down failed, staying on");
    state.terminate_handshake = TerminateHandshake::Idle;
    state.restart_advertising_clock(now);
    state.mark_user_event(now);
}
