//! Common test utilities and setup for embedded tests
//!
//! Shared functionality for all defmt-test based tests:
//! - Global logger, panic handler and time driver
//! - Heap for proptest
//! - State builders

pub use defmt_rtt as _; // global logger
pub use embassy_executor as _;
// Use nrf-softdevice which provides both interrupt vectors and critical section
pub use nrf_softdevice as _;
pub use panic_probe as _; // panic handler
pub use {embassy_nrf as _, embassy_sync as _};

// Global allocator for proptest (required for alloc feature in no_std)
pub extern crate alloc;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_time::Instant;
pub use embedded_alloc::LlffHeap as Heap;
use vhid_remote_firmware::ble::events::EventCallbacks;
use vhid_remote_firmware::ble::gap_state::GapState;
use vhid_remote_firmware::ble::handlers;

#[global_allocator]
pub static HEAP: Heap = Heap::empty();

// Define the global allocator backing store - 8KB heap
pub static mut HEAP_MEM: [u8; 8192] = [0; 8192];

// Global flag to ensure heap is only initialized once
static HEAP_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Ensure heap is initialized exactly once
pub fn ensure_heap_initialized() {
    if !HEAP_INITIALIZED.swap(true, Ordering::Relaxed) {
        unsafe {
            let ptr = core::ptr::addr_of_mut!(HEAP_MEM) as *mut u8;
            HEAP.init(ptr as usize, 8192);
        }
    }
}

/// Instant at `ms` milliseconds after boot
pub fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

/// Fresh state with the advertising clock and user activity at `ms`
pub fn state_at(ms: u64) -> GapState {
    let mut state = GapState::default();
    state.restart_advertising_clock(at(ms));
    state.mark_user_event(at(ms));
    state
}

/// Callback registry with the application handlers installed
pub fn app_callbacks() -> EventCallbacks {
    let mut callbacks = EventCallbacks::new();
    handlers::register_all(&mut callbacks);
    callbacks
}
