//! BLE Application Layer
//!
//! Everything between the SoftDevice and the application: advertising
//! payloads and scheduling, link event callbacks, connection bookkeeping
//! and the GATT server.

pub mod adv_data;
pub mod advertising;
pub mod connection;
pub mod events;
pub mod gap_state;
pub mod handlers;
pub mod services;
pub mod stack;
