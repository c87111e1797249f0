#![no_std]

//! VHID remote-control peripheral firmware library
//!
//! BLE peripheral glue on top of the S140 SoftDevice, organized as:
//!
//! - `config`: compile-time application settings
//! - `ble`: advertising, link event callbacks, connection state, GATT server
//! - `power`: suspend mask and idle deep-sleep policy

pub mod ble;
pub mod config;
pub mod power;
