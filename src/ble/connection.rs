//! Connection Management
//!
//! Bookkeeping for the single peripheral link: connection parameter
//! requests, disconnect reason classification and the connection table.

use defmt::{debug, error, Format};
use heapless::index_map::FnvIndexMap;
use nrf_softdevice::raw::ble_gap_conn_params_t;

/// Maximum number of simultaneous connections (one peripheral role)
pub const MAX_CONNECTIONS: usize = 1;

/// Connection handle value the stack uses for "no connection"
pub const INVALID_CONN_HANDLE: u16 = 0xFFFF;

/// Connection parameters
#[derive(Debug, Format, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Minimum connection interval (units of 1.25ms)
    pub min_conn_interval: u16,
    /// Maximum connection interval (units of 1.25ms)
    pub max_conn_interval: u16,
    /// Slave latency
    pub slave_latency: u16,
    /// Supervision timeout (units of 10ms)
    pub supervision_timeout: u16,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            min_conn_interval: 24, // 30ms
            max_conn_interval: 40, // 50ms
            slave_latency: 0,
            supervision_timeout: 400, // 4s
        }
    }
}

impl ConnectionParams {
    /// Parameters requested right after connecting: 10ms interval, 99 latency
    /// (one anchor point per second while idle), 4s supervision timeout
    pub const APP_REQUEST: ConnectionParams = ConnectionParams {
        min_conn_interval: 8,
        max_conn_interval: 8,
        slave_latency: 99,
        supervision_timeout: 400,
    };

    /// Check against the Core Specification ranges
    pub fn validate(&self) -> Result<(), ConnectionError> {
        let interval_ok = |i: u16| (6..=3200).contains(&i);
        if !interval_ok(self.min_conn_interval)
            || !interval_ok(self.max_conn_interval)
            || self.min_conn_interval > self.max_conn_interval
        {
            return Err(ConnectionError::InvalidParams);
        }
        if self.slave_latency > 499 || !(10..=3200).contains(&self.supervision_timeout) {
            return Err(ConnectionError::InvalidParams);
        }

        // timeout(10ms) > (1 + latency) * interval_max(1.25ms) * 2, in 0.25ms units
        let timeout_quarter_ms = self.supervision_timeout as u32 * 40;
        let latency_span = (1 + self.slave_latency as u32) * self.max_conn_interval as u32 * 5 * 2;
        if timeout_quarter_ms <= latency_span {
            return Err(ConnectionError::InvalidParams);
        }
        Ok(())
    }

    /// Longest gap between peripheral anchor points in milliseconds
    pub fn effective_interval_ms(&self) -> u32 {
        self.max_conn_interval as u32 * 5 / 4 * (1 + self.slave_latency as u32)
    }

    /// Supervision timeout in milliseconds
    pub fn supervision_timeout_ms(&self) -> u32 {
        self.supervision_timeout as u32 * 10
    }
}

impl From<ConnectionParams> for ble_gap_conn_params_t {
    fn from(p: ConnectionParams) -> Self {
        ble_gap_conn_params_t {
            min_conn_interval: p.min_conn_interval,
            max_conn_interval: p.max_conn_interval,
            slave_latency: p.slave_latency,
            conn_sup_timeout: p.supervision_timeout,
        }
    }
}

/// Why a connection ended
#[derive(Debug, Format, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    /// 0x08
    ConnectionTimeout,
    /// 0x13
    RemoteUserTerminated,
    /// 0x16
    LocalHostTerminated,
    /// 0x3D
    MicFailure,
    Other(u8),
}

impl From<u8> for TerminateReason {
    fn from(code: u8) -> Self {
        match code {
            0x08 => TerminateReason::ConnectionTimeout,
            0x13 => TerminateReason::RemoteUserTerminated,
            0x16 => TerminateReason::LocalHostTerminated,
            0x3D => TerminateReason::MicFailure,
            other => TerminateReason::Other(other),
        }
    }
}

impl From<TerminateReason> for u8 {
    fn from(reason: TerminateReason) -> Self {
        match reason {
            TerminateReason::ConnectionTimeout => 0x08,
            TerminateReason::RemoteUserTerminated => 0x13,
            TerminateReason::LocalHostTerminated => 0x16,
            TerminateReason::MicFailure => 0x3D,
            TerminateReason::Other(code) => code,
        }
    }
}

/// Connection information
#[derive(Debug, Format, Clone, Copy)]
pub struct ConnectionInfo {
    /// Connection handle
    pub handle: u16,
    /// Peer device address
    pub peer_addr: [u8; 6],
    /// Last parameters requested or accepted
    pub conn_params: ConnectionParams,
}

/// Connection management errors
#[derive(Format, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionError {
    ConnectionNotFound,
    ConnectionMapFull,
    InvalidHandle,
    InvalidParams,
}

/// Connection table
pub struct ConnectionManager {
    connections: FnvIndexMap<u16, ConnectionInfo, 2>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub const fn new() -> Self {
        Self {
            connections: FnvIndexMap::new(),
        }
    }

    /// Add a new connection
    pub fn add_connection(&mut self, handle: u16, peer_addr: [u8; 6]) -> Result<(), ConnectionError> {
        if handle == INVALID_CONN_HANDLE {
            error!("CONNECTION: Invalid connection handle {}", handle);
            return Err(ConnectionError::InvalidHandle);
        }
        if self.connections.len() >= MAX_CONNECTIONS && !self.connections.contains_key(&handle) {
            error!("CONNECTION: Failed to add connection {} - table full", handle);
            return Err(ConnectionError::ConnectionMapFull);
        }

        let conn_info = ConnectionInfo {
            handle,
            peer_addr,
            conn_params: ConnectionParams::default(),
        };
        if self.connections.insert(handle, conn_info).is_err() {
            return Err(ConnectionError::ConnectionMapFull);
        }

        debug!("CONNECTION: Added connection {}", handle);
        Ok(())
    }

    /// Remove a connection
    pub fn remove_connection(&mut self, handle: u16, reason: TerminateReason) -> Result<ConnectionInfo, ConnectionError> {
        match self.connections.remove(&handle) {
            Some(info) => {
                debug!("CONNECTION: Removed connection {} (reason: {})", handle, reason);
                Ok(info)
            }
            None => {
                error!("CONNECTION: Attempted to remove unknown connection {}", handle);
                Err(ConnectionError::ConnectionNotFound)
            }
        }
    }

    /// Record the parameters last requested for a connection
    pub fn update_params(&mut self, handle: u16, params: ConnectionParams) -> Result<(), ConnectionError> {
        params.validate()?;
        match self.connections.get_mut(&handle) {
            Some(conn) => {
                conn.conn_params = params;
                debug!("CONNECTION: Updated parameters for connection {}", handle);
                Ok(())
            }
            None => {
                error!("CONNECTION: Attempted to update params for unknown connection {}", handle);
                Err(ConnectionError::ConnectionNotFound)
            }
        }
    }

    /// Get connection info by handle
    pub fn get_connection(&self, handle: u16) -> Option<&ConnectionInfo> {
        self.connections.get(&handle)
    }

    /// The active connection, if any
    pub fn current(&self) -> Option<&ConnectionInfo> {
        self.connections.values().next()
    }

    /// Check if a connection exists
    pub fn is_connected(&self, handle: u16) -> bool {
        self.connections.contains_key(&handle)
    }

    /// Get the number of active connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
