//! Application Configuration
//!
//! Compile-time settings for the remote-control peripheral: advertising
//! timing, RF power, idle timeouts and the link buffer geometry the
//! SoftDevice configuration is derived from. Behavioural switches live in
//! cargo features (`pm`, `deep-retention`, `ui-button`, `addr-random-static`).

use defmt::Format;
use embassy_time::Duration;
use nrf_softdevice::ble::TxPower;

/// Radio TX power levels supported by the nRF52820 radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
#[repr(i8)]
pub enum RfPower {
    Minus40 = -40,
    Minus20 = -20,
    Minus16 = -16,
    Minus12 = -12,
    Minus8 = -8,
    Minus4 = -4,
    Zero = 0,
    Plus2 = 2,
    Plus3 = 3,
    Plus4 = 4,
    Plus5 = 5,
    Plus6 = 6,
    Plus7 = 7,
    Plus8 = 8,
}

impl RfPower {
    /// Output power in dBm
    pub const fn dbm(self) -> i8 {
        self as i8
    }

    /// Advertising-config representation
    pub const fn tx_power(self) -> TxPower {
        match self {
            RfPower::Minus40 => TxPower::Minus40dBm,
            RfPower::Minus20 => TxPower::Minus20dBm,
            RfPower::Minus16 => TxPower::Minus16dBm,
            RfPower::Minus12 => TxPower::Minus12dBm,
            RfPower::Minus8 => TxPower::Minus8dBm,
            RfPower::Minus4 => TxPower::Minus4dBm,
            RfPower::Zero => TxPower::ZerodBm,
            RfPower::Plus2 => TxPower::Plus2dBm,
            RfPower::Plus3 => TxPower::Plus3dBm,
            RfPower::Plus4 => TxPower::Plus4dBm,
            RfPower::Plus5 => TxPower::Plus5dBm,
            RfPower::Plus6 => TxPower::Plus6dBm,
            RfPower::Plus7 => TxPower::Plus7dBm,
            RfPower::Plus8 => TxPower::Plus8dBm,
        }
    }
}

/// Own address selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum AddressMode {
    Public,
    RandomStatic,
}

/// Security level requested from the host stack (no pairing handler is installed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum SecurityLevel {
    NoSecurity,
}

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum ConfigError {
    FifoCountNotPowerOfTwo,
    FifoSizeNotAligned,
    FifoSizeTooSmall,
}

/// Link-layer RX/TX buffer geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct LinkBuffers {
    pub rx_size: u16,
    pub rx_count: u8,
    pub tx_size: u16,
    pub tx_count: u8,
}

/// Per-entry overhead of a TX FIFO slot: DMA length word, LL header and MIC
pub const FIFO_ENTRY_OVERHEAD: u16 = 13;

/// L2CAP basic header (length + channel id)
pub const L2CAP_HEADER_LEN: u16 = 4;

/// Smallest ATT MTU the Core Specification allows
pub const MIN_ATT_MTU: u16 = 23;

impl LinkBuffers {
    /// Check the geometry is usable by the link layer
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if !self.rx_count.is_power_of_two() || !self.tx_count.is_power_of_two() {
            return Err(ConfigError::FifoCountNotPowerOfTwo);
        }
        // RX entries are 16-byte aligned, TX entries only word aligned
        if self.rx_size % 16 != 0 || self.tx_size % 4 != 0 {
            return Err(ConfigError::FifoSizeNotAligned);
        }
        if self.rx_size < 32 || self.tx_size < 32 {
            return Err(ConfigError::FifoSizeTooSmall);
        }
        Ok(())
    }

    /// ATT MTU a single TX entry can carry without fragmentation
    pub const fn att_mtu(&self) -> u16 {
        let ll_payload = self.tx_size.saturating_sub(FIFO_ENTRY_OVERHEAD);
        let mtu = ll_payload.saturating_sub(L2CAP_HEADER_LEN);
        if mtu < MIN_ATT_MTU {
            MIN_ATT_MTU
        } else {
            mtu
        }
    }

    /// Depth of the handle-value notification queue
    pub const fn hvn_queue_size(&self) -> u8 {
        self.tx_count
    }

    /// Total bytes reserved for both FIFOs
    pub const fn footprint(&self) -> usize {
        self.rx_size as usize * self.rx_count as usize + self.tx_size as usize * self.tx_count as usize
    }
}

pub const LINK_BUFFERS: LinkBuffers = LinkBuffers {
    rx_size: 64,
    rx_count: 8,
    tx_size: 40,
    tx_count: 16,
};

/// Device name used for the GAP device name characteristic
pub const DEVICE_NAME: &str = "VHID";

/// GAP appearance: Generic Remote Control
pub const APPEARANCE: u16 = 0x0180;

/// Number of logical advertising sets
pub const APP_ADV_SETS_NUMBER: usize = 2;

/// Maximum advertising data length for legacy advertising
pub const APP_MAX_LENGTH_ADV_DATA: usize = 31;

/// Maximum scan response data length for legacy advertising
pub const APP_MAX_LENGTH_SCAN_RESPONSE_DATA: usize = 31;

/// Connectable set interval, 0.625ms units (50ms)
pub const ADV_INTERVAL_CONNECTABLE: u32 = 80;

/// Beacon set interval, 0.625ms units (1s)
pub const ADV_INTERVAL_BEACON: u32 = 1600;

/// Radio TX power for advertising and connections, restored after every radio resume
pub const APP_RF_POWER: RfPower = RfPower::Plus3;

/// Advertising without a connection for this long powers down (wake button builds)
pub const ADV_IDLE_ENTER_DEEP: Duration = Duration::from_secs(60);

/// Connected without user activity for this long powers down (wake button builds)
pub const CONN_IDLE_ENTER_DEEP: Duration = Duration::from_secs(60);

/// P0 pin of the remote's button, active low. Wakes the chip from System OFF.
pub const WAKE_BUTTON_PIN: u8 = 11;

/// Main loop period
pub const MAIN_LOOP_PERIOD: Duration = Duration::from_millis(100);

/// Own address selection for this build
pub const fn address_mode() -> AddressMode {
    if cfg!(feature = "addr-random-static") {
        AddressMode::RandomStatic
    } else {
        AddressMode::Public
    }
}

/// Pin that can wake the chip from System OFF, if the build has a button
pub const fn wake_button() -> Option<u8> {
    if cfg!(feature = "ui-button") {
        Some(WAKE_BUTTON_PIN)
    } else {
        None
    }
}

/// Whether the connect callback asks the central for a high slave latency
pub const fn request_big_latency() -> bool {
    !cfg!(feature = "ui-button")
}

/// Security level for this build (pairing is not enabled)
pub const fn security_level() -> SecurityLevel {
    SecurityLevel::NoSecurity
}
