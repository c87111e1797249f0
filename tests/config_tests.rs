#![no_std]
#![no_main]

mod common;

use nrf_softdevice::ble::AddressType;
use vhid_remote_firmware::ble::stack;
use vhid_remote_firmware::config::{
    self, AddressMode, ConfigError, LinkBuffers, RfPower, ADV_INTERVAL_BEACON, ADV_INTERVAL_CONNECTABLE, LINK_BUFFERS,
};

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
    fn test_app_link_buffers() {
        assert_eq!(LINK_BUFFERS.validate(), Ok(()));
        // 40 byte TX entries carry a 27 byte LL payload, ATT MTU 23
        assert_eq!(LINK_BUFFERS.att_mtu(), 23);
        assert_eq!(LINK_BUFFERS.hvn_queue_size(), 16);
        assert_eq!(LINK_BUFFERS.footprint(), 64 * 8 + 40 * 16);
    }

    #[test]
    fn test_link_buffer_validation() {
        let odd_count = LinkBuffers { rx_count: 6, ..LINK_BUFFERS };
        assert_eq!(odd_count.validate(), Err(ConfigError::FifoCountNotPowerOfTwo));

        let unaligned = LinkBuffers { tx_size: 42, ..LINK_BUFFERS };
        assert_eq!(unaligned.validate(), Err(ConfigError::FifoSizeNotAligned));

        let tiny = LinkBuffers { rx_size: 16, ..LINK_BUFFERS };
        assert_eq!(tiny.validate(), Err(ConfigError::FifoSizeTooSmall));
    }

    #[test]
    fn test_att_mtu_scales_with_tx_entries() {
        let big = LinkBuffers { tx_size: 272, ..LINK_BUFFERS };
        assert_eq!(big.att_mtu(), 255);

        let small = LinkBuffers { tx_size: 32, ..LINK_BUFFERS };
        assert_eq!(small.att_mtu(), 23);
    }

    #[test]
    fn test_rf_power_levels() {
        assert_eq!(RfPower::Plus3.dbm(), 3);
        assert_eq!(RfPower::Plus8.dbm(), 8);
        assert_eq!(RfPower::Minus40.dbm(), -40);
    }

    #[test]
    fn test_advertising_intervals() {
        // 0.625ms units: 50ms and 1s
        assert_eq!(ADV_INTERVAL_CONNECTABLE * 625, 50_000);
        assert_eq!(ADV_INTERVAL_BEACON * 625, 1_000_000);
    }

    #[test]
    fn test_softdevice_config_from_buffers() {
        let cfg = stack::softdevice_config(&LINK_BUFFERS).unwrap();
        assert_eq!(cfg.conn_gatt.map(|c| c.att_mtu), Some(23));
        assert_eq!(cfg.conn_gatts.map(|c| c.hvn_tx_queue_size), Some(16));
        assert_eq!(cfg.conn_gap.map(|c| c.conn_count), Some(1));

        let bad = LinkBuffers { tx_count: 3, ..LINK_BUFFERS };
        assert!(stack::softdevice_config(&bad).is_err());
    }

    #[test]
    fn test_own_address_derivation() {
        let factory = [0x11, 0x22, 0x33, 0x44, 0x55, 0xE6];

        let (public, ty) = stack::derive_own_address(factory, AddressMode::Public);
        assert_eq!(public, [0x11, 0x22, 0x33, 0x44, 0x55, 0x26]);
        assert!(matches!(ty, AddressType::Public));

        let (random, ty) = stack::derive_own_address([0x11, 0x22, 0x33, 0x44, 0x55, 0x26], AddressMode::RandomStatic);
        assert_eq!(random[5] & 0xC0, 0xC0);
        assert_eq!(&random[..5], &factory[..5]);
        assert!(matches!(ty, AddressType::RandomStatic));
    }

    #[test]
    fn test_address_mode_follows_build_feature() {
        // Only builds with a registered company identifier keep the public address
        if cfg!(feature = "addr-random-static") {
            assert_eq!(config::address_mode(), AddressMode::RandomStatic);
        } else {
            assert_eq!(config::address_mode(), AddressMode::Public);
        }
    }
}
