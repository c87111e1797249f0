#![no_std]
#![no_main]

mod common;

use vhid_remote_firmware::ble::adv_data::{
    self, AdError, AdStructures, IBeacon, ADV_DATA, AD_TYPE_APPEARANCE, AD_TYPE_FLAGS, IBEACON_DATA,
    SCAN_RSP,
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
    fn test_static_payloads_are_well_formed() {
        assert_eq!(adv_data::validate(&ADV_DATA), Ok(()));
        assert_eq!(adv_data::validate(&SCAN_RSP), Ok(()));
        assert_eq!(adv_data::validate(&IBEACON_DATA), Ok(()));
        assert!(IBEACON_DATA.len() <= 31);
    }

    #[test]
    fn test_connectable_payload_contents() {
        assert_eq!(adv_data::local_name(&ADV_DATA), Some(&b"VHID"[..]));
        assert_eq!(adv_data::local_name(&SCAN_RSP), Some(&b"vSample"[..]));

        // Limited discoverable, BR/EDR not supported
        assert_eq!(adv_data::find(&ADV_DATA, AD_TYPE_FLAGS), Some(&[0x05u8][..]));
        // Generic Remote Control
        assert_eq!(adv_data::find(&ADV_DATA, AD_TYPE_APPEARANCE), Some(&[0x80u8, 0x01][..]));

        let services = adv_data::services_16(&ADV_DATA);
        assert_eq!(services.as_slice(), &[0x1812u16, 0x180F][..]);
    }

    #[test]
    fn test_structure_iteration() {
        let types: heapless::Vec<u8, 8> = AdStructures::new(&ADV_DATA).map(|(t, _)| t).collect();
        assert_eq!(types.as_slice(), &[0x09u8, 0x01, 0x19, 0x02][..]);

        // Iteration stops at padding
        let padded = [0x02, 0x01, 0x06, 0x00, 0x00];
        assert_eq!(AdStructures::new(&padded).count(), 1);
        assert_eq!(adv_data::validate(&padded), Ok(()));
    }

    #[test]
    fn test_malformed_payloads() {
        let truncated = [0x05, 0x09, b'a', b'b'];
        assert_eq!(adv_data::validate(&truncated), Err(AdError::Truncated));
        assert_eq!(AdStructures::new(&truncated).count(), 0);

        let garbage_after_end = [0x02, 0x01, 0x06, 0x00, 0x03];
        assert_eq!(adv_data::validate(&garbage_after_end), Err(AdError::EmptyStructure));

        let too_long = [0x01u8; 32];
        assert_eq!(adv_data::validate(&too_long), Err(AdError::TooLong));
    }

    #[test]
    fn test_default_beacon_matches_table() {
        let encoded = IBeacon::DEFAULT.encode();
        assert_eq!(encoded.as_slice(), &IBEACON_DATA[..]);

        let parsed = IBeacon::parse(&IBEACON_DATA).unwrap();
        assert_eq!(parsed, IBeacon::DEFAULT);
        assert_eq!(parsed.major, 0x0BB8);
        assert_eq!(parsed.minor, 0x0BBC);
        assert_eq!(parsed.measured_power, -60);
    }

    #[test]
    fn test_beacon_parse_rejects_other_payloads() {
        assert_eq!(IBeacon::parse(&ADV_DATA), Err(AdError::NotIBeacon));

        let mut wrong_company = IBEACON_DATA;
        wrong_company[5] = 0x59;
        assert_eq!(IBeacon::parse(&wrong_company), Err(AdError::NotIBeacon));
    }

    #[test]
    fn test_custom_beacon() {
        let beacon = IBeacon {
            uuid: [0xAA; 16],
            major: 1,
            minor: 0x0203,
            measured_power: -59,
        };
        let encoded = beacon.encode();
        assert_eq!(encoded.len(), 30);
        assert_eq!(&encoded[25..29], &[0x00u8, 0x01, 0x02, 0x03][..]);
        assert_eq!(encoded[29], 0xC5);
        assert_eq!(IBeacon::parse(&encoded), Ok(beacon));
    }
}
