//! Advertising Payloads
//!
//! Raw AD-structure tables for both advertising sets, plus the small amount
//! of tooling needed to check and inspect them. Every structure is
//! `[len][type][data; len - 1]` and a legacy payload holds at most 31 bytes.

use defmt::Format;
use heapless::Vec;

use crate::config::APP_MAX_LENGTH_ADV_DATA;

/// AD type: Flags
pub const AD_TYPE_FLAGS: u8 = 0x01;
/// AD type: Incomplete List of 16-bit Service UUIDs
pub const AD_TYPE_SERVICES_16_INCOMPLETE: u8 = 0x02;
/// AD type: Complete List of 16-bit Service UUIDs
pub const AD_TYPE_SERVICES_16_COMPLETE: u8 = 0x03;
/// AD type: Shortened Local Name
pub const AD_TYPE_SHORT_NAME: u8 = 0x08;
/// AD type: Complete Local Name
pub const AD_TYPE_COMPLETE_NAME: u8 = 0x09;
/// AD type: Appearance
pub const AD_TYPE_APPEARANCE: u8 = 0x19;
/// AD type: Manufacturer Specific Data
pub const AD_TYPE_MANUFACTURER: u8 = 0xFF;

/// Flags: LE Limited Discoverable Mode
pub const FLAG_LE_LIMITED_DISC: u8 = 0x01;
/// Flags: LE General Discoverable Mode
pub const FLAG_LE_GENERAL_DISC: u8 = 0x02;
/// Flags: BR/EDR Not Supported
pub const FLAG_BR_EDR_NOT_SUPPORTED: u8 = 0x04;

/// Connectable set advertising data
#[rustfmt::skip]
pub static ADV_DATA: [u8; 19] = [
    0x05, AD_TYPE_COMPLETE_NAME, b'V', b'H', b'I', b'D',
    0x02, AD_TYPE_FLAGS, FLAG_LE_LIMITED_DISC | FLAG_BR_EDR_NOT_SUPPORTED,
    0x03, AD_TYPE_APPEARANCE, 0x80, 0x01,                     // 0x0180, Generic Remote Control
    0x05, AD_TYPE_SERVICES_16_INCOMPLETE, 0x12, 0x18, 0x0F, 0x18, // HID, Battery
];

/// Connectable set scan response
#[rustfmt::skip]
pub static SCAN_RSP: [u8; 9] = [
    0x08, AD_TYPE_COMPLETE_NAME, b'v', b'S', b'a', b'm', b'p', b'l', b'e',
];

/// Beacon set advertising data
#[rustfmt::skip]
pub static IBEACON_DATA: [u8; 30] = [
    0x02, AD_TYPE_FLAGS, FLAG_LE_GENERAL_DISC | FLAG_BR_EDR_NOT_SUPPORTED,
    0x1A, AD_TYPE_MANUFACTURER,
    0x4C, 0x00,                                               // Apple company id
    0x02, 0x15,                                               // iBeacon type and length
    0x4F, 0x03, 0x58, 0xE0, 0x2E, 0xE7, 0x11, 0xE4,
    0x8C, 0x21, 0x08, 0x00, 0x20, 0x0C, 0x9A, 0x66,
    0x0B, 0xB8,                                               // major
    0x0B, 0xBC,                                               // minor
    0xC4,                                                     // measured power, -60dBm
];

/// Advertising payload errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum AdError {
    /// Payload exceeds the legacy 31 byte limit
    TooLong,
    /// A structure's length runs past the end of the payload
    Truncated,
    /// A zero-length structure appears before the end of significant data
    EmptyStructure,
    /// Not an iBeacon manufacturer record
    NotIBeacon,
}

/// Iterator over `(ad_type, data)` pairs of a payload.
///
/// Stops at the first malformed structure; use [`validate`] to tell a
/// clean end from a truncated one.
pub struct AdStructures<'a> {
    payload: &'a [u8],
    pos: usize,
}

impl<'a> AdStructures<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self { payload, pos: 0 }
    }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let len = *self.payload.get(self.pos)? as usize;
        if len == 0 {
            return None;
        }
        let start = self.pos + 1;
        let end = start + len;
        if end > self.payload.len() {
            return None;
        }
        self.pos = end;
        Some((self.payload[start], &self.payload[start + 1..end]))
    }
}

/// Check a legacy advertising or scan response payload.
///
/// A zero length byte ends the significant part; everything after it must be
/// zero padding.
pub fn validate(payload: &[u8]) -> Result<(), AdError> {
    if payload.len() > APP_MAX_LENGTH_ADV_DATA {
        return Err(AdError::TooLong);
    }

    let mut pos = 0;
    while pos < payload.len() {
        let len = payload[pos] as usize;
        if len == 0 {
            return if payload[pos..].iter().all(|&b| b == 0) {
                Ok(())
            } else {
                Err(AdError::EmptyStructure)
            };
        }
        if pos + 1 + len > payload.len() {
            return Err(AdError::Truncated);
        }
        pos += 1 + len;
    }
    Ok(())
}

/// Data of the first structure with the given type
pub fn find(payload: &[u8], ad_type: u8) -> Option<&[u8]> {
    AdStructures::new(payload).find(|(t, _)| *t == ad_type).map(|(_, d)| d)
}

/// Complete or shortened local name, whichever comes first
pub fn local_name(payload: &[u8]) -> Option<&[u8]> {
    AdStructures::new(payload)
        .find(|(t, _)| *t == AD_TYPE_COMPLETE_NAME || *t == AD_TYPE_SHORT_NAME)
        .map(|(_, d)| d)
}

/// 16-bit service UUIDs listed in the payload (complete or incomplete lists)
pub fn services_16(payload: &[u8]) -> Vec<u16, 14> {
    let mut out = Vec::new();
    for (t, data) in AdStructures::new(payload) {
        if t != AD_TYPE_SERVICES_16_INCOMPLETE && t != AD_TYPE_SERVICES_16_COMPLETE {
            continue;
        }
        for chunk in data.chunks_exact(2) {
            if out.push(u16::from_le_bytes([chunk[0], chunk[1]])).is_err() {
                return out;
            }
        }
    }
    out
}

/// Apple company identifier
pub const APPLE_COMPANY_ID: u16 = 0x004C;

/// Apple iBeacon proximity record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct IBeacon {
    pub uuid: [u8; 16],
    pub major: u16,
    pub minor: u16,
    /// Calibrated RSSI at 1 m, dBm
    pub measured_power: i8,
}

impl IBeacon {
    /// Beacon identity broadcast by the second advertising set
    pub const DEFAULT: IBeacon = IBeacon {
        uuid: [
            0x4F, 0x03, 0x58, 0xE0, 0x2E, 0xE7, 0x11, 0xE4, 0x8C, 0x21, 0x08, 0x00, 0x20, 0x0C, 0x9A, 0x66,
        ],
        major: 3000,
        minor: 3004,
        measured_power: -60,
    };

    /// Full advertising payload: flags + manufacturer record
    pub fn encode(&self) -> Vec<u8, APP_MAX_LENGTH_ADV_DATA> {
        let mut buf = Vec::new();
        // 30 bytes always fit in 31
        let _ = buf.extend_from_slice(&[0x02, AD_TYPE_FLAGS, FLAG_LE_GENERAL_DISC | FLAG_BR_EDR_NOT_SUPPORTED]);
        let _ = buf.extend_from_slice(&[0x1A, AD_TYPE_MANUFACTURER]);
        let _ = buf.extend_from_slice(&APPLE_COMPANY_ID.to_le_bytes());
        let _ = buf.extend_from_slice(&[0x02, 0x15]);
        let _ = buf.extend_from_slice(&self.uuid);
        let _ = buf.extend_from_slice(&self.major.to_be_bytes());
        let _ = buf.extend_from_slice(&self.minor.to_be_bytes());
        let _ = buf.push(self.measured_power as u8);
        buf
    }

    /// Extract the beacon record from an advertising payload
    pub fn parse(payload: &[u8]) -> Result<Self, AdError> {
        validate(payload)?;
        let data = find(payload, AD_TYPE_MANUFACTURER).ok_or(AdError::NotIBeacon)?;
        if data.len() != 25 || data[..4] != [0x4C, 0x00, 0x02, 0x15] {
            return Err(AdError::NotIBeacon);
        }

        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&data[4..20]);
        Ok(Self {
            uuid,
            major: u16::from_be_bytes([data[20], data[21]]),
            minor: u16::from_be_bytes([data[22], data[23]]),
            measured_power: data[24] as i8,
        })
    }
}
