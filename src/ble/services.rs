//! GATT Server
//!
//! Battery service plus a HID-over-GATT service carrying a consumer-control
//! report, matching the services listed in the advertising data.

use defmt::{debug, info};
use embassy_time::Instant;
use nrf_softdevice::ble::gatt_server::SetValueError;

use crate::ble::gap_state;

/// bcdHID 1.11, country 0, flags: normally connectable
pub const HID_INFO: [u8; 4] = [0x11, 0x01, 0x00, 0x02];

/// Consumer control, one 16-bit usage per input report
#[rustfmt::skip]
pub const REPORT_MAP: [u8; 23] = [
    0x05, 0x0C,         // Usage Page (Consumer)
    0x09, 0x01,         // Usage (Consumer Control)
    0xA1, 0x01,         // Collection (Application)
    0x15, 0x00,         //   Logical Minimum (0)
    0x26, 0xFF, 0x03,   //   Logical Maximum (1023)
    0x19, 0x00,         //   Usage Minimum (0)
    0x2A, 0xFF, 0x03,   //   Usage Maximum (1023)
    0x75, 0x10,         //   Report Size (16)
    0x95, 0x01,         //   Report Count (1)
    0x81, 0x00,         //   Input (Data, Array)
    0xC0,               // End Collection
];

/// Protocol mode: report protocol
pub const PROTOCOL_MODE_REPORT: u8 = 0x01;

/// HID control point commands
pub const HID_CONTROL_SUSPEND: u8 = 0x00;
pub const HID_CONTROL_EXIT_SUSPEND: u8 = 0x01;

#[nrf_softdevice::gatt_service(uuid = "180f")]
pub struct BatteryService {
    #[characteristic(uuid = "2a19", read, notify)]
    pub battery_level: u8,
}

#[nrf_softdevice::gatt_service(uuid = "1812")]
pub struct HidService {
    #[characteristic(uuid = "2a4a", read)]
    pub hid_info: [u8; 4],
    #[characteristic(uuid = "2a4b", read)]
    pub report_map: [u8; 23],
    #[characteristic(uuid = "2a4e", read, write_without_response)]
    pub protocol_mode: u8,
    #[characteristic(uuid = "2a4c", write_without_response)]
    pub control_point: u8,
    #[characteristic(uuid = "2a4d", read, notify)]
    pub input_report: [u8; 2],
}

#[nrf_softdevice::gatt_server]
pub struct Server {
    pub bas: BatteryService,
    pub hid: HidService,
}

impl Server {
    /// Load the static attribute values
    pub fn init_values(&self) -> Result<(), SetValueError> {
        self.bas.battery_level_set(&100)?;
        self.hid.hid_info_set(&HID_INFO)?;
        self.hid.report_map_set(&REPORT_MAP)?;
        self.hid.protocol_mode_set(&PROTOCOL_MODE_REPORT)?;
        self.hid.input_report_set(&[0, 0])?;
        Ok(())
    }

    /// Handle a GATT event; any host write counts as user activity
    pub fn handle_event(&self, event: ServerEvent) {
        gap_state::note_user_activity(Instant::now());

        match event {
            ServerEvent::Bas(BatteryServiceEvent::BatteryLevelCccdWrite { notifications }) => {
                debug!("Battery notifications: {}", notifications);
            }
            ServerEvent::Hid(HidServiceEvent::ProtocolModeWrite(mode)) => {
                debug!("HID protocol mode {}", mode);
            }
            ServerEvent::Hid(HidServiceEvent::ControlPointWrite(cmd)) => match cmd {
                HID_CONTROL_SUSPEND => info!("HID host suspended"),
                HID_CONTROL_EXIT_SUSPEND => info!("HID host resumed"),
                other => debug!("HID control point 0x{:02x}", other),
            },
            ServerEvent::Hid(HidServiceEvent::InputReportCccdWrite { notifications }) => {
                info!("Input report notifications: {}", notifications);
            }
        }
    }
}
