//! SoftDevice bring-up and the raw calls the high-level API does not cover.

use core::mem;

use defmt::{info, Format};
use embassy_nrf::pac;
use embassy_nrf::pac::gpio::vals;
use nrf_softdevice::ble::{get_address, set_address, Address, AddressType};
use nrf_softdevice::{raw, RawError, Softdevice};

use crate::config::{AddressMode, ConfigError, LinkBuffers, RfPower, APPEARANCE, DEVICE_NAME};

/// Stack bring-up errors
#[derive(Debug, Clone, Copy, Format)]
pub enum StackError {
    Config(ConfigError),
    Raw(RawError),
}

impl From<ConfigError> for StackError {
    fn from(e: ConfigError) -> Self {
        StackError::Config(e)
    }
}

impl From<RawError> for StackError {
    fn from(e: RawError) -> Self {
        StackError::Raw(e)
    }
}

/// SoftDevice configuration for one peripheral link with the given buffers
pub fn softdevice_config(buffers: &LinkBuffers) -> Result<nrf_softdevice::Config, StackError> {
    buffers.validate()?;

    Ok(nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t {
            att_mtu: buffers.att_mtu(),
        }),
        conn_gatts: Some(raw::ble_gatts_conn_cfg_t {
            hvn_tx_queue_size: buffers.hvn_queue_size(),
        }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: DEVICE_NAME.as_ptr() as _,
            current_len: DEVICE_NAME.len() as u16,
            max_len: DEVICE_NAME.len() as u16,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(raw::BLE_GATTS_VLOC_STACK as u8),
        }),
        ..Default::default()
    })
}

/// Set the GAP appearance characteristic
pub fn set_appearance() -> Result<(), RawError> {
    let ret = unsafe { raw::sd_ble_gap_appearance_set(APPEARANCE) };
    RawError::convert(ret)
}

/// GAP identity: appearance and own address
pub fn configure_gap(sd: &Softdevice, mode: AddressMode) -> Result<Address, StackError> {
    set_appearance()?;
    Ok(init_address(sd, mode))
}

/// Own address bytes and type for the selected mode.
///
/// The factory address is random static (two top bits set). A public build
/// reuses the same 46 low bits with the marker bits cleared. That address is
/// not IEEE-assigned and may collide with a registered company's OUI, so
/// public mode is only for closed deployments; shipped products use
/// `addr-random-static` or a provisioned address.
pub fn derive_own_address(factory: [u8; 6], mode: AddressMode) -> ([u8; 6], AddressType) {
    let mut bytes = factory;
    match mode {
        AddressMode::Public => {
            bytes[5] &= 0x3F;
            (bytes, AddressType::Public)
        }
        AddressMode::RandomStatic => {
            bytes[5] |= 0xC0;
            (bytes, AddressType::RandomStatic)
        }
    }
}

/// Select and program the own address; returns it for the GAP state
pub fn init_address(sd: &Softdevice, mode: AddressMode) -> Address {
    let factory = get_address(sd).bytes();
    let (bytes, address_type) = derive_own_address(factory, mode);
    let address = Address::new(address_type, bytes);
    set_address(sd, &address);
    info!("Own address {:02x} ({})", bytes, mode);
    address
}

/// Apply TX power to an established connection
pub fn set_conn_tx_power(handle: u16, power: RfPower) -> Result<(), RawError> {
    let ret = unsafe {
        raw::sd_ble_gap_tx_power_set(
            raw::BLE_GAP_TX_POWER_ROLES_BLE_GAP_TX_POWER_ROLE_CONN as u8,
            handle,
            power.dbm(),
        )
    };
    RawError::convert(ret)
}

/// Arm a pulled-up, active-low button so pressing it wakes the chip from System OFF
pub fn arm_wake_button(pin: u8) {
    pac::P0.pin_cnf(pin as usize).write(|w| {
        w.set_dir(vals::Dir::INPUT);
        w.set_input(vals::Input::CONNECT);
        w.set_pull(vals::Pull::PULLUP);
        w.set_sense(vals::Sense::LOW);
    });
}

/// Arm the wake button and enter System OFF. Wake-up is a reset, so this
/// only returns on failure.
pub fn system_off(wake_pin: u8) -> RawError {
    arm_wake_button(wake_pin);
    info!("System OFF, wake on P0.{}", wake_pin);

    let ret = unsafe { raw::sd_power_system_off() };
    match RawError::convert(ret) {
        Err(e) => e,
        // sd_power_system_off does not return on success; in debug sessions it
        // is emulated, so park the core here.
        Ok(()) => loop {
            cortex_m::asm::wfe();
        },
    }
}
