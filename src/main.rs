#![no_std]
#![no_main]

use defmt::*;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_nrf::{config::Config, interrupt};
use embassy_time::{Instant, Timer};
use nrf_softdevice::Softdevice;
use panic_probe as _;
use vhid_remote_firmware::ble::advertising::{self, advertising_task};
use vhid_remote_firmware::ble::events::EventCallbacks;
use vhid_remote_firmware::ble::services::Server;
use vhid_remote_firmware::ble::{gap_state, handlers, stack};
use vhid_remote_firmware::config::{self, AddressMode, LINK_BUFFERS, MAIN_LOOP_PERIOD};
use vhid_remote_firmware::power::{self, PowerAction, PowerPolicy};

/// Main loop iterations between heartbeat logs (10s)
const HEARTBEAT_EVERY: u32 = 100;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting VHID remote firmware");

    // Configure nRF peripherals
    let mut nrf_config = Config::default();
    // Configure interrupt priorities to avoid SoftDevice reserved levels (0, 1, 4)
    nrf_config.gpiote_interrupt_priority = interrupt::Priority::P2;
    nrf_config.time_interrupt_priority = interrupt::Priority::P2;
    let _peripherals = embassy_nrf::init(nrf_config);

    info!(
        "Link buffers: RX {}x{}, TX {}x{} ({} bytes), ATT MTU {}",
        LINK_BUFFERS.rx_size,
        LINK_BUFFERS.rx_count,
        LINK_BUFFERS.tx_size,
        LINK_BUFFERS.tx_count,
        LINK_BUFFERS.footprint(),
        LINK_BUFFERS.att_mtu()
    );
    let sd_config = unwrap!(stack::softdevice_config(&LINK_BUFFERS));
    let sd = Softdevice::enable(&sd_config);
    info!("SoftDevice enabled");

    let server = Server::new(sd).unwrap_or_else(|_| {
        defmt::panic!("Failed to initialize GATT server");
    });
    if let Err(e) = server.init_values() {
        warn!("GATT initial values not set: {:?}", Debug2Format(&e));
    }
    let sd: &'static Softdevice = sd;

    let mode = config::address_mode();
    let address = unwrap!(stack::configure_gap(sd, mode));
    info!("Security level: {}", config::security_level());

    gap_state::init(Instant::now()).await;
    {
        let mut state = gap_state::gap_state().lock().await;
        state.device_addr = address.bytes();
        state.addr_type = match mode {
            AddressMode::Public => 0,
            AddressMode::RandomStatic => 1,
        };
    }

    let mut callbacks = EventCallbacks::new();
    handlers::register_all(&mut callbacks);

    // Spawn SoftDevice task (CRITICAL!)
    unwrap!(spawner.spawn(softdevice_task(sd)));
    unwrap!(spawner.spawn(advertising_task(sd, server, callbacks)));

    info!("System initialized, entering main loop");

    let policy = PowerPolicy::default();
    match config::wake_button() {
        Some(pin) => info!("Idle power-down enabled, wake button P0.{}", pin),
        None => info!("No wake button, idle power-down disabled"),
    }
    let mut iterations: u32 = 0;
    loop {
        Timer::after(MAIN_LOOP_PERIOD).await;

        let action = {
            let mut state = gap_state::gap_state().lock().await;
            gap_state::absorb_user_activity(&mut state);
            power::pm_proc(&policy, &mut state, Instant::now())
        };

        match action {
            PowerAction::Stay => {}
            PowerAction::Disconnect => advertising::request_disconnect(),
            PowerAction::SystemOff => {
                // The policy only powers down when a wake button exists
                if let Some(pin) = config::wake_button() {
                    let e = stack::system_off(pin);
                    error!("System OFF failed: {:?}", e);
                }
                let mut state = gap_state::gap_state().lock().await;
                power::power_down_failed(&mut state, Instant::now());
            }
        }

        iterations = iterations.wrapping_add(1);
        if iterations % HEARTBEAT_EVERY == 0 {
            let state = gap_state::gap_state().lock().await;
            info!(
                "Heartbeat - connected: {}, adv: {}, tx power: {} dBm",
                state.is_connected(),
                state.adv_state,
                state.tx_power.dbm()
            );
        }
    }
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}
