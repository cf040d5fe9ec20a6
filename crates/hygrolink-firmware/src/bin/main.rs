#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use alloc::boxed::Box;
use embassy_executor::Spawner;
use embassy_net::{Runner, StackResources};
use embassy_time::{Duration, Instant, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::wifi::{WifiController, WifiDevice};
use hygrolink_core::network::{JoinManager, NetworkSignals, Readiness};
use hygrolink_core::sampling::{CancelToken, SamplingLoop};
use hygrolink_core::sensors::SHT40Sensor;
use hygrolink_core::session::{SessionError, SessionManager};
use hygrolink_firmware::config::CONFIG;
use hygrolink_firmware::mqtt::{self, MqttConnector, SESSION_EVENTS};
use hygrolink_firmware::wifi::{self, JoinRequester, NET_EVENTS};
use hygrolink_firmware::DeviceSession;
use log::{error, info};
use static_cell::StaticCell;

type SensorBus = I2c<'static, esp_hal::Async>;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static NETWORK: NetworkSignals = NetworkSignals::new();
static SAMPLING_CANCEL: CancelToken = CancelToken::new();

#[embassy_executor::task]
async fn net_runner_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn radio_task(controller: WifiController<'static>) -> ! {
    wifi::run_radio(controller).await
}

#[embassy_executor::task]
async fn address_task(stack: embassy_net::Stack<'static>) -> ! {
    wifi::watch_address(stack).await
}

#[embassy_executor::task]
async fn join_task(mut join: JoinManager<'static, JoinRequester>) -> ! {
    join.start();
    loop {
        let event = NET_EVENTS.receive().await;
        join.on_event(event);
    }
}

#[embassy_executor::task]
async fn mqtt_task(stack: embassy_net::Stack<'static>) -> ! {
    mqtt::run_client(stack).await
}

#[embassy_executor::task]
async fn session_task(session: &'static DeviceSession) -> ! {
    loop {
        let event = SESSION_EVENTS.receive().await;
        session.on_event(event);
    }
}

#[embassy_executor::task]
async fn sampling_task(sensor: SHT40Sensor<SensorBus>, session: &'static DeviceSession) {
    let mut sampling =
        SamplingLoop::new(sensor, session, CONFIG.topics).with_period(CONFIG.sample_period);
    sampling.run(&SAMPLING_CANCEL).await;
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    let radio_init = esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller");
    let radio_init: &'static _ = Box::leak(Box::new(radio_init));
    let (mut wifi_controller, interfaces) =
        esp_radio::wifi::new(radio_init, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");
    wifi::configure(&mut wifi_controller, &CONFIG.network)
        .expect("Failed to configure Wi-Fi station");

    // Seeds local port selection.
    let seed = Instant::now().as_ticks() ^ 0x5A17_2B34_D099_EE11;

    static NET_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );

    let sensor_bus = I2c::new(
        peripherals.I2C0,
        I2cConfig::default().with_frequency(Rate::from_khz(400)),
    )
    .expect("Failed to initialize I2C bus")
    .with_sda(peripherals.GPIO12)
    .with_scl(peripherals.GPIO11)
    .into_async();

    static SESSION: StaticCell<DeviceSession> = StaticCell::new();
    let session: &'static DeviceSession = SESSION.init(SessionManager::new(MqttConnector));

    let join = JoinManager::new(JoinRequester, &NETWORK);

    spawner.must_spawn(net_runner_task(runner));
    spawner.must_spawn(radio_task(wifi_controller));
    spawner.must_spawn(address_task(stack));
    spawner.must_spawn(join_task(join));
    spawner.must_spawn(mqtt_task(stack));
    spawner.must_spawn(session_task(session));
    spawner.must_spawn(sampling_task(SHT40Sensor::new(sensor_bus), session));

    info!("Waiting for network to join {}", CONFIG.network.ssid);

    match NETWORK.wait().await {
        Readiness::Ready(address) => {
            match CONFIG.broker.uri() {
                Ok(uri) => info!("Network ready at {}, starting broker session to {}", address, uri),
                Err(_) => info!("Network ready at {}, starting broker session", address),
            }
            match session.start(&CONFIG.broker) {
                Ok(()) => {}
                Err(SessionError::AlreadyStarted) => {
                    panic!("broker session started twice")
                }
                Err(e) => error!("Broker session not started: {}", e),
            }
        }
        Readiness::Failed => {
            error!(
                "Could not join {}; restart the device to retry",
                CONFIG.network.ssid
            )
        }
    }

    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}
