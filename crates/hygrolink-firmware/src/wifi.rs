//! Wi-Fi station plumbing for the join manager
//!
//! The radio driver and the DHCP client run in their own tasks and report
//! what happens as [`NetEvent`]s on [`NET_EVENTS`]. The join manager asks for
//! (re)associations through [`JoinRequester`], which hands the request to the
//! radio task without waiting for the outcome.

use core::convert::Infallible;

use embassy_net::Stack;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Timer};
use esp_radio::wifi::{AuthMethod, ClientConfig, ModeConfig, WifiController, WifiError, WifiEvent};
use hygrolink_core::config::NetworkConfig;
use hygrolink_core::network::{NetEvent, Station};
use log::{debug, error, info, warn};

/// Network events waiting for the join manager.
pub const NET_EVENT_CAPACITY: usize = 8;

/// Delay before retrying a radio start that failed.
const RADIO_START_BACKOFF: Duration = Duration::from_secs(2);

pub static NET_EVENTS: Channel<CriticalSectionRawMutex, NetEvent, NET_EVENT_CAPACITY> =
    Channel::new();

// A single slot: a request that is already pending covers any new one.
static JOIN_REQUESTS: Channel<CriticalSectionRawMutex, (), 1> = Channel::new();

/// [`Station`] handle that forwards join requests to [`run_radio`].
pub struct JoinRequester;

impl Station for JoinRequester {
    type Error = Infallible;

    fn request_join(&mut self) -> Result<(), Self::Error> {
        if JOIN_REQUESTS.try_send(()).is_err() {
            debug!("Join request already pending");
        }
        Ok(())
    }
}

/// Apply station-mode credentials to the radio.
pub fn configure(
    controller: &mut WifiController<'static>,
    network: &NetworkConfig<'static>,
) -> Result<(), WifiError> {
    let auth_method = if network.is_open() {
        AuthMethod::None
    } else {
        AuthMethod::Wpa2Personal
    };

    let client = ClientConfig::default()
        .with_ssid(network.ssid.into())
        .with_password(network.password.into())
        .with_auth_method(auth_method);

    controller.set_config(&ModeConfig::Client(client))
}

/// Drive the radio: start it, then associate whenever a join is requested.
///
/// Every association that fails or later drops is reported as
/// [`NetEvent::StationDisconnected`].
pub async fn run_radio(mut controller: WifiController<'static>) -> ! {
    loop {
        if !matches!(controller.is_started(), Ok(true)) {
            info!("Starting Wi-Fi radio");
            if let Err(e) = controller.start_async().await {
                error!("Wi-Fi start failed: {:?}", e);
                Timer::after(RADIO_START_BACKOFF).await;
                continue;
            }
            NET_EVENTS.send(NetEvent::StationStarted).await;
        }

        JOIN_REQUESTS.receive().await;

        if matches!(controller.is_connected(), Ok(true)) {
            debug!("Join requested while already associated");
            continue;
        }

        match controller.connect_async().await {
            Ok(()) => {
                info!("Associated with access point");
                controller.wait_for_event(WifiEvent::StaDisconnected).await;
            }
            Err(e) => warn!("Association failed: {:?}", e),
        }

        NET_EVENTS.send(NetEvent::StationDisconnected).await;
    }
}

/// Report each DHCP lease as [`NetEvent::GotAddress`].
pub async fn watch_address(stack: Stack<'static>) -> ! {
    loop {
        stack.wait_config_up().await;

        match stack.config_v4() {
            Some(config) => {
                NET_EVENTS
                    .send(NetEvent::GotAddress(config.address.address()))
                    .await
            }
            None => warn!("Network configured without an IPv4 address"),
        }

        stack.wait_config_down().await;
        debug!("DHCP lease lost");
    }
}
