//! Host simulator for the hygrolink connectivity lifecycle.
//!
//! Runs the hygrolink-core join manager, session manager and sampling loop
//! against a scripted radio, a logging broker and a synthetic sensor, so the
//! whole flow can be watched without hardware.
//!
//! # Usage
//!
//! ```text
//! hygrolink-simulator [JOIN_FAILURES]
//! ```
//!
//! `JOIN_FAILURES` is the number of association attempts the simulated access
//! point rejects before handing out an address (default 3). Anything above the
//! retry ceiling ends in a failed join.

use std::cell::Cell;
use std::convert::Infallible;
use std::net::Ipv4Addr;

use embassy_futures::block_on;
use embassy_futures::join::join;
use embassy_time::{Duration, Timer};
use log::{error, info};

use hygrolink_core::config::{BrokerConfig, Config, MAX_RETRIES, NetworkConfig, TopicConfig};
use hygrolink_core::network::{JoinManager, JoinState, NetEvent, NetworkSignals, Readiness, Station};
use hygrolink_core::sampling::{CancelToken, SamplingLoop};
use hygrolink_core::sensors::{Sample, Sensor, SensorError};
use hygrolink_core::session::{Connector, QoS, SessionEvent, SessionManager, Transport};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

const CONFIG: Config<'static> = Config::new(
    NetworkConfig {
        ssid: "hygrolink-sim",
        password: "simulated",
    },
    BrokerConfig::new("test.mosquitto.org", "hygrolink-sim"),
    TopicConfig {
        temperature: "hygrolink/sensor/temperature",
        humidity: "hygrolink/sensor/humidity",
    },
)
.with_sample_period(Duration::from_secs(1));

/// Address the simulated DHCP server leases.
const SIM_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 23);

/// Association attempts rejected when no count is given.
const DEFAULT_JOIN_FAILURES: u32 = 3;

/// Simulated seconds that pass between two sensor reads.
const MOCK_SECONDS_PER_READ: f64 = 10.0;

/// Every n-th sensor read times out.
const MOCK_READ_FAILURE_EVERY: u32 = 7;

// ---------------------------------------------------------------------------
// Scripted radio
// ---------------------------------------------------------------------------

/// Stands in for the Wi-Fi driver. A join request is remembered until the
/// simulation loop takes it, and at most one is pending at a time.
#[derive(Default)]
struct SimRadio {
    pending: Cell<bool>,
    attempts: Cell<u32>,
}

impl SimRadio {
    /// Take the pending join request, counting it as an attempt.
    fn take_request(&self) -> Option<u32> {
        if !self.pending.replace(false) {
            return None;
        }
        let attempt = self.attempts.get() + 1;
        self.attempts.set(attempt);
        Some(attempt)
    }
}

impl Station for &SimRadio {
    type Error = Infallible;

    fn request_join(&mut self) -> Result<(), Self::Error> {
        self.pending.set(true);
        Ok(())
    }
}

/// Drive the join manager until the access point either leases an address or
/// the retry ceiling is exceeded.
fn join_network(signals: &NetworkSignals, join_failures: u32) {
    let radio = SimRadio::default();
    let mut join = JoinManager::new(&radio, signals);

    join.start();
    join.on_event(NetEvent::StationStarted);

    while let Some(attempt) = radio.take_request() {
        let event = if attempt <= join_failures {
            info!("[radio] attempt {} rejected by access point", attempt);
            NetEvent::StationDisconnected
        } else {
            info!("[radio] attempt {} associated", attempt);
            NetEvent::GotAddress(SIM_ADDRESS)
        };

        match join.on_event(event) {
            JoinState::Connected | JoinState::Failed => break,
            _ => {}
        }
    }

    info!(
        "Join finished in state {:?} after {} retries",
        join.state(),
        join.retry_count()
    );
}

// ---------------------------------------------------------------------------
// Logging broker
// ---------------------------------------------------------------------------

struct SimBroker;

impl Connector for SimBroker {
    type Transport = SimTransport;
    type Error = Infallible;

    fn start(&mut self, broker: &BrokerConfig<'_>) -> Result<SimTransport, Self::Error> {
        match broker.uri() {
            Ok(uri) => info!("[broker] session opened to {} as {}", uri, broker.client_id),
            Err(_) => info!(
                "[broker] session opened to {}:{} as {}",
                broker.host, broker.port, broker.client_id
            ),
        }
        Ok(SimTransport)
    }
}

struct SimTransport;

impl Transport for SimTransport {
    type Error = Infallible;

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), Self::Error> {
        info!(
            "[broker] {} <- {} (QoS {}, retain {})",
            topic,
            String::from_utf8_lossy(payload),
            qos.level(),
            retain
        );
        Ok(())
    }
}

type SimSession = SessionManager<SimBroker>;

/// Replays broker connection changes against the sampling period, then stops
/// sampling.
///
/// Ticks land on whole periods and script steps on half periods, so the first
/// tick is dropped before the broker connects and one tick is dropped while
/// the connection is down.
async fn broker_script(session: &SimSession, cancel: &CancelToken) {
    let half_period = CONFIG.sample_period / 2;

    Timer::after(half_period).await;
    session.on_event(SessionEvent::Connected);

    Timer::after(CONFIG.sample_period * 3).await;
    session.on_event(SessionEvent::Error("keep-alive timeout"));
    session.on_event(SessionEvent::Disconnected);

    Timer::after(CONFIG.sample_period * 2).await;
    session.on_event(SessionEvent::Connected);

    Timer::after(CONFIG.sample_period * 2).await;
    cancel.cancel();
}

// ---------------------------------------------------------------------------
// Mock sensor
// ---------------------------------------------------------------------------

/// Generates synthetic readings that vary over time.
struct MockSensor {
    /// Simulated seconds since the first read.
    elapsed_secs: f64,
    reads: u32,
}

impl MockSensor {
    fn new() -> Self {
        Self {
            elapsed_secs: 0.0,
            reads: 0,
        }
    }
}

impl Sensor for MockSensor {
    async fn read(&mut self) -> Result<Sample, SensorError> {
        self.reads += 1;
        if self.reads % MOCK_READ_FAILURE_EVERY == 0 {
            return Err(SensorError::Timeout {
                sensor: "mock",
                operation: "measure temperature/humidity",
            });
        }

        let t = self.elapsed_secs;
        self.elapsed_secs += MOCK_SECONDS_PER_READ;

        // Temperature: 20–26 °C sinusoidal with slow drift
        let temperature = 23.0 + 3.0 * (t / 120.0).sin() + 0.5 * (t / 37.0).cos();

        // Humidity: 40–60 % with different period
        let humidity = 50.0 + 10.0 * (t / 180.0).sin() + 2.0 * (t / 23.0).cos();

        Ok(Sample::new(
            temperature.round() as i32,
            humidity.round() as i32,
        ))
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let join_failures = match std::env::args().nth(1) {
        None => DEFAULT_JOIN_FAILURES,
        Some(arg) => match arg.parse() {
            Ok(count) => count,
            Err(e) => {
                error!("Invalid JOIN_FAILURES {:?}: {}", arg, e);
                std::process::exit(2);
            }
        },
    };

    info!("Starting hygrolink simulator");
    info!(
        "Joining {} with {} rejected attempts (retry ceiling {})",
        CONFIG.network.ssid, join_failures, MAX_RETRIES
    );

    let signals = NetworkSignals::new();
    join_network(&signals, join_failures);

    match block_on(signals.wait()) {
        Readiness::Ready(address) => info!("Network ready at {}", address),
        Readiness::Failed => {
            error!("Network join failed; nothing will be published");
            return;
        }
    }

    let session = SessionManager::new(SimBroker);
    if let Err(e) = session.start(&CONFIG.broker) {
        error!("Could not start broker session: {}", e);
        return;
    }

    let cancel = CancelToken::new();
    let mut sampling = SamplingLoop::new(MockSensor::new(), &session, CONFIG.topics)
        .with_period(CONFIG.sample_period);

    block_on(join(sampling.run(&cancel), broker_script(&session, &cancel)));

    info!("Session stats: {:?}", session.stats());
    info!("Simulator exiting");
}
