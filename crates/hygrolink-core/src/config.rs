//! Static device configuration
//!
//! Credentials, broker address and topic names are fixed at build time. The
//! structs borrow their strings so firmware can build them from `env!`
//! constants without allocating.

use core::fmt::Write;

use embassy_time::Duration;

use crate::sensors::SensorType;
use crate::session::QoS;

/// Number of join retries before the network join is declared failed.
pub const MAX_RETRIES: u8 = 10;

/// Period between two sampling ticks.
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(10);

/// Default plain-text MQTT port.
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Keep-alive interval requested from the broker.
pub const DEFAULT_KEEP_ALIVE_SECS: u16 = 60;

/// Delivery level requested for every sensor reading.
pub const PUBLISH_QOS: QoS = QoS::AtLeastOnce;

/// Readings are never retained by the broker.
pub const PUBLISH_RETAIN: bool = false;

/// Capacity of a rendered broker URI (`mqtt://host:port`).
pub const BROKER_URI_CAPACITY: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config<'a> {
    pub network: NetworkConfig<'a>,
    pub broker: BrokerConfig<'a>,
    pub topics: TopicConfig<'a>,
    pub sample_period: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

impl NetworkConfig<'_> {
    /// An empty password means an open network.
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    pub keep_alive_secs: u16,
}

impl<'a> BrokerConfig<'a> {
    pub const fn new(host: &'a str, client_id: &'a str) -> Self {
        Self {
            host,
            port: DEFAULT_BROKER_PORT,
            client_id,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
        }
    }

    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Render the broker address as `mqtt://host:port`.
    ///
    /// Fails only if the host name does not fit into [`BROKER_URI_CAPACITY`].
    pub fn uri(&self) -> Result<heapless::String<BROKER_URI_CAPACITY>, core::fmt::Error> {
        let mut uri = heapless::String::new();
        write!(uri, "mqtt://{}:{}", self.host, self.port)?;
        Ok(uri)
    }
}

/// The two data streams a sample is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicConfig<'a> {
    pub temperature: &'a str,
    pub humidity: &'a str,
}

impl<'a> TopicConfig<'a> {
    pub const fn for_sensor(&self, sensor: SensorType) -> &'a str {
        match sensor {
            SensorType::Temperature => self.temperature,
            SensorType::Humidity => self.humidity,
        }
    }
}

impl<'a> Config<'a> {
    pub const fn new(
        network: NetworkConfig<'a>,
        broker: BrokerConfig<'a>,
        topics: TopicConfig<'a>,
    ) -> Self {
        Self {
            network,
            broker,
            topics,
            sample_period: SAMPLE_PERIOD,
        }
    }

    pub const fn with_sample_period(mut self, sample_period: Duration) -> Self {
        self.sample_period = sample_period;
        self
    }
}
