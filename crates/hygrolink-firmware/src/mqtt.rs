//! MQTT session transport over embassy-net
//!
//! [`MqttConnector`] implements the core [`Connector`]: starting a session
//! hands the broker endpoint to the [`run_client`] task and returns an
//! [`MqttTransport`] whose `publish` only queues into [`OUTBOX`].
//!
//! The client task owns the TCP socket and the MQTT client. It connects, then
//! waits on the outbox and the broker at the same time: queued messages are
//! published as they arrive, and polling the broker answers its traffic and
//! sends keep-alive pings. On any failure it reports the loss and reconnects
//! after a back-off, for as long as the device runs. All of this is reported
//! on [`SESSION_EVENTS`].

use embassy_futures::select::{Either, select};
use embassy_net::Stack;
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use hygrolink_core::config::BrokerConfig;
use hygrolink_core::limits::{CLIENT_ID_CAPACITY, HOST_CAPACITY, TOPIC_CAPACITY};
use hygrolink_core::session::{Connector, QoS, SessionEvent, Transport};
use log::{debug, info, warn};
use myrtio_mqtt::client::{MqttClient, MqttOptions};
use myrtio_mqtt::error::MqttError;
use myrtio_mqtt::packet::QoS as MqttQoS;
use myrtio_mqtt::transport::TcpTransport;
use thiserror_no_std::Error;

pub const SESSION_EVENT_CAPACITY: usize = 8;
pub const OUTBOX_CAPACITY: usize = 4;

pub const PAYLOAD_CAPACITY: usize = 16;

const SOCKET_BUFFER_SIZE: usize = 1024;
const MQTT_BUFFER_SIZE: usize = 512;

const SOCKET_TIMEOUT: Duration = Duration::from_secs(30);
/// Added to the keep-alive to get the socket read timeout, so an idle
/// connection sends its ping before a read gives up.
const READ_TIMEOUT_MARGIN: Duration = Duration::from_secs(30);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

pub static SESSION_EVENTS: Channel<CriticalSectionRawMutex, SessionEvent, SESSION_EVENT_CAPACITY> =
    Channel::new();

pub static OUTBOX: Channel<CriticalSectionRawMutex, OutboundMessage, OUTBOX_CAPACITY> =
    Channel::new();

static START: Signal<CriticalSectionRawMutex, Endpoint> = Signal::new();

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("broker endpoint does not fit")]
    EndpointTooLong,
    #[error("topic does not fit")]
    TopicTooLong,
    #[error("payload does not fit")]
    PayloadTooLong,
    #[error("outbound queue is full")]
    QueueFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientError {
    Resolve,
    Connect,
    Handshake,
    Publish,
    ConnectionLost,
}

impl ClientError {
    const fn describe(self) -> &'static str {
        match self {
            Self::Resolve => "broker name lookup failed",
            Self::Connect => "tcp connect failed",
            Self::Handshake => "mqtt connect failed",
            Self::Publish => "publish failed",
            Self::ConnectionLost => "connection lost",
        }
    }
}

/// Owned copy of the broker settings, handed to the client task.
#[derive(Debug, Clone)]
struct Endpoint {
    host: heapless::String<HOST_CAPACITY>,
    port: u16,
    client_id: heapless::String<CLIENT_ID_CAPACITY>,
    keep_alive: Duration,
}

impl TryFrom<&BrokerConfig<'_>> for Endpoint {
    type Error = TransportError;

    fn try_from(broker: &BrokerConfig<'_>) -> Result<Self, Self::Error> {
        let mut host = heapless::String::new();
        host.push_str(broker.host)
            .map_err(|_| TransportError::EndpointTooLong)?;
        let mut client_id = heapless::String::new();
        client_id
            .push_str(broker.client_id)
            .map_err(|_| TransportError::EndpointTooLong)?;

        Ok(Self {
            host,
            port: broker.port,
            client_id,
            keep_alive: Duration::from_secs(broker.keep_alive_secs as u64),
        })
    }
}

/// A publish waiting for the client task.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    topic: heapless::String<TOPIC_CAPACITY>,
    payload: heapless::Vec<u8, PAYLOAD_CAPACITY>,
    qos: QoS,
    retain: bool,
}

pub struct MqttConnector;

impl Connector for MqttConnector {
    type Transport = MqttTransport;
    type Error = TransportError;

    fn start(&mut self, broker: &BrokerConfig<'_>) -> Result<MqttTransport, Self::Error> {
        START.signal(Endpoint::try_from(broker)?);
        Ok(MqttTransport)
    }
}

/// Queues publishes for [`run_client`].
pub struct MqttTransport;

impl Transport for MqttTransport {
    type Error = TransportError;

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), Self::Error> {
        let mut message = OutboundMessage {
            topic: heapless::String::new(),
            payload: heapless::Vec::new(),
            qos,
            retain,
        };
        message
            .topic
            .push_str(topic)
            .map_err(|_| TransportError::TopicTooLong)?;
        message
            .payload
            .extend_from_slice(payload)
            .map_err(|_| TransportError::PayloadTooLong)?;

        OUTBOX
            .try_send(message)
            .map_err(|_| TransportError::QueueFull)
    }
}

fn mqtt_qos(qos: QoS) -> MqttQoS {
    match qos {
        QoS::AtMostOnce => MqttQoS::AtMostOnce,
        QoS::AtLeastOnce => MqttQoS::AtLeastOnce,
        QoS::ExactlyOnce => {
            debug!("QoS 2 is not supported, publishing at QoS 1");
            MqttQoS::AtLeastOnce
        }
    }
}

/// Run the broker session once it has been started, reconnecting forever.
pub async fn run_client(stack: Stack<'static>) -> ! {
    let endpoint = START.wait().await;
    info!("Session transport running for {}:{}", endpoint.host, endpoint.port);

    let mut rx_buffer = [0u8; SOCKET_BUFFER_SIZE];
    let mut tx_buffer = [0u8; SOCKET_BUFFER_SIZE];

    loop {
        let mut connected = false;
        let result = serve(stack, &endpoint, &mut rx_buffer, &mut tx_buffer, &mut connected).await;

        if let Err(e) = result {
            warn!("Broker session ended: {}", e.describe());
            SESSION_EVENTS.send(SessionEvent::Error(e.describe())).await;
        }
        if connected {
            SESSION_EVENTS.send(SessionEvent::Disconnected).await;
        }

        Timer::after(RECONNECT_BACKOFF).await;
    }
}

type Client<'o, 's> = MqttClient<'o, TcpTransport<'s>, 1, MQTT_BUFFER_SIZE>;

async fn serve(
    stack: Stack<'static>,
    endpoint: &Endpoint,
    rx_buffer: &mut [u8],
    tx_buffer: &mut [u8],
    connected: &mut bool,
) -> Result<(), ClientError> {
    stack.wait_config_up().await;

    let address = stack
        .dns_query(&endpoint.host, DnsQueryType::A)
        .await
        .ok()
        .and_then(|addresses| addresses.first().copied())
        .ok_or(ClientError::Resolve)?;

    let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
    socket.set_timeout(Some(SOCKET_TIMEOUT));
    socket
        .connect((address, endpoint.port))
        .await
        .map_err(|_| ClientError::Connect)?;
    debug!("TCP connected to {}:{}", address, endpoint.port);

    let transport = TcpTransport::new(socket, endpoint.keep_alive + READ_TIMEOUT_MARGIN);
    let options = MqttOptions::new(&endpoint.client_id).with_keep_alive(endpoint.keep_alive);
    let mut client: Client<'_, '_> = MqttClient::new(transport, options);

    client.connect().await.map_err(|_| ClientError::Handshake)?;
    *connected = true;
    SESSION_EVENTS.send(SessionEvent::Connected).await;

    loop {
        let next = select(OUTBOX.receive(), poll_broker(&mut client)).await;
        match next {
            Either::First(message) => publish(&mut client, message).await?,
            Either::Second(polled) => polled?,
        }
    }
}

async fn publish(client: &mut Client<'_, '_>, message: OutboundMessage) -> Result<(), ClientError> {
    client
        .publish(&message.topic, &message.payload, mqtt_qos(message.qos))
        .await
        .map_err(|e| {
            debug!("Publish to {} failed: {:?}", message.topic, e);
            ClientError::Publish
        })?;

    if message.retain {
        debug!("Retain flag is not forwarded by this client");
    }
    if message.qos != QoS::AtMostOnce {
        // Completed QoS 1 publishes count as acknowledged.
        SESSION_EVENTS.send(SessionEvent::PublishAcked).await;
    }
    Ok(())
}

/// Wait for one packet from the broker, or send a ping when the keep-alive is due.
async fn poll_broker(client: &mut Client<'_, '_>) -> Result<(), ClientError> {
    match client.poll().await {
        Ok(_) => Ok(()),
        // The read timed out with nothing received; the connection is still up.
        Err(MqttError::Transport(MqttError::Timeout)) => Ok(()),
        Err(e) => {
            debug!("Broker poll failed: {:?}", e);
            Err(ClientError::ConnectionLost)
        }
    }
}
