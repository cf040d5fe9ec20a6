//! Broker session ownership
//!
//! [`SessionManager`] owns the single upstream session. It creates the
//! transport once the network is ready, mirrors the transport's connection
//! notifications into a [`SessionState`], and hands the producer a
//! [`Publish`] capability that forwards while connected and drops otherwise.
//!
//! Reconnecting is the transport's job. The manager never retries on its own.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::config::{BrokerConfig, PUBLISH_QOS, PUBLISH_RETAIN};

/// MQTT delivery guarantee requested for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    pub const fn level(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

/// Notifications from the session transport, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    PublishAcked,
    Error(&'static str),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// `start` was called while a session already exists.
    #[error("session already started")]
    AlreadyStarted,
    #[error("failed to start session transport")]
    Connect,
}

/// What happened to a single publish request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the transport.
    Forwarded,
    /// No session was connected; the payload is lost.
    Dropped,
    /// The transport refused the request; the payload is lost.
    Rejected,
}

/// A started connection to the broker.
///
/// `publish` queues the message and returns without waiting for the broker.
pub trait Transport {
    type Error: core::fmt::Debug;

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), Self::Error>;
}

/// Creates and starts a [`Transport`] for a broker.
pub trait Connector {
    type Transport: Transport;
    type Error: core::fmt::Debug;

    fn start(&mut self, broker: &BrokerConfig<'_>) -> Result<Self::Transport, Self::Error>;
}

/// Fire-and-forget publishing, as seen by the producer.
pub trait Publish {
    fn publish(&self, topic: &str, payload: &[u8]) -> PublishOutcome;
}

impl<P: Publish + ?Sized> Publish for &P {
    fn publish(&self, topic: &str, payload: &[u8]) -> PublishOutcome {
        (**self).publish(topic, payload)
    }
}

/// Diagnostic counters kept by the session manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub forwarded: u32,
    pub dropped: u32,
    pub rejected: u32,
    pub acknowledged: u32,
    pub errors: u32,
    pub connects: u32,
    pub disconnects: u32,
}

// The connector and the transport are lent out of `Inner` while they run, so
// no lock is held across a call into either of them.
struct Inner<C: Connector> {
    /// `None` while a start is in progress.
    connector: Option<C>,
    /// `None` before start, and while a publish is using it.
    transport: Option<C::Transport>,
    started: bool,
    state: SessionState,
    stats: SessionStats,
}

pub struct SessionManager<C: Connector> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Inner<C>>>,
}

impl<C: Connector> SessionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                connector: Some(connector),
                transport: None,
                started: false,
                state: SessionState::Disconnected,
                stats: SessionStats::default(),
            })),
        }
    }

    /// Create and start the transport for `broker`.
    ///
    /// Only one session may ever exist. A second call, or a call made while
    /// the first is still starting, returns [`SessionError::AlreadyStarted`]
    /// and leaves the first session alone.
    pub fn start(&self, broker: &BrokerConfig<'_>) -> Result<(), SessionError> {
        let connector = self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            if inner.started {
                None
            } else {
                inner.connector.take()
            }
        });
        let Some(mut connector) = connector else {
            error!("Session start requested while a session already exists");
            return Err(SessionError::AlreadyStarted);
        };

        let result = connector.start(broker);

        let result = self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            inner.connector = Some(connector);
            result.map(|transport| {
                inner.transport = Some(transport);
                inner.started = true;
            })
        });

        match result {
            Ok(()) => {
                info!("Session transport started for {}:{}", broker.host, broker.port);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start session transport: {:?}", e);
                Err(SessionError::Connect)
            }
        }
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock(|inner| inner.borrow().started)
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock(|inner| inner.borrow().state)
    }

    pub fn stats(&self) -> SessionStats {
        self.inner.lock(|inner| inner.borrow().stats)
    }

    /// Apply one transport notification and return the resulting state.
    pub fn on_event(&self, event: SessionEvent) -> SessionState {
        let (state, started) = self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            match event {
                SessionEvent::Connected => {
                    inner.state = SessionState::Connected;
                    inner.stats.connects += 1;
                }
                SessionEvent::Disconnected => {
                    inner.state = SessionState::Disconnected;
                    inner.stats.disconnects += 1;
                }
                SessionEvent::PublishAcked => inner.stats.acknowledged += 1,
                SessionEvent::Error(_) => inner.stats.errors += 1,
            }
            (inner.state, inner.started)
        });

        match event {
            SessionEvent::Connected => {
                if !started {
                    warn!("Broker connected before the session was started");
                }
                info!("Connected to broker");
            }
            SessionEvent::Disconnected => info!("Disconnected from broker"),
            SessionEvent::PublishAcked => debug!("Publish acknowledged"),
            SessionEvent::Error(details) => warn!("Session transport error: {}", details),
        }

        state
    }
}

impl<C: Connector> Publish for SessionManager<C> {
    fn publish(&self, topic: &str, payload: &[u8]) -> PublishOutcome {
        let lent = self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            let transport = match inner.state {
                SessionState::Connected => inner.transport.take(),
                SessionState::Disconnected => None,
            };
            if transport.is_none() {
                inner.stats.dropped += 1;
            }
            transport
        });

        let Some(mut transport) = lent else {
            debug!("No broker session, dropping publish to {}", topic);
            return PublishOutcome::Dropped;
        };

        let result = transport.publish(topic, payload, PUBLISH_QOS, PUBLISH_RETAIN);
        let forwarded = result.is_ok();

        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            inner.transport = Some(transport);
            if forwarded {
                inner.stats.forwarded += 1;
            } else {
                inner.stats.rejected += 1;
            }
        });

        match result {
            Ok(()) => PublishOutcome::Forwarded,
            Err(e) => {
                warn!("Transport refused publish to {}: {:?}", topic, e);
                PublishOutcome::Rejected
            }
        }
    }
}
