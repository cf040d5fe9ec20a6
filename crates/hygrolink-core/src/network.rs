//! Wireless network join state machine
//!
//! [`JoinManager`] attaches the station to the configured access point and
//! retries dropped or failed associations up to a fixed ceiling. It talks to
//! the radio only through the [`Station`] trait and reports the outcome
//! through [`NetworkSignals`]:
//!
//! - `ready` is raised with the leased address on the first successful join
//! - `failed` is raised once the retry ceiling is exceeded
//!
//! Both are one-shot. A later link drop and rejoin never re-raises `ready`,
//! and `Failed` is terminal until the device restarts.

use core::net::Ipv4Addr;

use embassy_futures::select::{Either, select};
use log::{debug, error, info, warn};

use crate::config::MAX_RETRIES;
use crate::signal::OneShot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    Idle,
    Connecting,
    Connected,
    Failed,
}

/// Notifications from the network stack, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetEvent {
    /// The radio finished starting in station mode.
    StationStarted,
    /// The association was lost or a join attempt failed.
    StationDisconnected,
    /// DHCP handed out an address.
    GotAddress(Ipv4Addr),
}

/// Final outcome of the initial network join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready(Ipv4Addr),
    Failed,
}

/// Driver side of the station: issues a join without waiting for its result.
///
/// The outcome arrives later as a [`NetEvent`].
pub trait Station {
    type Error: core::fmt::Debug;

    fn request_join(&mut self) -> Result<(), Self::Error>;
}

/// The two one-shot signals a [`JoinManager`] raises.
pub struct NetworkSignals {
    ready: OneShot<Ipv4Addr>,
    failed: OneShot<()>,
}

impl NetworkSignals {
    pub const fn new() -> Self {
        Self {
            ready: OneShot::new(),
            failed: OneShot::new(),
        }
    }

    /// Address of the first successful join, once it happened.
    pub fn ready(&self) -> Option<Ipv4Addr> {
        self.ready.get()
    }

    pub fn has_failed(&self) -> bool {
        self.failed.is_raised()
    }

    /// Wait for whichever of `ready` or `failed` is raised first.
    ///
    /// `ready` wins if both are already set.
    pub async fn wait(&self) -> Readiness {
        match select(self.ready.wait(), self.failed.wait()).await {
            Either::First(address) => Readiness::Ready(address),
            Either::Second(()) => Readiness::Failed,
        }
    }
}

impl Default for NetworkSignals {
    fn default() -> Self {
        Self::new()
    }
}

pub struct JoinManager<'a, S> {
    station: S,
    state: JoinState,
    retry_count: u8,
    max_retries: u8,
    signals: &'a NetworkSignals,
}

impl<'a, S: Station> JoinManager<'a, S> {
    pub fn new(station: S, signals: &'a NetworkSignals) -> Self {
        Self {
            station,
            state: JoinState::Idle,
            retry_count: 0,
            max_retries: MAX_RETRIES,
            signals,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u8) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }

    /// Begin joining. Only the first call has an effect.
    pub fn start(&mut self) {
        if self.state != JoinState::Idle {
            warn!("Join manager already started (state {:?})", self.state);
            return;
        }

        info!("Joining wireless network");
        self.state = JoinState::Connecting;
        self.request_join();
    }

    /// Feed one network event into the state machine and return the new state.
    pub fn on_event(&mut self, event: NetEvent) -> JoinState {
        match (self.state, event) {
            (JoinState::Failed, _) => {
                debug!("Ignoring {:?}: network join has failed", event);
            }
            (JoinState::Idle, _) => {
                warn!("Ignoring {:?}: join manager not started", event);
            }
            (_, NetEvent::StationStarted) => {
                debug!("Station started");
                self.request_join();
            }
            (_, NetEvent::StationDisconnected) => self.on_disconnected(),
            (_, NetEvent::GotAddress(address)) => self.on_address(address),
        }

        self.state
    }

    fn on_disconnected(&mut self) {
        if self.state == JoinState::Connected {
            warn!("Lost connection to access point");
            self.state = JoinState::Connecting;
        }

        if self.retry_count < self.max_retries {
            self.retry_count += 1;
            info!(
                "Retrying access point connection ({}/{})",
                self.retry_count, self.max_retries
            );
            self.request_join();
        } else {
            error!(
                "Failed to connect to access point after {} retries",
                self.retry_count
            );
            self.state = JoinState::Failed;
            self.signals.failed.raise(());
        }
    }

    fn on_address(&mut self, address: Ipv4Addr) {
        self.retry_count = 0;

        if self.state == JoinState::Connected {
            debug!("Address {} reported again", address);
            return;
        }

        self.state = JoinState::Connected;
        info!("Connected, got address {}", address);

        if self.signals.ready.raise(address) {
            info!("Network ready");
        }
    }

    fn request_join(&mut self) {
        if let Err(e) = self.station.request_join() {
            // The driver reports the failed attempt as a disconnect, which is
            // where it gets counted.
            warn!("Join request rejected: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    const ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 42);

    #[derive(Default)]
    struct FakeStation {
        requests: usize,
        reject: bool,
    }

    impl Station for &mut FakeStation {
        type Error = &'static str;

        fn request_join(&mut self) -> Result<(), Self::Error> {
            self.requests += 1;
            if self.reject { Err("radio busy") } else { Ok(()) }
        }
    }

    #[test]
    fn test_start_issues_join() {
        let signals = NetworkSignals::new();
        let mut station = FakeStation::default();
        let mut manager = JoinManager::new(&mut station, &signals);

        assert_eq!(manager.state(), JoinState::Idle);
        manager.start();
        assert_eq!(manager.state(), JoinState::Connecting);
        assert_eq!(manager.retry_count(), 0);

        // Second start is ignored.
        manager.start();
        drop(manager);
        assert_eq!(station.requests, 1);
    }

    #[test]
    fn test_station_started_issues_join() {
        let signals = NetworkSignals::new();
        let mut station = FakeStation::default();
        let mut manager = JoinManager::new(&mut station, &signals);

        manager.start();
        assert_eq!(manager.on_event(NetEvent::StationStarted), JoinState::Connecting);
        assert_eq!(manager.retry_count(), 0);
        drop(manager);
        assert_eq!(station.requests, 2);
    }

    #[test]
    fn test_disconnects_below_ceiling_keep_connecting() {
        let signals = NetworkSignals::new();
        let mut station = FakeStation::default();
        let mut manager = JoinManager::new(&mut station, &signals);
        manager.start();

        for attempt in 1..=MAX_RETRIES {
            let state = manager.on_event(NetEvent::StationDisconnected);
            assert_eq!(state, JoinState::Connecting);
            assert_eq!(manager.retry_count(), attempt);
            assert!(!signals.has_failed());
        }

        drop(manager);
        assert_eq!(station.requests, 1 + MAX_RETRIES as usize);
    }

    #[test]
    fn test_disconnect_past_ceiling_fails_once() {
        let signals = NetworkSignals::new();
        let mut station = FakeStation::default();
        let mut manager = JoinManager::new(&mut station, &signals);
        manager.start();

        for _ in 0..MAX_RETRIES {
            manager.on_event(NetEvent::StationDisconnected);
        }
        assert_eq!(manager.on_event(NetEvent::StationDisconnected), JoinState::Failed);
        assert!(signals.has_failed());

        // Further events past the ceiling change nothing.
        assert_eq!(manager.on_event(NetEvent::StationDisconnected), JoinState::Failed);
        assert_eq!(manager.on_event(NetEvent::StationStarted), JoinState::Failed);
        assert_eq!(manager.on_event(NetEvent::GotAddress(ADDRESS)), JoinState::Failed);
        assert_eq!(manager.retry_count(), MAX_RETRIES);
        assert_eq!(signals.ready(), None);

        drop(manager);
        assert_eq!(station.requests, 1 + MAX_RETRIES as usize);
        assert_eq!(block_on(signals.wait()), Readiness::Failed);
    }

    #[test]
    fn test_got_address_resets_and_signals_once() {
        let signals = NetworkSignals::new();
        let mut station = FakeStation::default();
        let mut manager = JoinManager::new(&mut station, &signals);
        manager.start();

        manager.on_event(NetEvent::StationDisconnected);
        manager.on_event(NetEvent::StationDisconnected);
        assert_eq!(manager.retry_count(), 2);

        assert_eq!(manager.on_event(NetEvent::GotAddress(ADDRESS)), JoinState::Connected);
        assert_eq!(manager.retry_count(), 0);
        assert_eq!(signals.ready(), Some(ADDRESS));

        // A duplicate with a different address must not re-raise.
        let other = Ipv4Addr::new(10, 0, 0, 2);
        assert_eq!(manager.on_event(NetEvent::GotAddress(other)), JoinState::Connected);
        assert_eq!(signals.ready(), Some(ADDRESS));
        assert_eq!(block_on(signals.wait()), Readiness::Ready(ADDRESS));
    }

    #[test]
    fn test_link_drop_after_join_retries_without_resignalling() {
        let signals = NetworkSignals::new();
        let mut station = FakeStation::default();
        let mut manager = JoinManager::new(&mut station, &signals);
        manager.start();
        manager.on_event(NetEvent::GotAddress(ADDRESS));

        assert_eq!(manager.on_event(NetEvent::StationDisconnected), JoinState::Connecting);
        assert_eq!(manager.retry_count(), 1);

        let renewed = Ipv4Addr::new(192, 168, 1, 43);
        assert_eq!(manager.on_event(NetEvent::GotAddress(renewed)), JoinState::Connected);
        assert_eq!(manager.retry_count(), 0);
        assert_eq!(signals.ready(), Some(ADDRESS));
        assert!(!signals.has_failed());
    }

    #[test]
    fn test_rejected_join_request_is_not_counted() {
        let signals = NetworkSignals::new();
        let mut station = FakeStation {
            requests: 0,
            reject: true,
        };
        let mut manager = JoinManager::new(&mut station, &signals);

        manager.start();
        assert_eq!(manager.state(), JoinState::Connecting);
        assert_eq!(manager.retry_count(), 0);
    }

    #[test]
    fn test_events_before_start_are_ignored() {
        let signals = NetworkSignals::new();
        let mut station = FakeStation::default();
        let mut manager = JoinManager::new(&mut station, &signals);

        assert_eq!(manager.on_event(NetEvent::StationStarted), JoinState::Idle);
        assert_eq!(manager.on_event(NetEvent::GotAddress(ADDRESS)), JoinState::Idle);
        assert_eq!(signals.ready(), None);
        drop(manager);
        assert_eq!(station.requests, 0);
    }

    #[test]
    fn test_custom_ceiling() {
        let signals = NetworkSignals::new();
        let mut station = FakeStation::default();
        let mut manager = JoinManager::new(&mut station, &signals).with_max_retries(0);
        manager.start();

        assert_eq!(manager.on_event(NetEvent::StationDisconnected), JoinState::Failed);
        assert!(signals.has_failed());
    }
}
