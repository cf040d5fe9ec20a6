//! Periodic sample-and-publish producer
//!
//! Every period the loop takes one sample and publishes temperature and
//! humidity to their own topics as plain decimal strings. The loop does not
//! look at network or session state; whatever the [`Publish`] capability
//! does with a reading while offline is its business.
//!
//! A failed sensor read skips the whole tick, so a tick never publishes half
//! a sample.

use core::fmt::Write;

use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Timer};
use log::{error, info, warn};

use crate::config::{SAMPLE_PERIOD, TopicConfig};
use crate::sensors::{Sample, Sensor, SensorError, SensorType};
use crate::session::{Publish, PublishOutcome};
use crate::signal::OneShot;

/// Enough room for `i32::MIN` in decimal.
pub const PAYLOAD_CAPACITY: usize = 12;

/// Render a reading as its payload: base-10, `-` only for negatives.
pub fn format_reading(value: i32) -> heapless::String<PAYLOAD_CAPACITY> {
    let mut payload = heapless::String::new();
    // Cannot overflow: the longest i32 is 11 characters.
    let _ = write!(payload, "{}", value);
    payload
}

/// Stops a running [`SamplingLoop`].
pub struct CancelToken {
    cancelled: OneShot<()>,
}

impl CancelToken {
    pub const fn new() -> Self {
        Self {
            cancelled: OneShot::new(),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.raise(());
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_raised()
    }

    pub async fn cancelled(&self) {
        self.cancelled.wait().await
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The sensor read failed; nothing was published.
    Skipped(SensorError),
    Published {
        temperature: PublishOutcome,
        humidity: PublishOutcome,
    },
}

pub struct SamplingLoop<'a, S, P: ?Sized> {
    sensor: S,
    publisher: &'a P,
    topics: TopicConfig<'a>,
    period: Duration,
}

impl<'a, S, P> SamplingLoop<'a, S, P>
where
    S: Sensor,
    P: Publish + ?Sized,
{
    pub fn new(sensor: S, publisher: &'a P, topics: TopicConfig<'a>) -> Self {
        Self {
            sensor,
            publisher,
            topics,
            period: SAMPLE_PERIOD,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Sample and publish until `cancel` fires.
    ///
    /// The first tick runs immediately; each later tick follows the previous
    /// one by the configured period.
    pub async fn run(&mut self, cancel: &CancelToken) {
        info!(
            "Sampling every {} s to {} and {}",
            self.period.as_secs(),
            self.topics.temperature,
            self.topics.humidity
        );

        while !cancel.is_cancelled() {
            self.tick().await;

            if let Either::First(()) = select(cancel.cancelled(), Timer::after(self.period)).await
            {
                break;
            }
        }

        info!("Sampling loop stopped");
    }

    /// Take one sample and publish both readings.
    pub async fn tick(&mut self) -> TickOutcome {
        let sample = match self.sensor.read().await {
            Ok(sample) => sample,
            Err(e) => {
                error!("Failed to read sensor: {}", e);
                return TickOutcome::Skipped(e);
            }
        };

        // Each reading goes out on its own; a lost temperature does not hold
        // back the humidity.
        let temperature = self.publish_reading(SensorType::Temperature, &sample);
        let humidity = self.publish_reading(SensorType::Humidity, &sample);

        TickOutcome::Published {
            temperature,
            humidity,
        }
    }

    fn publish_reading(&self, sensor: SensorType, sample: &Sample) -> PublishOutcome {
        let topic = self.topics.for_sensor(sensor);
        let payload = format_reading(sample.value(sensor));

        let outcome = self.publisher.publish(topic, payload.as_bytes());
        match outcome {
            PublishOutcome::Forwarded => {
                info!("Sent {}: {} {}", sensor.label(), payload, sensor.unit())
            }
            PublishOutcome::Dropped | PublishOutcome::Rejected => {
                warn!("Lost {} reading {} ({:?})", sensor.label(), payload, outcome)
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{BROKER, FakeConnector};
    use crate::session::{SessionEvent, SessionManager};
    use embassy_futures::block_on;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::string::{String, ToString};
    use std::vec::Vec;

    const TOPICS: TopicConfig<'static> = TopicConfig {
        temperature: "home/sensor/temperature",
        humidity: "home/sensor/humidity",
    };

    const READ_ERROR: SensorError = SensorError::ReadFailed {
        sensor: "fake",
        operation: "read",
        details: "checksum mismatch",
    };

    struct ScriptedSensor<'a> {
        script: VecDeque<Result<Sample, SensorError>>,
        reads: usize,
        cancel_after: Option<(usize, &'a CancelToken)>,
    }

    impl<'a> ScriptedSensor<'a> {
        fn new(script: impl IntoIterator<Item = Result<Sample, SensorError>>) -> Self {
            Self {
                script: script.into_iter().collect(),
                reads: 0,
                cancel_after: None,
            }
        }
    }

    impl Sensor for ScriptedSensor<'_> {
        async fn read(&mut self) -> Result<Sample, SensorError> {
            self.reads += 1;
            if let Some((limit, token)) = self.cancel_after {
                if self.reads >= limit {
                    token.cancel();
                }
            }
            self.script.pop_front().unwrap_or(Err(READ_ERROR))
        }
    }

    /// Records every publish and answers with a fixed outcome per topic.
    #[derive(Default)]
    struct RecordingPublisher {
        calls: RefCell<Vec<(String, String)>>,
        refuse_topic: Cell<Option<&'static str>>,
    }

    impl Publish for RecordingPublisher {
        fn publish(&self, topic: &str, payload: &[u8]) -> PublishOutcome {
            self.calls.borrow_mut().push((
                topic.to_string(),
                String::from_utf8(payload.to_vec()).unwrap(),
            ));
            if self.refuse_topic.get() == Some(topic) {
                PublishOutcome::Rejected
            } else {
                PublishOutcome::Forwarded
            }
        }
    }

    #[test]
    fn test_format_reading() {
        assert_eq!(format_reading(23).as_str(), "23");
        assert_eq!(format_reading(0).as_str(), "0");
        assert_eq!(format_reading(-7).as_str(), "-7");
        assert_eq!(format_reading(i32::MIN).as_str(), "-2147483648");
    }

    #[test]
    fn test_tick_publishes_both_readings() {
        let publisher = RecordingPublisher::default();
        let sensor = ScriptedSensor::new([Ok(Sample::new(23, 60))]);
        let mut sampling = SamplingLoop::new(sensor, &publisher, TOPICS);

        let outcome = block_on(sampling.tick());
        assert_eq!(
            outcome,
            TickOutcome::Published {
                temperature: PublishOutcome::Forwarded,
                humidity: PublishOutcome::Forwarded,
            }
        );

        let calls = publisher.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (TOPICS.temperature.to_string(), "23".to_string()));
        assert_eq!(calls[1], (TOPICS.humidity.to_string(), "60".to_string()));
    }

    #[test]
    fn test_failed_read_publishes_nothing() {
        let publisher = RecordingPublisher::default();
        let sensor = ScriptedSensor::new([Err(READ_ERROR)]);
        let mut sampling = SamplingLoop::new(sensor, &publisher, TOPICS);

        assert_eq!(block_on(sampling.tick()), TickOutcome::Skipped(READ_ERROR));
        assert!(publisher.calls.borrow().is_empty());
    }

    #[test]
    fn test_lost_temperature_does_not_block_humidity() {
        let publisher = RecordingPublisher::default();
        publisher.refuse_topic.set(Some(TOPICS.temperature));
        let sensor = ScriptedSensor::new([Ok(Sample::new(-3, 85))]);
        let mut sampling = SamplingLoop::new(sensor, &publisher, TOPICS);

        let outcome = block_on(sampling.tick());
        assert_eq!(
            outcome,
            TickOutcome::Published {
                temperature: PublishOutcome::Rejected,
                humidity: PublishOutcome::Forwarded,
            }
        );

        let calls = publisher.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, "-3");
        assert_eq!(calls[1], (TOPICS.humidity.to_string(), "85".to_string()));
    }

    #[test]
    fn test_tick_through_session() {
        let connector = FakeConnector::default();
        let log = connector.log.clone();
        let session = SessionManager::new(connector);
        session.start(&BROKER).unwrap();

        let sensor = ScriptedSensor::new([
            Ok(Sample::new(21, 55)),
            Ok(Sample::new(23, 60)),
            Ok(Sample::new(24, 58)),
        ]);
        let mut sampling = SamplingLoop::new(sensor, &session, TOPICS);

        // Not yet connected: both readings are dropped.
        block_on(sampling.tick());
        assert!(log.borrow().is_empty());

        session.on_event(SessionEvent::Connected);
        block_on(sampling.tick());
        {
            let log = log.borrow();
            assert_eq!(log.len(), 2);
            assert_eq!(log[0].topic, TOPICS.temperature);
            assert_eq!(log[0].payload, b"23");
            assert_eq!(log[1].topic, TOPICS.humidity);
            assert_eq!(log[1].payload, b"60");
        }

        session.on_event(SessionEvent::Disconnected);
        block_on(sampling.tick());
        assert_eq!(log.borrow().len(), 2);

        let stats = session.stats();
        assert_eq!(stats.forwarded, 2);
        assert_eq!(stats.dropped, 4);
    }

    #[test]
    fn test_run_exits_when_already_cancelled() {
        let publisher = RecordingPublisher::default();
        let cancel = CancelToken::new();
        cancel.cancel();

        let mut sensor = ScriptedSensor::new([Ok(Sample::new(23, 60))]);
        let mut sampling = SamplingLoop::new(&mut sensor, &publisher, TOPICS);
        block_on(sampling.run(&cancel));
        drop(sampling);

        assert_eq!(sensor.reads, 0);
        assert!(publisher.calls.borrow().is_empty());
    }

    #[test]
    fn test_run_stops_after_cancel() {
        let publisher = RecordingPublisher::default();
        let cancel = CancelToken::new();

        let mut sensor = ScriptedSensor::new([
            Ok(Sample::new(20, 50)),
            Err(READ_ERROR),
            Ok(Sample::new(22, 52)),
        ]);
        sensor.cancel_after = Some((3, &cancel));

        let mut sampling = SamplingLoop::new(&mut sensor, &publisher, TOPICS)
            .with_period(Duration::from_millis(1));
        block_on(sampling.run(&cancel));
        drop(sampling);

        assert_eq!(sensor.reads, 3);
        let payloads: Vec<String> = publisher
            .calls
            .borrow()
            .iter()
            .map(|(_, payload)| payload.clone())
            .collect();
        assert_eq!(payloads, ["20", "50", "22", "52"]);
    }
}
