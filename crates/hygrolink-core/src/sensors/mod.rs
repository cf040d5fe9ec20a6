#[cfg(feature = "sensor-sht40")]
mod sht40;

use thiserror_no_std::Error;

#[cfg(feature = "sensor-sht40")]
pub use sht40::SHT40Sensor;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: failed to {operation} ({details})")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: timed out while trying to {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
}

/// The two quantities a humidity/temperature sensor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorType {
    Temperature,
    Humidity,
}

impl SensorType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Humidity => "%RH",
        }
    }
}

/// One reading taken on a sampling tick.
///
/// Values are whole degrees Celsius and whole percent relative humidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub temperature: i32,
    pub humidity: i32,
}

impl Sample {
    pub const fn new(temperature: i32, humidity: i32) -> Self {
        Self {
            temperature,
            humidity,
        }
    }

    pub const fn value(&self, sensor: SensorType) -> i32 {
        match sensor {
            SensorType::Temperature => self.temperature,
            SensorType::Humidity => self.humidity,
        }
    }
}

/// A source of humidity/temperature samples.
///
/// `read` takes one measurement and does not retry internally. Any error
/// means "no sample this time".
pub trait Sensor {
    fn read(&mut self) -> impl Future<Output = Result<Sample, SensorError>>;
}

impl<S: Sensor> Sensor for &mut S {
    async fn read(&mut self) -> Result<Sample, SensorError> {
        (**self).read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_value_by_type() {
        let sample = Sample::new(23, 60);
        assert_eq!(sample.value(SensorType::Temperature), 23);
        assert_eq!(sample.value(SensorType::Humidity), 60);
    }

    #[test]
    fn test_labels_and_units() {
        assert_eq!(SensorType::Temperature.label(), "temperature");
        assert_eq!(SensorType::Temperature.unit(), "°C");
        assert_eq!(SensorType::Humidity.label(), "humidity");
        assert_eq!(SensorType::Humidity.unit(), "%RH");
    }
}
