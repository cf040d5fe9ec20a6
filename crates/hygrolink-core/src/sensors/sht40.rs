use crate::sensors::{Sample, SensorError};

use super::Sensor;
use embedded_hal_async::i2c::I2c;
use sht4x::Sht4xAsync;

/// Round a milli-unit reading to the nearest whole unit, halves away from zero.
fn milli_to_whole(milli: i32) -> i32 {
    if milli >= 0 {
        (milli + 500) / 1000
    } else {
        (milli - 500) / 1000
    }
}

pub struct SHT40Sensor<I> {
    sensor: Sht4xAsync<I, embassy_time::Delay>,
}

impl<I: I2c> SHT40Sensor<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            sensor: Sht4xAsync::<I, embassy_time::Delay>::new(i2c),
        }
    }
}

impl<I: I2c> Sensor for SHT40Sensor<I> {
    async fn read(&mut self) -> Result<Sample, SensorError> {
        let measurement = self
            .sensor
            .measure(sht4x::Precision::High, &mut embassy_time::Delay)
            .await
            .map_err(|e| {
                log::error!("SHT40 measurement failed: {:?}", e);
                SensorError::ReadFailed {
                    sensor: "SHT40",
                    operation: "measure temperature/humidity",
                    details: "I2C communication error or sensor not responding",
                }
            })?;

        let temperature_milli_celsius =
            (measurement.temperature_celsius().to_num::<f32>() * 1000.0) as i32;
        let humidity_milli_percent =
            (measurement.humidity_percent().to_num::<f32>() * 1000.0) as i32;

        Ok(Sample::new(
            milli_to_whole(temperature_milli_celsius),
            milli_to_whole(humidity_milli_percent),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::milli_to_whole;

    #[test]
    fn test_milli_rounding() {
        assert_eq!(milli_to_whole(23_000), 23);
        assert_eq!(milli_to_whole(23_499), 23);
        assert_eq!(milli_to_whole(23_500), 24);
        assert_eq!(milli_to_whole(499), 0);
        assert_eq!(milli_to_whole(-1_499), -1);
        assert_eq!(milli_to_whole(-1_500), -2);
    }
}
