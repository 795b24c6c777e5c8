//! Sensor access layer.
//!
//! Two physical sensors sit behind [`Barometer`] and [`Hygrometer`]. Drivers
//! report a failed read as NaN, which is the only validation performed here.

use core::fmt;

use log::error;

/// One poll cycle's worth of environment data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Degrees Celsius, from the barometer.
    pub temperature: f32,
    /// Hectopascal.
    pub pressure: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// A sensor did not answer during `begin`.
    NotFound,
    /// At least one channel came back as NaN.
    NotANumber,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "sensor not found"),
            Self::NotANumber => write!(f, "sensor returned NaN"),
        }
    }
}

impl core::error::Error for SensorError {}

/// Barometric temperature/pressure sensor (BMP280 on the board).
pub trait Barometer {
    fn begin(&mut self) -> Result<(), SensorError>;
    /// Degrees Celsius, NaN on failure.
    fn read_temperature(&mut self) -> f32;
    /// Pascal, NaN on failure.
    fn read_pressure(&mut self) -> f32;
}

/// Temperature/humidity sensor (DHT on the board).
pub trait Hygrometer {
    fn begin(&mut self) -> Result<(), SensorError>;
    /// Degrees Celsius, NaN on failure.
    fn read_temperature(&mut self) -> f32;
    /// Percent relative humidity, NaN on failure.
    fn read_humidity(&mut self) -> f32;
}

pub const PA_PER_HPA: f32 = 100.0;

pub struct Environment<B, H> {
    barometer: B,
    hygrometer: H,
}

impl<B: Barometer, H: Hygrometer> Environment<B, H> {
    pub fn new(barometer: B, hygrometer: H) -> Self {
        Self { barometer, hygrometer }
    }

    pub fn barometer_mut(&mut self) -> &mut B {
        &mut self.barometer
    }

    pub fn hygrometer_mut(&mut self) -> &mut H {
        &mut self.hygrometer
    }

    /// Reads all four channels and combines them into a [`Reading`].
    ///
    /// The hygrometer's temperature is validated but not reported; the
    /// barometer's temperature is the one that goes out.
    pub fn read_environment(&mut self) -> Result<Reading, SensorError> {
        let bmp_temperature = self.barometer.read_temperature();
        let bmp_pressure = self.barometer.read_pressure() / PA_PER_HPA;

        let dht_temperature = self.hygrometer.read_temperature();
        let dht_humidity = self.hygrometer.read_humidity();

        if bmp_temperature.is_nan()
            || bmp_pressure.is_nan()
            || dht_temperature.is_nan()
            || dht_humidity.is_nan()
        {
            error!("Sensor read error!");
            return Err(SensorError::NotANumber);
        }

        Ok(Reading {
            temperature: bmp_temperature,
            pressure: bmp_pressure,
            humidity: dht_humidity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBarometer, MockHygrometer};

    fn environment(bmp: (f32, f32), dht: (f32, f32)) -> Environment<MockBarometer, MockHygrometer> {
        Environment::new(MockBarometer::new(bmp.0, bmp.1), MockHygrometer::new(dht.0, dht.1))
    }

    #[test]
    fn test_pressure_converted_to_hpa() {
        let mut env = environment((21.0, 101_325.0), (22.0, 40.0));
        let reading = env.read_environment().unwrap();
        assert_eq!(reading.pressure, 1013.25);
    }

    #[test]
    fn test_barometer_temperature_is_surfaced() {
        let mut env = environment((24.5, 101_325.0), (26.0, 55.2));
        let reading = env.read_environment().unwrap();
        assert_eq!(reading.temperature, 24.5);
        assert_eq!(reading.humidity, 55.2);
    }

    #[test]
    fn test_nan_in_any_channel_fails() {
        let cases = [
            ((f32::NAN, 101_325.0), (22.0, 40.0)),
            ((21.0, f32::NAN), (22.0, 40.0)),
            ((21.0, 101_325.0), (f32::NAN, 40.0)),
            ((21.0, 101_325.0), (22.0, f32::NAN)),
        ];
        for (bmp, dht) in cases {
            let mut env = environment(bmp, dht);
            assert_eq!(env.read_environment(), Err(SensorError::NotANumber));
        }
    }

    #[test]
    fn test_each_channel_read_once() {
        let mut env = environment((21.0, 101_325.0), (22.0, 40.0));
        env.read_environment().unwrap();
        assert_eq!(env.barometer_mut().reads, 2);
        assert_eq!(env.hygrometer_mut().reads, 2);
    }
}
