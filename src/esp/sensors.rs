use bme280::i2c::BME280;
use esp_idf_hal::delay::Ets;
use esp_idf_hal::gpio::{AnyIOPin, InputOutput, PinDriver};
use esp_idf_hal::i2c::I2cDriver;
use log::{debug, error, warn};

use super::now_us;
use crate::dht::{self, DhtError, DhtMeasurement, DhtModel, SampleGate, FRAME_BITS, FRAME_LEN};
use crate::reading::{Barometer, Hygrometer, SensorError};

/// BMP280 (or BME280) at the primary address 0x76.
pub struct Bmp280 {
    dev: BME280<I2cDriver<'static>>,
    delay: Ets,
    // Pressure from the conversion that produced the last temperature
    pending_pressure: Option<f32>,
}

impl Bmp280 {
    pub fn new(i2c: I2cDriver<'static>) -> Self {
        Self {
            dev: BME280::new_primary(i2c),
            delay: Ets,
            pending_pressure: None,
        }
    }

    /// One forced conversion: (temperature in C, pressure in Pa).
    fn measure(&mut self) -> Option<(f32, f32)> {
        match self.dev.measure(&mut self.delay) {
            Ok(m) => Some((m.temperature, m.pressure)),
            Err(e) => {
                error!("BMP280 read error: {:?}", e);
                None
            }
        }
    }
}

impl Barometer for Bmp280 {
    fn begin(&mut self) -> Result<(), SensorError> {
        self.dev.init(&mut self.delay).map_err(|e| {
            debug!("BMP280 init: {:?}", e);
            SensorError::NotFound
        })
    }

    fn read_temperature(&mut self) -> f32 {
        match self.measure() {
            Some((temperature, pressure)) => {
                self.pending_pressure = Some(pressure);
                temperature
            }
            None => f32::NAN,
        }
    }

    fn read_pressure(&mut self) -> f32 {
        if let Some(pressure) = self.pending_pressure.take() {
            return pressure;
        }
        self.measure().map(|(_, pressure)| pressure).unwrap_or(f32::NAN)
    }
}

/// Longest the line may sit at one level during a transfer.
const LEVEL_TIMEOUT_US: u32 = 100;

/// DHT11/DHT22 bit-banged on an open-drain GPIO.
pub struct Dht {
    pin: PinDriver<'static, AnyIOPin, InputOutput>,
    model: DhtModel,
    gate: SampleGate,
}

impl Dht {
    pub fn new(pin: PinDriver<'static, AnyIOPin, InputOutput>, model: DhtModel) -> Self {
        Self {
            pin,
            model,
            gate: SampleGate::new(),
        }
    }

    /// Microseconds the line stayed at `high` before flipping.
    fn level_duration(&self, high: bool) -> Result<u32, DhtError> {
        let start = now_us();
        loop {
            let elapsed = (now_us() - start) as u32;
            if self.pin.is_high() != high {
                return Ok(elapsed);
            }
            if elapsed > LEVEL_TIMEOUT_US {
                return Err(DhtError::Timeout);
            }
        }
    }

    fn read_frame(&mut self) -> Result<[u8; FRAME_LEN], DhtError> {
        // Start signal, then release the line to the sensor's pull-up
        self.pin.set_low().map_err(|_| DhtError::Pin)?;
        Ets::delay_us(self.model.start_signal_us());
        self.pin.set_high().map_err(|_| DhtError::Pin)?;
        Ets::delay_us(30);

        // Response: ~80 us low, ~80 us high
        self.level_duration(true)?;
        self.level_duration(false)?;
        self.level_duration(true)?;

        let mut pulses = [0u32; FRAME_BITS];
        for width in pulses.iter_mut() {
            self.level_duration(false)?;
            *width = self.level_duration(true)?;
        }
        Ok(dht::frame_from_pulses(&pulses))
    }

    fn sample(&mut self) -> Result<DhtMeasurement, DhtError> {
        let now_ms = (now_us() / 1000) as u64;
        if let Some(cached) = self.gate.cached(now_ms, self.model) {
            return cached;
        }
        let result = self.read_frame().and_then(|frame| dht::decode(&frame, self.model));
        if let Err(e) = result {
            warn!("DHT read failed: {}", e);
        }
        self.gate.record(now_ms, result);
        result
    }
}

impl Hygrometer for Dht {
    fn begin(&mut self) -> Result<(), SensorError> {
        // Idle high until the first start signal
        self.pin.set_high().map_err(|e| {
            error!("DHT pin setup failed: {:?}", e);
            SensorError::NotFound
        })
    }

    fn read_temperature(&mut self) -> f32 {
        self.sample().map(|m| m.temperature).unwrap_or(f32::NAN)
    }

    fn read_humidity(&mut self) -> f32 {
        self.sample().map(|m| m.humidity).unwrap_or(f32::NAN)
    }
}
