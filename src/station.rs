//! Boot sequence and the polling loop.

use core::fmt;

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::clock::{TimeSource, TimeSync};
use crate::connectivity::{Connectivity, MqttSession, WifiLink};
use crate::reading::{Barometer, Environment, Hygrometer};
use crate::telemetry::TelemetryPublisher;

/// Sleep between two cycles.
pub const CYCLE_INTERVAL_MS: u32 = 2000;

/// One-time time source settings.
#[derive(Debug, Clone, Copy)]
pub struct TimeConfig {
    pub server: &'static str,
    pub gmt_offset_secs: i32,
    pub daylight_offset_secs: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupError {
    /// Nothing answered at the barometer's I2C address.
    PressureSensorNotFound,
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PressureSensorNotFound => write!(f, "Could not find BMP280 sensor!"),
        }
    }
}

impl core::error::Error for StartupError {}

/// True when `err` is a [`StartupError`], which [`Station::boot`] has already
/// logged by the time it reaches the caller.
pub fn is_reported(err: &anyhow::Error) -> bool {
    err.downcast_ref::<StartupError>().is_some()
}

/// What a single cycle ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Published,
    PublishFailed,
    SensorFailed,
}

pub struct Station<B, H, W, M, T> {
    sensors: Environment<B, H>,
    link: Connectivity<W, M>,
    clock: TimeSync<T>,
    publisher: TelemetryPublisher,
    time_config: TimeConfig,
    cycles: u32,
}

impl<B, H, W, M, T> Station<B, H, W, M, T>
where
    B: Barometer,
    H: Hygrometer,
    W: WifiLink,
    M: MqttSession,
    T: TimeSource,
{
    pub fn new(
        sensors: Environment<B, H>,
        link: Connectivity<W, M>,
        clock: TimeSync<T>,
        publisher: TelemetryPublisher,
        time_config: TimeConfig,
    ) -> Self {
        Self {
            sensors,
            link,
            clock,
            publisher,
            time_config,
            cycles: 0,
        }
    }

    /// Brings up sensors, network and time. A missing barometer is the only
    /// failure; the caller is expected to halt on it.
    pub fn boot<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), StartupError> {
        info!("Starting climate node...");

        if let Err(e) = self.sensors.hygrometer_mut().begin() {
            warn!("Humidity sensor init failed: {}", e);
        }

        if self.sensors.barometer_mut().begin().is_err() {
            error!("{}", StartupError::PressureSensorNotFound);
            return Err(StartupError::PressureSensorNotFound);
        }
        info!("BMP280 sensor initialized");

        self.link.connect(delay);

        let TimeConfig {
            server,
            gmt_offset_secs,
            daylight_offset_secs,
        } = self.time_config;
        if let Err(e) = self.clock.configure_time_source(gmt_offset_secs, daylight_offset_secs, server) {
            error!("Failed to configure time source: {:#}", e);
        }
        info!("Getting time from NTP...");
        Ok(())
    }

    /// Keep-alive, repair, read, stamp, publish. Never blocks on anything but
    /// reconnection.
    pub fn run_cycle<D: DelayNs>(&mut self, delay: &mut D) -> CycleOutcome {
        self.cycles = self.cycles.wrapping_add(1);
        self.link.ensure_connected(delay);

        let reading = match self.sensors.read_environment() {
            Ok(reading) => reading,
            Err(_) => {
                error!("Error reading sensors.");
                return CycleOutcome::SensorFailed;
            }
        };

        if self.clock.sync_time().is_err() {
            warn!("Publishing with last known timestamp \"{}\"", self.clock.last_known());
        }

        info!("=== Reading {} ===", self.cycles);
        info!("Temperature: {:.2} °C", reading.temperature);
        info!("Pressure: {:.2} hPa", reading.pressure);
        info!("Humidity: {:.2} %", reading.humidity);

        let timestamp = self.clock.last_known();
        match self.publisher.publish(self.link.session_mut(), &reading, timestamp) {
            Ok(()) => CycleOutcome::Published,
            Err(_) => CycleOutcome::PublishFailed,
        }
    }

    pub fn run<D: DelayNs>(&mut self, delay: &mut D) -> ! {
        loop {
            self.run_cycle(delay);
            delay.delay_ms(CYCLE_INTERVAL_MS);
        }
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    #[cfg(test)]
    pub(crate) fn link(&mut self) -> &mut Connectivity<W, M> {
        &mut self.link
    }

    #[cfg(test)]
    pub(crate) fn sensors(&mut self) -> &mut Environment<B, H> {
        &mut self.sensors
    }

    #[cfg(test)]
    pub(crate) fn clock(&mut self) -> &mut TimeSync<T> {
        &mut self.clock
    }
}
