#![cfg_attr(target_os = "espidf", no_std, no_main)]

#[cfg(target_os = "espidf")]
mod firmware {
    use anyhow::Result;
    use esp_idf_hal::{
        delay::FreeRtos,
        gpio::{IOPin, PinDriver},
        i2c::{I2cConfig, I2cDriver},
        peripherals::Peripherals,
        prelude::*,
    };
    use esp_idf_svc::{
        eventloop::EspSystemEventLoop,
        nvs::EspDefaultNvsPartition,
        wifi::{BlockingWifi, EspWifi},
    };
    use log::{error, warn};

    use climate_node::config::CONFIG;
    use climate_node::esp::{self, Bmp280, Dht, EspWifiLink, SntpClock, TlsMqttClient};
    use climate_node::station;
    use climate_node::{Connectivity, Environment, Station, TelemetryPublisher, TimeSync};

    #[no_mangle]
    fn main() -> i32 {
        esp_idf_sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();

        if let Err(e) = run() {
            if !station::is_reported(&e) {
                error!("Startup failed: {:?}", e);
            }
        }
        esp::halt()
    }

    fn run() -> Result<()> {
        for key in CONFIG.missing() {
            warn!("cfg.toml: `{}` is empty", key);
        }

        let peripherals = Peripherals::take()?;
        let sys_loop = EspSystemEventLoop::take()?;
        let nvs = EspDefaultNvsPartition::take()?;
        let wifi = BlockingWifi::wrap(
            EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs))?,
            sys_loop,
        )?;

        let sda = peripherals.pins.gpio8;
        let scl = peripherals.pins.gpio9;
        let i2c = I2cDriver::new(
            peripherals.i2c0,
            sda,
            scl,
            &I2cConfig::new().baudrate(100.kHz().into()),
        )?;
        let dht_pin = PinDriver::input_output_od(peripherals.pins.gpio4.downgrade())?;

        let sensors = Environment::new(Bmp280::new(i2c), Dht::new(dht_pin, CONFIG.dht()));
        let link = Connectivity::new(
            EspWifiLink::new(wifi),
            TlsMqttClient::new(),
            CONFIG.wifi(),
            CONFIG.broker(),
        );
        let mut station = Station::new(
            sensors,
            link,
            TimeSync::new(SntpClock::new()),
            TelemetryPublisher::new(CONFIG.mqtt_topic),
            CONFIG.time(),
        );

        let mut delay = FreeRtos;
        station.boot(&mut delay)?;
        station.run(&mut delay)
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("climate-node only runs on ESP-IDF targets; use `cargo test --lib` on the host");
}
