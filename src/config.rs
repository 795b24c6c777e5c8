//! Compile-time device configuration.
//!
//! Values come from `cfg.toml` in the crate root, section `[climate-node]`
//! (see `cfg.toml.example`). Anything left out falls back to the defaults
//! below.

use crate::connectivity::{BrokerConfig, TlsCredentials, WifiCredentials};
use crate::dht::DhtModel;
use crate::station::TimeConfig;

#[toml_cfg::toml_config]
pub struct Config {
    #[default("")]
    pub wifi_ssid: &'static str,
    #[default("")]
    pub wifi_password: &'static str,
    #[default("")]
    pub mqtt_endpoint: &'static str,
    #[default(8883)]
    pub mqtt_port: u16,
    #[default("ESP32_Client")]
    pub mqtt_client_id: &'static str,
    #[default("esp32/pub")]
    pub mqtt_topic: &'static str,
    #[default("")]
    pub ca_cert: &'static str,
    #[default("")]
    pub client_cert: &'static str,
    #[default("")]
    pub private_key: &'static str,
    #[default("pool.ntp.org")]
    pub ntp_server: &'static str,
    #[default(19800)]
    pub gmt_offset_secs: i32,
    #[default(0)]
    pub daylight_offset_secs: i32,
    #[default("dht11")]
    pub dht_model: &'static str,
}

impl Config {
    pub fn wifi(&self) -> WifiCredentials {
        WifiCredentials {
            ssid: self.wifi_ssid,
            password: self.wifi_password,
        }
    }

    pub fn broker(&self) -> BrokerConfig {
        BrokerConfig {
            endpoint: self.mqtt_endpoint,
            port: self.mqtt_port,
            client_id: self.mqtt_client_id,
            tls: TlsCredentials {
                ca_cert: self.ca_cert,
                client_cert: self.client_cert,
                private_key: self.private_key,
            },
        }
    }

    pub fn time(&self) -> TimeConfig {
        TimeConfig {
            server: self.ntp_server,
            gmt_offset_secs: self.gmt_offset_secs,
            daylight_offset_secs: self.daylight_offset_secs,
        }
    }

    /// Unknown names fall back to DHT11.
    pub fn dht(&self) -> DhtModel {
        DhtModel::from_name(self.dht_model).unwrap_or(DhtModel::Dht11)
    }

    /// Keys that must be filled in for the node to reach the broker.
    pub fn missing(&self) -> heapless::Vec<&'static str, 6> {
        let required = [
            ("wifi_ssid", self.wifi_ssid),
            ("wifi_password", self.wifi_password),
            ("mqtt_endpoint", self.mqtt_endpoint),
            ("ca_cert", self.ca_cert),
            ("client_cert", self.client_cert),
            ("private_key", self.private_key),
        ];
        let mut missing = heapless::Vec::new();
        for (key, value) in required {
            // capacity equals the number of required keys
            if value.trim().is_empty() && missing.push(key).is_err() {
                break;
            }
        }
        missing
    }
}
