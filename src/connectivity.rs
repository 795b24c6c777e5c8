//! Network link and MQTT session management.
//!
//! Both connections are small state machines stepped from blocking retry
//! loops. There is no backoff and no attempt limit: an unattended node keeps
//! trying at a fixed cadence until the link comes back.

use core::net::Ipv4Addr;

use embedded_hal::delay::DelayNs;
use log::{info, warn};

/// Delay between polls while joining the wireless network.
pub const WIFI_RETRY_DELAY_MS: u32 = 500;
/// Delay between MQTT session attempts.
pub const MQTT_RETRY_DELAY_MS: u32 = 1000;
/// Polls without an association before the join request is repeated.
const REJOIN_AFTER_POLLS: u32 = 20;
/// MQTT over TLS.
pub const MQTTS_PORT: u16 = 8883;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy)]
pub struct WifiCredentials {
    pub ssid: &'static str,
    pub password: &'static str,
}

/// PEM encoded material for mutual TLS.
#[derive(Debug, Clone, Copy)]
pub struct TlsCredentials {
    pub ca_cert: &'static str,
    pub client_cert: &'static str,
    pub private_key: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct BrokerConfig {
    pub endpoint: &'static str,
    pub port: u16,
    pub client_id: &'static str,
    pub tls: TlsCredentials,
}

/// Station-mode wireless interface.
pub trait WifiLink {
    /// Starts joining the network. Does not wait for the association.
    fn begin(&mut self, credentials: &WifiCredentials) -> anyhow::Result<()>;
    fn is_connected(&mut self) -> bool;
    fn local_ip(&mut self) -> Option<Ipv4Addr>;
}

/// TLS secured MQTT client.
pub trait MqttSession {
    /// Installs broker endpoint and credentials. Called once, before `connect`.
    fn configure(&mut self, broker: &BrokerConfig) -> anyhow::Result<()>;
    /// Opens the session; `Ok` means the broker accepted it.
    fn connect(&mut self) -> anyhow::Result<()>;
    fn is_connected(&mut self) -> bool;
    /// Keep-alive and inbound pump. Must run every loop iteration.
    fn poll(&mut self);
    fn publish(&mut self, topic: &str, payload: &[u8]) -> anyhow::Result<()>;
}

pub struct Connectivity<W, M> {
    wifi: W,
    mqtt: M,
    credentials: WifiCredentials,
    broker: BrokerConfig,
    wifi_state: LinkState,
    mqtt_state: LinkState,
    configured: bool,
}

impl<W: WifiLink, M: MqttSession> Connectivity<W, M> {
    pub fn new(wifi: W, mqtt: M, credentials: WifiCredentials, broker: BrokerConfig) -> Self {
        Self {
            wifi,
            mqtt,
            credentials,
            broker,
            wifi_state: LinkState::Disconnected,
            mqtt_state: LinkState::Disconnected,
            configured: false,
        }
    }

    pub fn wifi_state(&self) -> LinkState {
        self.wifi_state
    }

    pub fn mqtt_state(&self) -> LinkState {
        self.mqtt_state
    }

    #[cfg(test)]
    pub(crate) fn is_ready(&self) -> bool {
        self.wifi_state == LinkState::Connected && self.mqtt_state == LinkState::Connected
    }

    pub(crate) fn session_mut(&mut self) -> &mut M {
        &mut self.mqtt
    }

    #[cfg(test)]
    pub(crate) fn wifi_mut(&mut self) -> &mut W {
        &mut self.wifi
    }

    /// Joins the network, then opens the MQTT session. Only returns once both
    /// are up.
    pub fn connect<D: DelayNs>(&mut self, delay: &mut D) {
        self.join_wifi(delay);
        info!("Connecting to MQTT broker {}:{}...", self.broker.endpoint, self.broker.port);
        self.open_session(delay);
        info!("MQTT broker connected!");
    }

    /// Services the session and repairs whichever connection dropped. Does
    /// nothing else when both are up.
    pub fn ensure_connected<D: DelayNs>(&mut self, delay: &mut D) {
        self.mqtt.poll();

        if !self.wifi.is_connected() {
            warn!("WiFi connection lost. Rejoining...");
            self.wifi_state = LinkState::Disconnected;
            self.mqtt_state = LinkState::Disconnected;
            self.join_wifi(delay);
        }

        if self.mqtt.is_connected() {
            // A short link outage can leave the session itself intact
            self.mqtt_state = LinkState::Connected;
        } else {
            warn!("MQTT disconnected. Reconnecting...");
            self.mqtt_state = LinkState::Disconnected;
            self.open_session(delay);
            info!("Reconnected!");
        }
    }

    fn step_wifi(&mut self) -> LinkState {
        match self.wifi_state {
            LinkState::Disconnected => {
                if let Err(e) = self.wifi.begin(&self.credentials) {
                    warn!("WiFi join request failed: {:#}", e);
                    return LinkState::Disconnected;
                }
                if self.wifi.is_connected() {
                    LinkState::Connected
                } else {
                    LinkState::Connecting
                }
            }
            LinkState::Connecting | LinkState::Connected => {
                if self.wifi.is_connected() {
                    LinkState::Connected
                } else {
                    LinkState::Connecting
                }
            }
        }
    }

    fn join_wifi<D: DelayNs>(&mut self, delay: &mut D) {
        info!("Connecting to Wi-Fi {}", self.credentials.ssid);
        let mut waited = 0u32;
        loop {
            self.wifi_state = self.step_wifi();
            if self.wifi_state == LinkState::Connected {
                break;
            }
            waited += 1;
            if waited % REJOIN_AFTER_POLLS == 0 {
                // The driver gives up on a failed association; ask again
                info!("Still waiting for Wi-Fi ({} polls), re-sending join request", waited);
                self.wifi_state = LinkState::Disconnected;
            }
            delay.delay_ms(WIFI_RETRY_DELAY_MS);
        }

        match self.wifi.local_ip() {
            Some(ip) => info!("WiFi Connected! IP Address: {}", ip),
            None => info!("WiFi Connected!"),
        }
    }

    fn try_open_session(&mut self) -> anyhow::Result<()> {
        if !self.configured {
            self.mqtt.configure(&self.broker)?;
            self.configured = true;
        }
        self.mqtt.connect()
    }

    fn open_session<D: DelayNs>(&mut self, delay: &mut D) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.mqtt_state = LinkState::Connecting;
            match self.try_open_session() {
                Ok(()) => {
                    self.mqtt_state = LinkState::Connected;
                    return;
                }
                Err(e) => {
                    self.mqtt_state = LinkState::Disconnected;
                    warn!("MQTT connect attempt {} failed: {:#}", attempt, e);
                    delay.delay_ms(MQTT_RETRY_DELAY_MS);
                }
            }
        }
    }
}
