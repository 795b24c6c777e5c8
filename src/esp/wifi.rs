use core::net::Ipv4Addr;

use anyhow::{anyhow, Result};
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::info;

use crate::connectivity::{WifiCredentials, WifiLink};

pub struct EspWifiLink {
    wifi: BlockingWifi<EspWifi<'static>>,
}

impl EspWifiLink {
    pub fn new(wifi: BlockingWifi<EspWifi<'static>>) -> Self {
        Self { wifi }
    }
}

impl WifiLink for EspWifiLink {
    fn begin(&mut self, credentials: &WifiCredentials) -> Result<()> {
        let wifi_config = Configuration::Client(ClientConfiguration {
            ssid: heapless::String::try_from(credentials.ssid)
                .map_err(|_| anyhow!("SSID `{}` is too long", credentials.ssid))?,
            password: heapless::String::try_from(credentials.password)
                .map_err(|_| anyhow!("WiFi password is too long"))?,
            auth_method: AuthMethod::WPA2Personal,
            ..Default::default()
        });
        self.wifi.set_configuration(&wifi_config)?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
            info!("WiFi driver started");
        }
        // Non-blocking; association is observed through is_connected
        self.wifi.wifi_mut().connect()?;
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    fn local_ip(&mut self) -> Option<Ipv4Addr> {
        let ip_info = self.wifi.wifi().sta_netif().get_ip_info().ok()?;
        Some(Ipv4Addr::from(ip_info.ip.octets()))
    }
}
