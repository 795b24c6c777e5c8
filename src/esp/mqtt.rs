use alloc::{boxed::Box, ffi::CString, format, vec::Vec};
use core::ffi::{c_char, c_void};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use anyhow::{anyhow, Result};
use esp_idf_sys::*;
use log::{error, info, warn};

use super::ms_to_ticks;
use crate::connectivity::{BrokerConfig, MqttSession};

/// How long `connect` waits for CONNACK before calling the attempt failed.
const CONNECT_WAIT_MS: u32 = 5000;
const CONNECT_POLL_MS: u32 = 100;
const KEEP_ALIVE_SECS: i32 = 60;
const BUFFER_SIZE: i32 = 2048;

/// Written by the MQTT task's event handler, read by the main loop.
#[derive(Default)]
struct SessionFlags {
    connected: AtomicBool,
    errors: AtomicU32,
}

pub struct TlsMqttClient {
    client: esp_mqtt_client_handle_t,
    flags: Box<SessionFlags>,
    started: bool,
    last_seen_up: bool,
    last_seen_errors: u32,
    // The client keeps pointers into the certificates; they must outlive it.
    strings: Vec<CString>,
}

impl TlsMqttClient {
    pub fn new() -> Self {
        Self {
            client: core::ptr::null_mut(),
            flags: Box::default(),
            started: false,
            last_seen_up: false,
            last_seen_errors: 0,
            strings: Vec::new(),
        }
    }

    extern "C" fn mqtt_event_handler(
        handler_args: *mut c_void,
        _base: esp_event_base_t,
        event_id: i32,
        _event_data: *mut c_void,
    ) {
        if handler_args.is_null() {
            error!("MQTT session flags pointer is null");
            return;
        }
        let flags = unsafe { &*(handler_args as *const SessionFlags) };
        match event_id {
            id if id == esp_mqtt_event_id_t_MQTT_EVENT_CONNECTED as i32 => {
                flags.connected.store(true, Ordering::Release);
            }
            id if id == esp_mqtt_event_id_t_MQTT_EVENT_DISCONNECTED as i32 => {
                flags.connected.store(false, Ordering::Release);
            }
            id if id == esp_mqtt_event_id_t_MQTT_EVENT_ERROR as i32 => {
                flags.errors.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

impl Default for TlsMqttClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttSession for TlsMqttClient {
    fn configure(&mut self, broker: &BrokerConfig) -> Result<()> {
        if !self.client.is_null() {
            return Ok(());
        }

        let uri = CString::new(format!("mqtts://{}:{}", broker.endpoint, broker.port))?;
        let client_id = CString::new(broker.client_id)?;
        let ca_cert = CString::new(broker.tls.ca_cert)?;
        let client_cert = CString::new(broker.tls.client_cert)?;
        let private_key = CString::new(broker.tls.private_key)?;

        let config = esp_mqtt_client_config_t {
            broker: esp_mqtt_client_config_t_broker_t {
                address: esp_mqtt_client_config_t_broker_t_address_t {
                    uri: uri.as_ptr(),
                    ..Default::default()
                },
                verification: esp_mqtt_client_config_t_broker_t_verification_t {
                    certificate: ca_cert.as_ptr(),
                    ..Default::default()
                },
            },
            credentials: esp_mqtt_client_config_t_credentials_t {
                client_id: client_id.as_ptr(),
                authentication: esp_mqtt_client_config_t_credentials_t_authentication_t {
                    certificate: client_cert.as_ptr(),
                    key: private_key.as_ptr(),
                    ..Default::default()
                },
                ..Default::default()
            },
            session: esp_mqtt_client_config_t_session_t {
                keepalive: KEEP_ALIVE_SECS,
                ..Default::default()
            },
            network: esp_mqtt_client_config_t_network_t {
                // Reconnection is driven by the connectivity state machine
                disable_auto_reconnect: true,
                ..Default::default()
            },
            buffer: esp_mqtt_client_config_t_buffer_t {
                size: BUFFER_SIZE,
                out_size: BUFFER_SIZE,
            },
            ..Default::default()
        };

        unsafe {
            let client = esp_mqtt_client_init(&config);
            if client.is_null() {
                return Err(anyhow!("Failed to initialize MQTT client"));
            }
            let flags_ptr = &*self.flags as *const SessionFlags as *mut c_void;
            let err = esp_mqtt_client_register_event(
                client,
                esp_mqtt_event_id_t_MQTT_EVENT_ANY,
                Some(Self::mqtt_event_handler),
                flags_ptr,
            );
            if err != ESP_OK {
                esp_mqtt_client_destroy(client);
                return Err(anyhow!("Failed to register MQTT event handler, error code: {}", err));
            }
            self.client = client;
        }

        self.strings = Vec::from([uri, client_id, ca_cert, client_cert, private_key]);
        info!("MQTT client configured for {}:{}", broker.endpoint, broker.port);
        Ok(())
    }

    fn connect(&mut self) -> Result<()> {
        if self.client.is_null() {
            return Err(anyhow!("MQTT client not configured"));
        }
        if self.flags.connected.load(Ordering::Acquire) {
            return Ok(());
        }

        let err = unsafe {
            if self.started {
                esp_mqtt_client_reconnect(self.client)
            } else {
                esp_mqtt_client_start(self.client)
            }
        };
        if err != ESP_OK {
            return Err(anyhow!("Failed to start MQTT session, error code: {}", err));
        }
        self.started = true;

        let mut waited = 0;
        while waited < CONNECT_WAIT_MS {
            if self.flags.connected.load(Ordering::Acquire) {
                self.last_seen_up = true;
                return Ok(());
            }
            unsafe { vTaskDelay(ms_to_ticks(CONNECT_POLL_MS)) };
            waited += CONNECT_POLL_MS;
        }
        Err(anyhow!("broker did not accept the session within {} ms", CONNECT_WAIT_MS))
    }

    fn is_connected(&mut self) -> bool {
        self.flags.connected.load(Ordering::Acquire)
    }

    fn poll(&mut self) {
        let up = self.flags.connected.load(Ordering::Acquire);
        if up != self.last_seen_up {
            if up {
                info!("MQTT connected to broker");
            } else {
                warn!("MQTT disconnected from broker");
            }
            self.last_seen_up = up;
        }

        let errors = self.flags.errors.load(Ordering::Relaxed);
        if errors != self.last_seen_errors {
            error!("MQTT transport reported {} error(s)", errors.wrapping_sub(self.last_seen_errors));
            self.last_seen_errors = errors;
        }
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        if self.client.is_null() {
            return Err(anyhow!("MQTT client not configured"));
        }
        let topic_cstr = CString::new(topic)?;
        let msg_id = unsafe {
            esp_mqtt_client_publish(
                self.client,
                topic_cstr.as_ptr(),
                payload.as_ptr() as *const c_char,
                payload.len() as i32,
                0,
                0,
            )
        };
        if msg_id < 0 {
            Err(anyhow!("Failed to publish message to {}: {}", topic, msg_id))
        } else {
            Ok(())
        }
    }
}

impl Drop for TlsMqttClient {
    fn drop(&mut self) {
        if self.client.is_null() {
            return;
        }
        unsafe {
            esp_mqtt_client_stop(self.client);
            esp_mqtt_client_destroy(self.client);
        }
    }
}
