//! ESP-IDF implementations of the sensor, network and time seams.

use esp_idf_hal::delay::FreeRtos;
use esp_idf_sys::*;

pub mod mqtt;
pub mod sensors;
pub mod sntp;
pub mod wifi;

pub use mqtt::TlsMqttClient;
pub use sensors::{Bmp280, Dht};
pub use sntp::SntpClock;
pub use wifi::EspWifiLink;

#[inline(always)]
pub(crate) fn ms_to_ticks(ms: u32) -> u32 {
    (ms as u64 * configTICK_RATE_HZ as u64 / 1000) as u32
}

/// Microseconds since boot.
#[inline(always)]
pub(crate) fn now_us() -> i64 {
    unsafe { esp_timer_get_time() }
}

/// Parks the main task forever. Used when the node has nothing left to do.
pub fn halt() -> ! {
    loop {
        FreeRtos::delay_ms(1000);
    }
}
