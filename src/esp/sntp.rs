use anyhow::Result;
use esp_idf_svc::sntp::{EspSntp, SntpConf};
use esp_idf_sys::*;
use log::info;

use crate::clock::TimeSource;

/// Anything earlier than 2016-01-01 means the RTC was never set.
const EARLIEST_VALID_EPOCH: i64 = 1_451_606_400;

pub struct SntpClock {
    sntp: Option<EspSntp<'static>>,
}

impl SntpClock {
    pub fn new() -> Self {
        Self { sntp: None }
    }
}

impl Default for SntpClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SntpClock {
    fn configure(&mut self, server: &str) -> Result<()> {
        let mut conf = SntpConf::default();
        conf.servers[0] = server;
        self.sntp = Some(EspSntp::new(&conf)?);
        info!("SNTP initialized with {}", server);
        Ok(())
    }

    fn now_utc(&mut self) -> Option<i64> {
        self.sntp.as_ref()?;
        let mut tv: timeval = unsafe { core::mem::zeroed() };
        let ret = unsafe { gettimeofday(&mut tv, core::ptr::null_mut()) };
        if ret != 0 {
            return None;
        }
        let secs = tv.tv_sec as i64;
        (secs >= EARLIEST_VALID_EPOCH).then_some(secs)
    }
}
