//! DHT11/DHT22 single-wire protocol.
//!
//! The pin timing lives in the board module; this file turns the measured
//! pulse widths into a frame and the frame into temperature and humidity.

use core::fmt;

/// Bytes in one transmission: humidity (2), temperature (2), checksum.
pub const FRAME_LEN: usize = 5;
pub const FRAME_BITS: usize = FRAME_LEN * 8;

/// High pulses longer than this are a `1` bit (datasheet: ~26 us vs ~70 us).
pub const ONE_BIT_THRESHOLD_US: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtModel {
    Dht11,
    Dht22,
}

impl DhtModel {
    /// Parses the configuration spelling, `dht11` or `dht22`.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("dht11") {
            Some(Self::Dht11)
        } else if name.eq_ignore_ascii_case("dht22") || name.eq_ignore_ascii_case("am2302") {
            Some(Self::Dht22)
        } else {
            None
        }
    }

    /// Shortest interval between two conversions the part supports.
    pub fn min_interval_ms(self) -> u64 {
        match self {
            Self::Dht11 => 1000,
            Self::Dht22 => 2000,
        }
    }

    /// How long the host holds the line low to request a conversion.
    pub fn start_signal_us(self) -> u32 {
        match self {
            Self::Dht11 => 18_000,
            Self::Dht22 => 1_100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtError {
    /// The line did not change level in time.
    Timeout,
    Checksum { expected: u8, actual: u8 },
    /// The GPIO driver refused to drive the line.
    Pin,
}

impl fmt::Display for DhtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out waiting for the sensor"),
            Self::Checksum { expected, actual } => {
                write!(f, "checksum mismatch: expected 0x{:02x}, got 0x{:02x}", expected, actual)
            }
            Self::Pin => write!(f, "could not drive the data line"),
        }
    }
}

impl core::error::Error for DhtError {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DhtMeasurement {
    pub temperature: f32,
    pub humidity: f32,
}

/// Packs 40 high-pulse widths, most significant bit first, into a frame.
pub fn frame_from_pulses(high_us: &[u32; FRAME_BITS]) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    for (i, width) in high_us.iter().enumerate() {
        if *width > ONE_BIT_THRESHOLD_US {
            frame[i / 8] |= 0x80 >> (i % 8);
        }
    }
    frame
}

pub fn checksum(frame: &[u8; FRAME_LEN]) -> u8 {
    frame[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

pub fn decode(frame: &[u8; FRAME_LEN], model: DhtModel) -> Result<DhtMeasurement, DhtError> {
    let expected = checksum(frame);
    if frame[4] != expected {
        return Err(DhtError::Checksum { expected, actual: frame[4] });
    }

    let measurement = match model {
        DhtModel::Dht11 => {
            let humidity = frame[0] as f32 + frame[1] as f32 * 0.1;
            let mut temperature = frame[2] as f32 + (frame[3] & 0x0f) as f32 * 0.1;
            if frame[3] & 0x80 != 0 {
                temperature = -temperature;
            }
            DhtMeasurement { temperature, humidity }
        }
        DhtModel::Dht22 => {
            let humidity = u16::from_be_bytes([frame[0], frame[1]]) as f32 * 0.1;
            let mut temperature = u16::from_be_bytes([frame[2] & 0x7f, frame[3]]) as f32 * 0.1;
            if frame[2] & 0x80 != 0 {
                temperature = -temperature;
            }
            DhtMeasurement { temperature, humidity }
        }
    };
    Ok(measurement)
}

/// Enforces the part's sampling period: inside it the last result is reused.
#[derive(Debug, Default)]
pub struct SampleGate {
    last_at_ms: Option<u64>,
    last: Option<Result<DhtMeasurement, DhtError>>,
}

impl SampleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached result if a new conversion is not due yet.
    pub fn cached(&self, now_ms: u64, model: DhtModel) -> Option<Result<DhtMeasurement, DhtError>> {
        match (self.last_at_ms, self.last) {
            (Some(at), Some(last)) if now_ms.saturating_sub(at) < model.min_interval_ms() => Some(last),
            _ => None,
        }
    }

    pub fn record(&mut self, now_ms: u64, result: Result<DhtMeasurement, DhtError>) {
        self.last_at_ms = Some(now_ms);
        self.last = Some(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_checksum(bytes: [u8; 4]) -> [u8; FRAME_LEN] {
        let mut frame = [bytes[0], bytes[1], bytes[2], bytes[3], 0];
        frame[4] = checksum(&frame);
        frame
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn test_dht22_positive() {
        // 65.2 %RH, 35.1 C
        let frame = with_checksum([0x02, 0x8c, 0x01, 0x5f]);
        let m = decode(&frame, DhtModel::Dht22).unwrap();
        assert!(close(m.humidity, 65.2));
        assert!(close(m.temperature, 35.1));
    }

    #[test]
    fn test_dht22_negative_temperature() {
        // -10.1 C
        let frame = with_checksum([0x01, 0xf4, 0x80, 0x65]);
        let m = decode(&frame, DhtModel::Dht22).unwrap();
        assert!(close(m.humidity, 50.0));
        assert!(close(m.temperature, -10.1));
    }

    #[test]
    fn test_dht11_integral_and_decimal() {
        let frame = with_checksum([55, 2, 24, 5]);
        let m = decode(&frame, DhtModel::Dht11).unwrap();
        assert!(close(m.humidity, 55.2));
        assert!(close(m.temperature, 24.5));
    }

    #[test]
    fn test_dht11_negative_flag() {
        let frame = with_checksum([30, 0, 3, 0x82]);
        let m = decode(&frame, DhtModel::Dht11).unwrap();
        assert!(close(m.temperature, -3.2));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut frame = with_checksum([0x02, 0x8c, 0x01, 0x5f]);
        frame[4] = frame[4].wrapping_add(1);
        assert_eq!(
            decode(&frame, DhtModel::Dht22),
            Err(DhtError::Checksum { expected: 0xee, actual: 0xef })
        );
    }

    #[test]
    fn test_checksum_wraps() {
        let frame = [0xff, 0xff, 0x01, 0x02, 0x01];
        assert_eq!(checksum(&frame), 0x01);
    }

    #[test]
    fn test_frame_from_pulses() {
        let mut pulses = [26u32; FRAME_BITS];
        // first byte 0b1000_0001, last byte 0b0000_0001
        pulses[0] = 70;
        pulses[7] = 70;
        pulses[39] = 70;
        let frame = frame_from_pulses(&pulses);
        assert_eq!(frame, [0x81, 0, 0, 0, 0x01]);
    }

    #[test]
    fn test_model_from_name() {
        assert_eq!(DhtModel::from_name("DHT11"), Some(DhtModel::Dht11));
        assert_eq!(DhtModel::from_name("dht22"), Some(DhtModel::Dht22));
        assert_eq!(DhtModel::from_name("sht31"), None);
    }

    #[test]
    fn test_sample_gate_reuses_inside_interval() {
        let mut gate = SampleGate::new();
        assert!(gate.cached(0, DhtModel::Dht22).is_none());

        let m = DhtMeasurement { temperature: 20.0, humidity: 50.0 };
        gate.record(1_000, Ok(m));
        assert_eq!(gate.cached(2_500, DhtModel::Dht22), Some(Ok(m)));
        assert!(gate.cached(3_000, DhtModel::Dht22).is_none());
        assert!(gate.cached(2_000, DhtModel::Dht11).is_none());
    }
}
