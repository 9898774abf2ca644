//! Heart Rate Service (0x180D) frame codec.

use uuid::Uuid;

/// Heart Rate Service UUID (0x180D)
pub const HEART_RATE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_180d_0000_1000_8000_0080_5f9b_34fb);

/// Heart Rate Measurement UUID (0x2A37)
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_0080_5f9b_34fb);

/// Parsed Heart Rate Measurement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartRateData {
    /// Heart rate in BPM
    pub bpm: u16,
    /// Sensor reports skin contact (false when unsupported)
    pub sensor_contact: bool,
    /// Energy expended in kJ (if present)
    pub energy_expended_kj: Option<u16>,
    /// RR intervals in 1/1024 s units
    pub rr_intervals: Vec<u16>,
}

impl HeartRateData {
    /// RR intervals converted to milliseconds.
    pub fn rr_intervals_ms(&self) -> Vec<f64> {
        self.rr_intervals
            .iter()
            .map(|&rr| f64::from(rr) * 1000.0 / 1024.0)
            .collect()
    }
}

/// Parse a Heart Rate Measurement notification.
///
/// Byte 0 holds flags:
/// - bit 0: rate is u16 little-endian (else u8)
/// - bit 1: sensor contact detected
/// - bit 2: sensor contact supported
/// - bit 3: energy expended present
/// - bit 4: RR intervals present
///
/// Returns `None` when the frame is too short to hold the rate.
pub fn parse_heart_rate_measurement(data: &[u8]) -> Option<HeartRateData> {
    let (&flags, rest) = data.split_first()?;

    let rate_is_u16 = flags & 0x01 != 0;
    let contact_supported = flags & 0x04 != 0;
    let energy_present = flags & 0x08 != 0;
    let rr_present = flags & 0x10 != 0;

    let (bpm, mut rest) = if rate_is_u16 {
        match rest {
            [lo, hi, tail @ ..] => (u16::from_le_bytes([*lo, *hi]), tail),
            _ => return None,
        }
    } else {
        let (&rate, tail) = rest.split_first()?;
        (u16::from(rate), tail)
    };

    let mut result = HeartRateData {
        bpm,
        sensor_contact: contact_supported && flags & 0x02 != 0,
        ..Default::default()
    };

    if energy_present {
        if let [lo, hi, tail @ ..] = rest {
            result.energy_expended_kj = Some(u16::from_le_bytes([*lo, *hi]));
            rest = tail;
        }
    }

    if rr_present {
        result.rr_intervals = rest
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
    }

    Some(result)
}
