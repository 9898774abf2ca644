//! Unit tests for Heart Rate Measurement parsing.

use paceline::sensors::parse_heart_rate_measurement;

#[test]
fn test_parse_u8_rate() {
    // Flags: 0x00, rate 72
    let data = parse_heart_rate_measurement(&[0x00, 0x48]).unwrap();

    assert_eq!(data.bpm, 72);
    assert!(!data.sensor_contact);
    assert!(data.energy_expended_kj.is_none());
    assert!(data.rr_intervals.is_empty());
}

#[test]
fn test_parse_u16_rate() {
    // Flags: 0x01, rate 0x0104 = 260
    let data = parse_heart_rate_measurement(&[0x01, 0x04, 0x01]).unwrap();
    assert_eq!(data.bpm, 260);
}

#[test]
fn test_sensor_contact_requires_support_bit() {
    // Contact detected but not supported
    let data = parse_heart_rate_measurement(&[0x02, 0x50]).unwrap();
    assert!(!data.sensor_contact);

    // Supported and detected
    let data = parse_heart_rate_measurement(&[0x06, 0x50]).unwrap();
    assert!(data.sensor_contact);
}

#[test]
fn test_energy_and_rr_intervals() {
    // Flags: energy (0x08) + RR (0x10), rate 150, energy 300 kJ, RR 1024 and 512
    let frame = [0x18, 0x96, 0x2C, 0x01, 0x00, 0x04, 0x00, 0x02];
    let data = parse_heart_rate_measurement(&frame).unwrap();

    assert_eq!(data.bpm, 150);
    assert_eq!(data.energy_expended_kj, Some(300));
    assert_eq!(data.rr_intervals, vec![1024, 512]);
    assert_eq!(data.rr_intervals_ms(), vec![1000.0, 500.0]);
}

#[test]
fn test_odd_trailing_rr_byte_ignored() {
    let data = parse_heart_rate_measurement(&[0x10, 0x64, 0x00, 0x04, 0x07]).unwrap();
    assert_eq!(data.rr_intervals, vec![1024]);
}

#[test]
fn test_truncated_frames_rejected() {
    assert!(parse_heart_rate_measurement(&[]).is_none());
    assert!(parse_heart_rate_measurement(&[0x00]).is_none());
    // u16 rate with only one byte
    assert!(parse_heart_rate_measurement(&[0x01, 0x48]).is_none());
}
