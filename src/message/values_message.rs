use crate::config::Config;
use crate::error::{Error, Result};
use crate::telemetry_reading::TelemetryReading;

/// COMM_GET_VALUES_SETUP_SELECTIVE
pub const COMMAND: u8 = 51;

/// Selected fields: FET temp, motor temp, input current, duty cycle, speed, input voltage.
/// The controller answers with the fields in bit order.
pub const FIELD_MASK: u32 = (1 << 0) | (1 << 1) | (1 << 3) | (1 << 4) | (1 << 6) | (1 << 7);

/// The request payload. Responses echo it as their first bytes.
pub const REQUEST: [u8; 5] = request_payload();

const fn request_payload() -> [u8; 5] {
    let mask = FIELD_MASK.to_be_bytes();
    [COMMAND, mask[0], mask[1], mask[2], mask[3]]
}

const OFFSET_FET_TEMP: usize = 5;
const OFFSET_MOTOR_TEMP: usize = 7;
const OFFSET_CURRENT: usize = 9;
const OFFSET_DUTY: usize = 13;
const OFFSET_SPEED: usize = 15;
const OFFSET_VOLTAGE: usize = 19;
/// Bytes needed to read every selected field
pub const MIN_PAYLOAD_LEN: usize = 21;

/// Response to the selective values request
pub struct ValuesMessage<'a>(&'a [u8]);

impl<'a> ValuesMessage<'a> {
    pub fn new(payload: &'a [u8]) -> Result<Self> {
        if payload.len() < MIN_PAYLOAD_LEN {
            return Err(Error::Protocol(format!(
                "Values response has {} bytes, expected at least {MIN_PAYLOAD_LEN}",
                payload.len()
            )));
        }
        Ok(Self(payload))
    }

    pub fn fet_temp_c(&self) -> f64 {
        self.u16_at(OFFSET_FET_TEMP) as f64 / 10.0
    }

    pub fn motor_temp_c(&self) -> f64 {
        self.u16_at(OFFSET_MOTOR_TEMP) as f64 / 10.0
    }

    pub fn battery_current(&self) -> f64 {
        self.i32_at(OFFSET_CURRENT) as f64 / 100.0
    }

    pub fn duty_cycle_pct(&self) -> f64 {
        i16::from_be_bytes([self.0[OFFSET_DUTY], self.0[OFFSET_DUTY + 1]]) as f64 / 10.0
    }

    /// Speed in m/s
    pub fn speed_mps(&self) -> f64 {
        self.i32_at(OFFSET_SPEED) as f64 / 1000.0
    }

    pub fn pack_voltage(&self) -> f64 {
        self.u16_at(OFFSET_VOLTAGE) as f64 / 10.0
    }

    pub fn reading(&self, config: &Config) -> TelemetryReading {
        let pack_voltage = self.pack_voltage();
        let cell_voltage = cell_voltage(pack_voltage, config);
        TelemetryReading {
            speed: self.speed_mps() * config.unit.factor(),
            speed_unit: config.unit,
            duty_cycle_pct: self.duty_cycle_pct(),
            pack_voltage,
            cell_voltage,
            battery_current: self.battery_current(),
            battery_pct: battery_pct(cell_voltage, config),
            fet_temp_c: self.fet_temp_c(),
            motor_temp_c: self.motor_temp_c(),
        }
    }

    fn u16_at(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.0[offset], self.0[offset + 1]])
    }

    fn i32_at(&self, offset: usize) -> i32 {
        i32::from_be_bytes([
            self.0[offset],
            self.0[offset + 1],
            self.0[offset + 2],
            self.0[offset + 3],
        ])
    }
}

/// Decode a validated response payload into a reading
pub fn decode(payload: &[u8], config: &Config) -> Result<TelemetryReading> {
    Ok(ValuesMessage::new(payload)?.reading(config))
}

pub(crate) fn cell_voltage(pack_voltage: f64, config: &Config) -> f64 {
    pack_voltage / config.cell_series as f64
}

/// Linear state of charge between `cell_min` and `cell_max`, clamped to 0..=100
pub(crate) fn battery_pct(cell_voltage: f64, config: &Config) -> u8 {
    let pct = (cell_voltage - config.cell_min) / (config.cell_max - config.cell_min) * 100.0;
    pct.clamp(0.0, 100.0).round() as u8
}

#[cfg(test)]
fn response(fet: u16, motor: u16, current: i32, duty: i16, speed: i32, voltage: u16) -> Vec<u8> {
    let mut payload = REQUEST.to_vec();
    payload.extend_from_slice(&fet.to_be_bytes());
    payload.extend_from_slice(&motor.to_be_bytes());
    payload.extend_from_slice(&current.to_be_bytes());
    payload.extend_from_slice(&duty.to_be_bytes());
    payload.extend_from_slice(&speed.to_be_bytes());
    payload.extend_from_slice(&voltage.to_be_bytes());
    payload
}

#[cfg(test)]
fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
}

#[test]
fn test_request_payload() {
    assert_eq!(hex::encode(REQUEST), "33000000db");
}

#[test]
fn test_decode_fields() {
    let payload = response(352, 401, -1250, 455, 5000, 517);
    let reading = decode(&payload, &Config::default()).unwrap();
    assert_close(reading.fet_temp_c, 35.2);
    assert_close(reading.motor_temp_c, 40.1);
    assert_close(reading.battery_current, -12.5);
    assert_close(reading.duty_cycle_pct, 45.5);
    assert_close(reading.speed, 18.0);
    assert_close(reading.pack_voltage, 51.7);
    assert_close(reading.cell_voltage, 51.7 / 15.0);
}

#[test]
fn test_decode_fixture() {
    let payload = hex::decode("33000000db01600191fffffb1e01c7000013880205").unwrap();
    let reading = decode(&payload, &Config::default()).unwrap();
    assert_close(reading.battery_current, -12.5);
    assert_close(reading.pack_voltage, 51.7);
}

#[test]
fn test_speed_units() {
    let payload = response(0, 0, 0, 0, 5000, 0);
    let mut config = Config::default();
    assert_close(decode(&payload, &config).unwrap().speed, 18.0);
    config.unit = crate::config::SpeedUnit::Mph;
    let reading = decode(&payload, &config).unwrap();
    assert_close(reading.speed, 11.185);
    assert_eq!(reading.speed_unit.label(), "mph");
}

#[test]
fn test_battery_pct() {
    let config = Config::default();
    let cell = cell_voltage(15.0 * 3.45, &config);
    assert_close(cell, 3.45);
    assert_eq!(battery_pct(cell, &config), 50);
    assert_eq!(battery_pct(cell_voltage(63.0, &config), &config), 100);
    assert_eq!(battery_pct(cell_voltage(70.0, &config), &config), 100);
    assert_eq!(battery_pct(cell_voltage(30.0, &config), &config), 0);
}

#[test]
fn test_short_payload() {
    let payload = response(0, 0, 0, 0, 0, 0);
    assert!(matches!(decode(&payload[..20], &Config::default()), Err(Error::Protocol(_))));
}

#[test]
fn test_trailing_bytes_ignored() {
    let mut payload = response(0, 0, 0, 0, 0, 630);
    payload.extend_from_slice(&[0xff, 0xff]);
    assert_eq!(decode(&payload, &Config::default()).unwrap().battery_pct, 100);
}
