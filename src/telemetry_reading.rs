use crate::config::SpeedUnit;

/// One decoded telemetry snapshot from the controller
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryReading {
    /// Vehicle speed in `speed_unit`. Negative when rolling backwards.
    pub speed: f64,
    pub speed_unit: SpeedUnit,
    /// Duty cycle in %
    pub duty_cycle_pct: f64,
    /// Pack voltage in V
    pub pack_voltage: f64,
    /// Average cell voltage in V
    pub cell_voltage: f64,
    /// Battery current in A
    pub battery_current: f64,
    /// Remaining charge in %, 0 to 100
    pub battery_pct: u8,
    /// MOSFET temperature in °C
    pub fet_temp_c: f64,
    /// Motor temperature in °C
    pub motor_temp_c: f64,
}
