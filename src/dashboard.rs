//! Where readings and connection status end up.

use std::io::Write;

use crate::telemetry_reading::TelemetryReading;

/// Receiver of everything the session wants the user to see
pub trait Dashboard {
    /// A connection status change or failure
    fn status(&mut self, message: &str);

    /// A fresh reading
    fn render(&mut self, reading: &TelemetryReading);

    /// Give the terminal back before exit
    fn restore(&mut self);
}

/// The eight metric lines shown for a reading
pub fn metric_lines(reading: &TelemetryReading) -> [String; 8] {
    [
        format!("Speed: {:.1} {}", reading.speed.abs(), reading.speed_unit.label()),
        format!("Duty cycle: {}%", reading.duty_cycle_pct.abs().round() as i64),
        format!("Pack Voltage: {:.2} V", reading.pack_voltage),
        format!("Average cell voltage: {:.2} V", reading.cell_voltage),
        format!("Battery current: {:.2} A", reading.battery_current),
        format!("Battery percentage: {}%", reading.battery_pct),
        format!("Temp FET: {:.0}°C", reading.fet_temp_c),
        format!("Temp MOT: {:.0}°C", reading.motor_temp_c),
    ]
}

/// Prints readings to stdout, redrawing in place on terminals that understand ANSI
/// escapes.
#[derive(Debug, Default)]
pub struct TerminalDashboard {
    drawn: bool,
}

impl TerminalDashboard {
    const CLEAR_SCREEN: &'static str = "\x1b[2J\x1b[H";
    const HIDE_CURSOR: &'static str = "\x1b[?25l";
    const SHOW_CURSOR: &'static str = "\x1b[?25h";

    pub fn new() -> Self {
        Self::default()
    }
}

impl Dashboard for TerminalDashboard {
    fn status(&mut self, message: &str) {
        if self.drawn {
            print!("{}{}", Self::CLEAR_SCREEN, Self::SHOW_CURSOR);
            self.drawn = false;
        }
        println!("{message}");
    }

    fn render(&mut self, reading: &TelemetryReading) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "{}{}", Self::HIDE_CURSOR, Self::CLEAR_SCREEN);
        for line in metric_lines(reading) {
            let _ = writeln!(out, "{line}");
        }
        let _ = out.flush();
        self.drawn = true;
    }

    fn restore(&mut self) {
        print!("{}", Self::SHOW_CURSOR);
        let _ = std::io::stdout().flush();
        self.drawn = false;
    }
}

#[test]
fn test_metric_lines() {
    let reading = TelemetryReading {
        speed: -18.04,
        speed_unit: crate::config::SpeedUnit::Kmh,
        duty_cycle_pct: -45.5,
        pack_voltage: 51.7,
        cell_voltage: 51.7 / 15.0,
        battery_current: -12.5,
        battery_pct: 49,
        fet_temp_c: 35.2,
        motor_temp_c: 40.1,
    };
    let lines = metric_lines(&reading);
    assert_eq!(lines[0], "Speed: 18.0 km/h");
    assert_eq!(lines[1], "Duty cycle: 46%");
    assert_eq!(lines[2], "Pack Voltage: 51.70 V");
    assert_eq!(lines[3], "Average cell voltage: 3.45 V");
    assert_eq!(lines[4], "Battery current: -12.50 A");
    assert_eq!(lines[5], "Battery percentage: 49%");
    assert_eq!(lines[6], "Temp FET: 35°C");
    assert_eq!(lines[7], "Temp MOT: 40°C");
}
