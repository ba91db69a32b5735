//! Read live telemetry from VESC motor controllers over Bluetooth Low Energy
//!
//! The controller's BLE module tunnels the VESC serial protocol over the NordicUART
//! service. Every 200ms a selective values request is written to the device; the
//! responses are reassembled from notification chunks, checked, decoded and shown on a
//! dashboard.
//!
//! Currently the following data is read:
//!
//! - Speed (km/h or mph)
//! - Duty cycle (%)
//! - Pack voltage and average cell voltage (V)
//! - Battery current (A)
//! - Battery percentage (%), estimated from the cell voltage
//! - FET and motor temperature (°C)
//!
//! # Example
//!
//! ```no_run
//! # #[tokio::main(flavor = "current_thread")]
//! # pub async fn main() -> vescread::Result<()> {
//!     let config = vescread::Config::default();
//!     let transport = vescread::BleTransport::new().await?;
//!     let dashboard = vescread::TerminalDashboard::new();
//!     let mut session = vescread::SessionManager::new(&config, transport, dashboard)?;
//!     session.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! #   Ok(())
//! # }
//! ```

pub mod ble_transport;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod frame;
pub mod message;
pub mod reassembler;
pub mod session;
mod telemetry_reading;
pub mod transport;

pub use ble_transport::BleTransport;
pub use config::{Config, NoDevicePolicy, SessionConfig, SpeedUnit};
pub use dashboard::{Dashboard, TerminalDashboard};
pub use error::{Error, Result};
pub use frame::{Frame, FrameVariant};
pub use reassembler::StreamReassembler;
pub use session::{SessionManager, SessionState};
pub use telemetry_reading::TelemetryReading;
pub use transport::{Notification, Transport};
