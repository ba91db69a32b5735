//! Error types for vescread

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// vescread error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bluetooth stack error
    #[error("Bluetooth error: {0}")]
    Ble(#[from] bluest::Error),

    /// Link level failure (connect, write, notify, scan)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or corrupted frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The large frame variant is not implemented
    #[error("Unsupported frame variant")]
    UnsupportedVariant,

    /// Payload does not fit a small frame
    #[error("Payload of {0} bytes does not fit a small frame")]
    PayloadTooLarge(usize),

    /// Discovery window ended without a matching device
    #[error("No BLE UART device found")]
    NoDeviceFound,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
