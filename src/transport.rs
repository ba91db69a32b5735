//! The link to the controller, as seen by the session.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::Result;

/// One notification from the device: a raw chunk of the byte stream, or the error
/// that ended the stream.
pub type Notification = Result<Vec<u8>>;

/// Depth of the queue between the notification stream and the session loop
pub const NOTIFICATION_QUEUE_DEPTH: usize = 64;

/// A serial tunnel to the controller.
///
/// Notifications are delivered through the channel returned by `connect`, in the order
/// the link produced them. The channel closing means the link is gone.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Listen for devices advertising the UART service for `window`.
    ///
    /// Returns distinct addresses in the order they were first seen.
    async fn discover(&mut self, window: Duration) -> Result<Vec<String>>;

    /// Connect to `address` and subscribe to its notifications.
    async fn connect(&mut self, address: &str) -> Result<mpsc::Receiver<Notification>>;

    /// Write one request to the device
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Drop the connection, if any
    async fn disconnect(&mut self) -> Result<()>;
}
