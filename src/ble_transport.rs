//! BLE transport to a VESC over the Nordic UART service.
//!
//! The controller's BLE module exposes the NordicUART protocol: requests are written to
//! the RX characteristic and responses arrive as notifications on the TX characteristic,
//! split into chunks of whatever size the link negotiated.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use bluest::Adapter;
use bluest::Characteristic;
use bluest::Device;
use bluest::Uuid;
use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};

use crate::error::{Error, Result};
use crate::transport::{Notification, Transport, NOTIFICATION_QUEUE_DEPTH};

pub const NORDIC_UART_SERVICE_ID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
/// Characteristic the host writes requests to
pub const NORDIC_UART_WRITE_CHARACTERISTIC_ID: Uuid =
    Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
/// Characteristic the device notifies responses on
pub const NORDIC_UART_NOTIFY_CHARACTERISTIC_ID: Uuid =
    Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// How long to look for a configured device that was not seen in a discovery window
const FIND_DEVICE_TIMEOUT: Duration = Duration::from_secs(30);

struct Link {
    device: Device,
    write: Characteristic,
    forwarder: JoinHandle<()>,
}

pub struct BleTransport {
    adapter: Adapter,
    discovered: HashMap<String, Device>,
    link: Option<Link>,
}

impl BleTransport {
    /// Open the default Bluetooth adapter and wait for it to be powered.
    pub async fn new() -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| Error::Transport("Default adapter not found".to_string()))?;
        adapter.wait_available().await?;

        Ok(Self { adapter, discovered: HashMap::new(), link: None })
    }

    fn address_of(device: &Device) -> String {
        format!("{:?}", device.id())
    }

    /// Scan until a UART device whose id or advertised name equals `address` shows up
    async fn find_device(&self, address: &str) -> Result<Device> {
        let required_services = [NORDIC_UART_SERVICE_ID];
        let mut adapter_events = self.adapter.scan(&required_services).await?;
        while let Some(advertising) = timeout(FIND_DEVICE_TIMEOUT, adapter_events.next())
            .await
            .map_err(|_| Error::Transport(format!("Device {address} not found")))?
        {
            let device = advertising.device;
            if Self::address_of(&device) == address {
                return Ok(device);
            }
            match device.name_async().await {
                Ok(name) if name == address => return Ok(device),
                _ => {}
            }
        }

        Err(Error::Transport(format!("Device {address} not found")))
    }

    /// Look up the UART characteristics of a connected device and subscribe to its
    /// notifications. Only returns once the subscription is in place.
    async fn open_link(device: &Device) -> Result<(Link, mpsc::Receiver<Notification>)> {
        let nordic_uart_service = device
            .discover_services_with_uuid(NORDIC_UART_SERVICE_ID)
            .await?
            .first()
            .ok_or_else(|| {
                Error::Transport("The device does not support the Nordic UART service".to_string())
            })?
            .clone();
        let write = nordic_uart_service
            .discover_characteristics_with_uuid(NORDIC_UART_WRITE_CHARACTERISTIC_ID)
            .await?
            .first()
            .ok_or_else(|| {
                Error::Transport("The device does not support the Nordic UART write characteristic".to_string())
            })?
            .clone();
        let notify = nordic_uart_service
            .discover_characteristics_with_uuid(NORDIC_UART_NOTIFY_CHARACTERISTIC_ID)
            .await?
            .first()
            .ok_or_else(|| {
                Error::Transport("The device does not support the Nordic UART notify characteristic".to_string())
            })?
            .clone();

        let (tx, rx) = mpsc::channel(NOTIFICATION_QUEUE_DEPTH);
        let (subscribed_tx, subscribed_rx) = oneshot::channel();
        let forwarder = tokio::spawn(forward_notifications(notify, subscribed_tx, tx));
        if let Err(err) = wait_subscribed(subscribed_rx).await {
            forwarder.abort();
            return Err(err);
        }

        Ok((Link { device: device.clone(), write, forwarder }, rx))
    }
}

impl Transport for BleTransport {
    async fn discover(&mut self, window: Duration) -> Result<Vec<String>> {
        let required_services = [NORDIC_UART_SERVICE_ID];
        let mut adapter_events = self.adapter.scan(&required_services).await?;
        let deadline = Instant::now() + window;

        let mut found = Vec::new();
        while let Ok(Some(advertising)) = timeout_at(deadline, adapter_events.next()).await {
            let address = Self::address_of(&advertising.device);
            if !found.contains(&address) {
                log::info!("Found BLE UART {address}");
                found.push(address.clone());
                self.discovered.insert(address, advertising.device);
            }
        }

        Ok(found)
    }

    async fn connect(&mut self, address: &str) -> Result<mpsc::Receiver<Notification>> {
        if let Err(err) = self.disconnect().await {
            log::warn!("Failed to drop previous connection: {err}");
        }

        let device = match self.discovered.get(address) {
            Some(device) => device.clone(),
            None => self.find_device(address).await?,
        };
        self.adapter.connect_device(&device).await?;

        let opened = Self::open_link(&device).await;
        let adapter = &self.adapter;
        let (link, rx) = release_on_error(opened, || async move {
            adapter.disconnect_device(&device).await?;
            Ok(())
        })
        .await?;
        self.link = Some(link);

        Ok(rx)
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let link = self
            .link
            .as_ref()
            .ok_or_else(|| Error::Transport("Not connected".to_string()))?;

        log::debug!("TX: {}", hex::encode(data));
        link.write.write(data).await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(link) = self.link.take() {
            link.forwarder.abort();
            self.adapter.disconnect_device(&link.device).await?;
        }
        Ok(())
    }
}

/// Subscribe to `notify`, report the outcome on `subscribed`, then pump the stream into
/// the session's queue until either side goes away.
async fn forward_notifications(
    notify: Characteristic,
    subscribed: oneshot::Sender<Result<()>>,
    tx: mpsc::Sender<Notification>,
) {
    let reader = match notify.notify().await {
        Ok(reader) => reader,
        Err(err) => {
            let _ = subscribed.send(Err(err.into()));
            return;
        }
    };
    if subscribed.send(Ok(())).is_err() {
        return;
    }

    pump_notifications(reader, tx).await;
}

async fn pump_notifications<S, E>(mut reader: S, tx: mpsc::Sender<Notification>)
where
    S: Stream<Item = std::result::Result<Vec<u8>, E>> + Unpin,
    Error: From<E>,
{
    while let Some(item) = reader.next().await {
        if let Ok(data) = &item {
            log::debug!("RX notification: 0x{}", hex::encode(data));
        }
        if tx.send(item.map_err(Error::from)).await.is_err() {
            break;
        }
    }

    log::debug!("End of notification stream");
}

/// Wait for the forwarder to confirm the subscription
async fn wait_subscribed(subscribed: oneshot::Receiver<Result<()>>) -> Result<()> {
    subscribed
        .await
        .map_err(|_| Error::Transport("Notification forwarder stopped before subscribing".to_string()))?
}

/// Run `release` when `result` is an error, keeping the original error.
async fn release_on_error<T, F, Fut>(result: Result<T>, release: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if result.is_err() {
        if let Err(err) = release().await {
            log::warn!("Failed to release device after connect error: {err}");
        }
    }
    result
}
