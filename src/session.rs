//! Connection lifecycle and the request/response loop.
//!
//! ```text
//! Scanning -> Connecting -> Active
//!    ^                        |
//!    +------- Backoff <-------+   (any transport failure)
//! ```
//!
//! The loop never gives up on its own: every transport failure leads to a pause and a
//! fresh scan. Only a shutdown signal, or an empty scan under `on_no_device = "exit"`,
//! ends it.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};

use crate::config::{Config, NoDevicePolicy};
use crate::dashboard::Dashboard;
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameVariant};
use crate::message::values_message;
use crate::reassembler::StreamReassembler;
use crate::transport::{Notification, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Scanning,
    Connecting(String),
    Active,
    /// Waiting out a failure, with the reason
    Backoff(String),
}

pub struct SessionManager<'a, T, D> {
    config: &'a Config,
    transport: T,
    dashboard: D,
    state: SessionState,
    reassembler: StreamReassembler,
    notifications: Option<mpsc::Receiver<Notification>>,
    /// Wire bytes of the one request this session sends
    request_frame: Vec<u8>,
    /// Payload of the last request written
    pending: Option<Vec<u8>>,
}

impl<'a, T: Transport, D: Dashboard> SessionManager<'a, T, D> {
    pub fn new(config: &'a Config, transport: T, dashboard: D) -> Result<Self> {
        let request_frame = Frame::encode(FrameVariant::Small, &values_message::REQUEST)?;
        Ok(Self {
            config,
            transport,
            dashboard,
            state: SessionState::Scanning,
            reassembler: StreamReassembler::new(),
            notifications: None,
            request_frame,
            pending: None,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn reassembler(&self) -> &StreamReassembler {
        &self.reassembler
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn dashboard(&self) -> &D {
        &self.dashboard
    }

    /// Run until `shutdown` resolves, then close the link and restore the dashboard.
    pub async fn run<F: Future<Output = ()>>(&mut self, shutdown: F) -> Result<()> {
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Shutting down");
                    break Ok(());
                }
                stepped = self.step() => {
                    if let Err(err) = stepped {
                        break Err(err);
                    }
                }
            }
        };

        self.teardown().await;
        result
    }

    /// Perform the work of the current state and move to the next one.
    ///
    /// `Active` only returns once the connection failed.
    pub async fn step(&mut self) -> Result<&SessionState> {
        let current = std::mem::replace(&mut self.state, SessionState::Scanning);
        let next = match current {
            SessionState::Scanning => self.scan().await?,
            SessionState::Connecting(address) => self.connect(&address).await,
            SessionState::Active => self.active().await,
            SessionState::Backoff(reason) => self.backoff(&reason).await,
        };
        log::debug!("Session state: {next:?}");
        self.state = next;
        Ok(&self.state)
    }

    async fn scan(&mut self) -> Result<SessionState> {
        if let Some(address) = self.config.fixed_address() {
            return Ok(SessionState::Connecting(address.to_string()));
        }

        self.dashboard.status("Scanning for BLE UART interfaces...");
        let found = match self.transport.discover(self.config.session.scan_window()).await {
            Ok(found) => found,
            Err(err) => return Ok(SessionState::Backoff(format!("Scan failed: {err}"))),
        };

        // First seen wins. Arrival order depends on radio timing.
        match found.into_iter().next() {
            Some(address) => {
                self.dashboard.status(&format!("Connecting to {address}"));
                Ok(SessionState::Connecting(address))
            }
            None => match self.config.session.on_no_device {
                NoDevicePolicy::Retry => Ok(SessionState::Backoff("No BLE UART found".to_string())),
                NoDevicePolicy::Exit => {
                    self.dashboard.status("No BLE UART found");
                    Err(Error::NoDeviceFound)
                }
            },
        }
    }

    async fn connect(&mut self, address: &str) -> SessionState {
        match self.transport.connect(address).await {
            Ok(notifications) => {
                self.reassembler.reset();
                self.pending = None;
                self.notifications = Some(notifications);
                log::info!("Connected to {address}");
                self.dashboard.status(&format!("Connected to {address}"));
                SessionState::Active
            }
            Err(err) => SessionState::Backoff(format!("Connecting to {address} failed: {err}")),
        }
    }

    async fn active(&mut self) -> SessionState {
        let Some(mut notifications) = self.notifications.take() else {
            return SessionState::Backoff("Not connected".to_string());
        };

        let mut ticker = interval(self.config.session.request_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                notification = notifications.recv() => match notification {
                    Some(Ok(chunk)) => self.on_notification(&chunk),
                    Some(Err(err)) => return SessionState::Backoff(format!("Notification failed: {err}")),
                    None => return SessionState::Backoff("Notification stream closed".to_string()),
                },
                _ = ticker.tick() => {
                    if let Err(err) = self.send_request().await {
                        return SessionState::Backoff(format!("Write failed: {err}"));
                    }
                }
            }
        }
    }

    async fn backoff(&mut self, reason: &str) -> SessionState {
        log::warn!("{reason}");
        self.dashboard.status(&format!("error: {reason}"));

        self.notifications = None;
        self.pending = None;
        self.reassembler.reset();
        if let Err(err) = self.transport.disconnect().await {
            log::debug!("Disconnect after failure: {err}");
        }

        sleep(self.config.session.retry_delay()).await;
        SessionState::Scanning
    }

    async fn send_request(&mut self) -> Result<()> {
        self.transport.write(&self.request_frame).await?;
        self.pending = Some(values_message::REQUEST.to_vec());
        Ok(())
    }

    fn on_notification(&mut self, chunk: &[u8]) {
        self.reassembler.append(chunk);
        for frame in self.reassembler.extract_frames() {
            let answers_request = matches!(&self.pending, Some(request) if frame.payload.starts_with(request));
            if !answers_request {
                log::debug!("Ignoring unsolicited frame {}", hex::encode(&frame.payload));
                continue;
            }

            match values_message::decode(&frame.payload, self.config) {
                Ok(reading) => self.dashboard.render(&reading),
                Err(err) => log::debug!("Dropping response: {err}"),
            }
        }
    }

    async fn teardown(&mut self) {
        self.notifications = None;
        if let Err(err) = self.transport.disconnect().await {
            log::warn!("Disconnect failed: {err}");
        }
        self.dashboard.restore();
    }
}
