use std::time::Duration;

use tokio::sync::mpsc;
use vescread::message::values_message::REQUEST;
use vescread::{
    Config, Dashboard, Error, Frame, FrameVariant, NoDevicePolicy, Notification, SessionManager,
    SessionState, TelemetryReading, Transport,
};

#[derive(Default)]
struct MockTransport {
    discovered: Vec<String>,
    fail_connects: usize,
    fail_writes: usize,
    close_on_connect: bool,
    fail_discover: bool,
    /// Error delivered on the notification channel after the preloaded chunks
    notify_error: Option<String>,
    /// Chunks delivered right after connecting
    preload: Vec<Vec<u8>>,
    /// Chunks delivered after every successful write
    responses: Vec<Vec<u8>>,
    tx: Option<mpsc::Sender<Notification>>,

    discovers: usize,
    connects: Vec<String>,
    writes: Vec<Vec<u8>>,
    disconnects: usize,
}

impl Transport for MockTransport {
    async fn discover(&mut self, _window: Duration) -> vescread::Result<Vec<String>> {
        self.discovers += 1;
        if self.fail_discover {
            return Err(Error::Transport("adapter powered off".to_string()));
        }
        Ok(self.discovered.clone())
    }

    async fn connect(&mut self, address: &str) -> vescread::Result<mpsc::Receiver<Notification>> {
        self.connects.push(address.to_string());
        if self.fail_connects > 0 {
            self.fail_connects -= 1;
            return Err(Error::Transport("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        for chunk in &self.preload {
            tx.try_send(Ok(chunk.clone())).unwrap();
        }
        if let Some(message) = &self.notify_error {
            tx.try_send(Err(Error::Transport(message.clone()))).unwrap();
        }
        if !self.close_on_connect {
            self.tx = Some(tx);
        }
        Ok(rx)
    }

    async fn write(&mut self, data: &[u8]) -> vescread::Result<()> {
        self.writes.push(data.to_vec());
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(Error::Transport("write failed".to_string()));
        }

        if let Some(tx) = &self.tx {
            for chunk in &self.responses {
                tx.try_send(Ok(chunk.clone())).unwrap();
            }
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> vescread::Result<()> {
        self.disconnects += 1;
        self.tx = None;
        Ok(())
    }
}

#[derive(Default)]
struct MockDashboard {
    statuses: Vec<String>,
    readings: Vec<TelemetryReading>,
    restored: bool,
}

impl Dashboard for MockDashboard {
    fn status(&mut self, message: &str) {
        self.statuses.push(message.to_string());
    }

    fn render(&mut self, reading: &TelemetryReading) {
        self.readings.push(reading.clone());
    }

    fn restore(&mut self) {
        self.restored = true;
    }
}

fn fixed_config() -> Config {
    Config { address: "vesc".to_string(), ..Config::default() }
}

fn values_payload(speed: i32, voltage: u16) -> Vec<u8> {
    let mut payload = REQUEST.to_vec();
    payload.extend_from_slice(&250u16.to_be_bytes());
    payload.extend_from_slice(&300u16.to_be_bytes());
    payload.extend_from_slice(&1000i32.to_be_bytes());
    payload.extend_from_slice(&200i16.to_be_bytes());
    payload.extend_from_slice(&speed.to_be_bytes());
    payload.extend_from_slice(&voltage.to_be_bytes());
    payload
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_backs_off_once() {
    let config = fixed_config();
    let transport = MockTransport {
        fail_writes: 1,
        preload: vec![vec![0x02, 0x15, 0x33]],
        ..Default::default()
    };
    let mut session = SessionManager::new(&config, transport, MockDashboard::default()).unwrap();

    assert_eq!(session.step().await.unwrap(), &SessionState::Connecting("vesc".to_string()));
    assert_eq!(session.step().await.unwrap(), &SessionState::Active);

    let state = session.step().await.unwrap().clone();
    assert!(matches!(&state, SessionState::Backoff(reason) if reason.contains("write failed")));
    assert_eq!(session.reassembler().len(), 3);
    assert_eq!(session.transport().writes.len(), 1);

    assert_eq!(session.step().await.unwrap(), &SessionState::Scanning);
    assert!(session.reassembler().is_empty());
    assert_eq!(session.transport().disconnects, 1);
    let errors = session.dashboard().statuses.iter().filter(|s| s.starts_with("error:")).count();
    assert_eq!(errors, 1);

    assert_eq!(session.step().await.unwrap(), &SessionState::Connecting("vesc".to_string()));
    assert_eq!(session.step().await.unwrap(), &SessionState::Active);
    assert_eq!(session.transport().connects.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_scan_picks_first_found() {
    let config = Config::default();
    let transport = MockTransport {
        discovered: vec!["first".to_string(), "second".to_string()],
        ..Default::default()
    };
    let mut session = SessionManager::new(&config, transport, MockDashboard::default()).unwrap();

    assert_eq!(session.step().await.unwrap(), &SessionState::Connecting("first".to_string()));
    assert_eq!(session.transport().discovers, 1);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_address_skips_discovery() {
    let config = fixed_config();
    let mut session =
        SessionManager::new(&config, MockTransport::default(), MockDashboard::default()).unwrap();

    session.step().await.unwrap();
    assert_eq!(session.transport().discovers, 0);
}

#[tokio::test(start_paused = true)]
async fn test_empty_scan_exit_policy() {
    let mut config = Config::default();
    config.session.on_no_device = NoDevicePolicy::Exit;
    let mut session =
        SessionManager::new(&config, MockTransport::default(), MockDashboard::default()).unwrap();

    assert!(matches!(session.step().await, Err(Error::NoDeviceFound)));
}

#[tokio::test(start_paused = true)]
async fn test_empty_scan_retry_policy() {
    let config = Config::default();
    let mut session =
        SessionManager::new(&config, MockTransport::default(), MockDashboard::default()).unwrap();

    assert!(matches!(session.step().await.unwrap(), SessionState::Backoff(_)));
    assert_eq!(session.step().await.unwrap(), &SessionState::Scanning);
    session.step().await.unwrap();
    assert_eq!(session.transport().discovers, 2);
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_backs_off() {
    let config = fixed_config();
    let transport = MockTransport { fail_connects: 1, ..Default::default() };
    let mut session = SessionManager::new(&config, transport, MockDashboard::default()).unwrap();

    session.step().await.unwrap();
    assert!(matches!(session.step().await.unwrap(), SessionState::Backoff(_)));
    assert_eq!(session.step().await.unwrap(), &SessionState::Scanning);
}

#[tokio::test(start_paused = true)]
async fn test_closed_notification_stream_backs_off() {
    let config = fixed_config();
    let transport = MockTransport { close_on_connect: true, ..Default::default() };
    let mut session = SessionManager::new(&config, transport, MockDashboard::default()).unwrap();

    session.step().await.unwrap();
    session.step().await.unwrap();
    let state = session.step().await.unwrap().clone();
    assert!(matches!(&state, SessionState::Backoff(reason) if reason.contains("closed")));
}

#[tokio::test(start_paused = true)]
async fn test_notification_error_backs_off() {
    let config = fixed_config();
    let transport = MockTransport {
        preload: vec![vec![0x02, 0x15, 0x33]],
        notify_error: Some("link lost".to_string()),
        ..Default::default()
    };
    let mut session = SessionManager::new(&config, transport, MockDashboard::default()).unwrap();

    session.step().await.unwrap();
    assert_eq!(session.step().await.unwrap(), &SessionState::Active);
    let state = session.step().await.unwrap().clone();
    assert!(matches!(&state, SessionState::Backoff(reason) if reason.contains("link lost")));
    assert!(session.transport().writes.is_empty());

    assert_eq!(session.step().await.unwrap(), &SessionState::Scanning);
    assert!(session.reassembler().is_empty());
    assert_eq!(session.transport().disconnects, 1);
}

#[tokio::test(start_paused = true)]
async fn test_discovery_error_backs_off() {
    let config = Config::default();
    let transport = MockTransport { fail_discover: true, ..Default::default() };
    let mut session = SessionManager::new(&config, transport, MockDashboard::default()).unwrap();

    let state = session.step().await.unwrap().clone();
    assert!(matches!(&state, SessionState::Backoff(reason) if reason.contains("adapter powered off")));
    assert!(session.transport().connects.is_empty());
    assert_eq!(session.step().await.unwrap(), &SessionState::Scanning);
}

#[tokio::test(start_paused = true)]
async fn test_run_renders_correlated_responses() {
    let config = fixed_config();

    let unsolicited = Frame::encode(FrameVariant::Small, &[0x04, 0x01, 0x02]).unwrap();
    let response = Frame::encode(FrameVariant::Small, &values_payload(5000, 517)).unwrap();
    let (head, tail) = response.split_at(4);
    let (middle, tail) = tail.split_at(10);
    let transport = MockTransport {
        responses: vec![unsolicited, head.to_vec(), middle.to_vec(), tail.to_vec()],
        ..Default::default()
    };
    let mut session = SessionManager::new(&config, transport, MockDashboard::default()).unwrap();

    session.run(tokio::time::sleep(Duration::from_secs(1))).await.unwrap();

    let writes = &session.transport().writes;
    assert!(writes.len() >= 4, "only {} requests sent", writes.len());
    assert_eq!(hex::encode(&writes[0]), "020533000000db982a03");

    let readings = &session.dashboard().readings;
    assert!(!readings.is_empty());
    let reading = &readings[0];
    assert!((reading.speed - 18.0).abs() < 1e-9);
    assert!((reading.pack_voltage - 51.7).abs() < 1e-9);
    assert!((reading.battery_current - 10.0).abs() < 1e-9);
    assert!((reading.duty_cycle_pct - 20.0).abs() < 1e-9);
    assert!((reading.fet_temp_c - 25.0).abs() < 1e-9);
    assert!((reading.motor_temp_c - 30.0).abs() < 1e-9);
    assert_eq!(reading.battery_pct, 50);
    assert!(readings.iter().all(|r| r == reading));

    assert!(session.dashboard().restored);
    assert!(session.transport().disconnects >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_responses_before_first_request_are_ignored() {
    let config = fixed_config();
    let response = Frame::encode(FrameVariant::Small, &values_payload(1000, 600)).unwrap();
    let transport = MockTransport { preload: vec![response], fail_writes: 1, ..Default::default() };
    let mut session = SessionManager::new(&config, transport, MockDashboard::default()).unwrap();

    session.step().await.unwrap();
    session.step().await.unwrap();
    session.step().await.unwrap();
    assert!(session.dashboard().readings.is_empty());
}
