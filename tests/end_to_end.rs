//! End-to-end: supervisor brings the link up, then a pass is tracked over it.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rot2prog_tracker::config::RotorConfig;
use rot2prog_tracker::hardware::mock_serial::{self, MockSerialPort};
use rot2prog_tracker::hardware::rot2prog::protocol::{response_bytes, Command, COMMAND_LEN};
use rot2prog_tracker::hardware::rot2prog::Resolution;
use rot2prog_tracker::hardware::serial::DynSerial;
use rot2prog_tracker::supervisor::{ConnectionState, ConnectionSupervisor, Connector};
use rot2prog_tracker::tracking::{JobState, MonotonicClock, TrackingScheduler, Waypoint};
use rot2prog_tracker::{RotorError, RotorResult};
use std::sync::Arc;
use std::time::Duration;

/// Hands out a pre-built mock port once.
struct MockConnector {
    port: Mutex<Option<MockSerialPort>>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self) -> RotorResult<DynSerial> {
        match self.port.lock().take() {
            Some(port) => Ok(Box::new(port)),
            None => Err(RotorError::Connect("mock port already taken".into())),
        }
    }

    fn describe(&self) -> String {
        "mock rotor".into()
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_then_track_pass() {
    let config = RotorConfig::default();
    let (port, mut harness) = mock_serial::new();
    let supervisor = ConnectionSupervisor::new(
        MockConnector {
            port: Mutex::new(Some(port)),
        },
        config.limits,
        config.link_timing(),
        config.retry_delay(),
    );
    let states = supervisor.subscribe();

    let connecting = tokio::spawn(supervisor.connect());

    // Controller reports 4 pulses per degree
    let res = Resolution::try_from(4).unwrap();
    let status = Command::Status.encode(Resolution::default()).unwrap();
    harness
        .expect_and_respond(status.as_bytes(), &response_bytes(0.0, 0.0, res))
        .await;

    let rotor = connecting.await.unwrap();
    assert_eq!(*states.borrow(), ConnectionState::Connected);
    assert_eq!(rotor.resolution(), res);

    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let scheduler = TrackingScheduler::new(
        rotor.clone(),
        Arc::new(MonotonicClock::starting_at(t0)),
        config.tracking_interval(),
    );
    let pass = vec![
        Waypoint::new(t0, 120.0, 5.0),
        Waypoint::new(t0 + chrono::Duration::seconds(2), 122.5, 12.25),
    ];
    scheduler.start(pass).await;

    let report = scheduler.wait().await.unwrap();
    assert_eq!(report.state, JobState::Completed);
    assert_eq!(report.commanded, 2);

    // Set packets use the resolution learned while connecting
    let first = harness.next_write(COMMAND_LEN).await;
    assert_eq!(&first[1..5], b"1920");
    assert_eq!(first[5], 4);
    assert_eq!(&first[6..10], b"1460");
    let second = harness.next_write(COMMAND_LEN).await;
    assert_eq!(&second[1..5], b"1930");
    assert_eq!(&second[6..10], b"1489");
    assert_eq!(second[11], 0x2F);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(harness.pending_writes().is_empty());
}
