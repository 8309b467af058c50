use std::sync::Arc;

use termlink::decode::InterpreterRegistry;
use termlink::device::{ConnectionState, DataDevice, DeviceError, TerminalEvent};
use termlink::serial::{DataBits, Parity, SerialTransport, StopBits};

fn transport() -> SerialTransport {
    SerialTransport::new(Arc::new(InterpreterRegistry::new()))
}

#[tokio::test]
async fn selecting_a_port_fires_device_name_change() {
    let transport = transport();
    let mut events = transport.subscribe();

    transport.select_device("/dev/ttyUSB7").await.unwrap();
    assert_eq!(transport.device_name(), "/dev/ttyUSB7");
    assert_eq!(transport.friendly_name(), "/dev/ttyUSB7");

    match events.recv().await.unwrap() {
        TerminalEvent::PropertyChanged { property } => assert_eq!(property, "DeviceName"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn settings_apply_while_closed() {
    let transport = transport();
    transport.set_baud_rate(9600).unwrap();
    transport.set_data_bits(DataBits::Seven).unwrap();
    transport.set_parity(Parity::Even).unwrap();
    transport.set_stop_bits(StopBits::Two).unwrap();

    let settings = transport.settings();
    assert_eq!(settings.baud_rate, 9600);
    assert_eq!(settings.data_bits, DataBits::Seven);
    assert_eq!(transport.device_status(), "7;E;2");
}

#[tokio::test]
async fn status_summary_is_recomputed_after_framing_changes() {
    let transport = transport();
    assert_eq!(transport.device_status(), "8;N;1");

    transport.set_parity(Parity::Odd).unwrap();
    assert_eq!(transport.device_status(), "8;O;1");

    transport.set_data_bits(DataBits::Five).unwrap();
    transport.set_stop_bits(StopBits::OnePointFive).unwrap();
    assert_eq!(transport.device_status(), "5;O;1.5");
}

#[tokio::test]
async fn writes_on_a_closed_port_are_rejected() {
    let transport = transport();
    assert!(matches!(
        transport.write(b"x").await,
        Err(DeviceError::NotOpen)
    ));
    assert!(matches!(
        transport.write_str("line").await,
        Err(DeviceError::NotOpen)
    ));
    assert_eq!(transport.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn enumeration_is_live_and_safe_to_repeat() {
    let transport = transport();
    // Enumeration reflects live state and must be repeatable; with no
    // hardware attached it simply comes back empty.
    transport.list_available_devices().unwrap();
    transport.list_available_devices().unwrap();
    transport.descriptors().unwrap();
}

#[tokio::test]
async fn closing_a_closed_port_is_a_no_op() {
    let transport = transport();
    transport.close().await.unwrap();
    assert_eq!(transport.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn opening_a_missing_port_reports_device_unavailable() {
    let transport = transport();
    transport
        .select_device("/dev/ttyTERMLINK-does-not-exist")
        .await
        .unwrap();

    match transport.open().await {
        // Expected: no such port.
        Err(DeviceError::DeviceUnavailable(_)) => {}
        // Some platforms report a nonexistent path as a plain IO failure;
        // either way the open fails and the state stays Closed.
        Err(_) => {}
        Ok(()) => panic!("open of a nonexistent port should fail"),
    }
    assert_eq!(transport.connection_state(), ConnectionState::Closed);
}
