use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which physical transport a device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    Hid,
    Serial,
}

/// Live connection state, derived from the underlying handle rather than
/// tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Closed,
    Open,
    Error,
}

/// One enumerated device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub kind: TransportKind,
    /// Machine identifier: device path (HID) or port name (serial).
    pub id: String,
    /// Human-friendly label; for HID this is the selector string consumed by
    /// [`crate::hid::parse_usb_selector`].
    pub label: String,
}

/// A chunk of bytes as received from hardware, before any decoding.
///
/// Produced by a transport's reception loop and handed off to the decode
/// task; not retained after the decode call.
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub bytes: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl RawPacket {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            received_at: Utc::now(),
        }
    }
}

/// Events a transport publishes to the embedding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TerminalEvent {
    /// One fully decoded packet. Fired asynchronously relative to the caller
    /// that opened the connection.
    DataReceived {
        text: String,
        received_at: DateTime<Utc>,
    },
    /// An observable connection property changed ("PortState", "DeviceName").
    PropertyChanged { property: String },
}
