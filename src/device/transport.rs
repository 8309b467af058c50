use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{ConnectionState, DeviceDescriptor, Result, TerminalEvent, TransportKind};

/// The uniform surface both transports implement.
///
/// A transport owns one device handle at a time. Selecting a device does not
/// open it; `open` acquires the device exclusively and starts the reception
/// loop, `close` releases the handle and stops it. The open handle is the
/// capability for I/O: writes without it fail with
/// [`DeviceError::NotOpen`](super::DeviceError::NotOpen).
#[async_trait]
pub trait DataDevice: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Enumerate currently attachable devices of this transport kind.
    ///
    /// Reflects live hardware state, never a cached snapshot; safe to call
    /// repeatedly. HID entries use the `"0xVVVV, 0xPPPP: <description>"`
    /// selector shape, serial entries are port names.
    fn list_available_devices(&self) -> Result<Vec<String>>;

    /// The same enumeration as typed descriptors.
    fn descriptors(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Identifier of the currently selected device, empty if none.
    fn device_name(&self) -> String;

    /// Select (but do not open) a device by identifier.
    ///
    /// Selecting while open closes the prior connection first, which is
    /// observable as a `PropertyChanged("PortState")` event preceding the
    /// `PropertyChanged("DeviceName")` one.
    async fn select_device(&self, selector: &str) -> Result<()>;

    fn friendly_name(&self) -> String;

    /// Connection-parameter summary for display purposes.
    fn device_status(&self) -> String;

    /// Derived from the live handle; never independently tracked.
    fn connection_state(&self) -> ConnectionState;

    /// Acquire the selected device exclusively and start reception.
    async fn open(&self) -> Result<()>;

    /// Release the device and stop reception.
    ///
    /// Best-effort: a packet already handed to the decode path may still
    /// publish one more event after close returns.
    async fn close(&self) -> Result<()>;

    /// Write raw bytes, returning how many were actually accepted.
    ///
    /// Transports may truncate to their frame or buffer capacity.
    async fn write(&self, data: &[u8]) -> Result<usize>;

    async fn write_byte(&self, byte: u8) -> Result<usize> {
        self.write(&[byte]).await
    }

    async fn write_char(&self, c: char) -> Result<usize> {
        let mut buf = [0u8; 4];
        self.write(c.encode_utf8(&mut buf).as_bytes()).await
    }

    /// Write a string; the serial transport appends a line terminator.
    async fn write_str(&self, data: &str) -> Result<usize> {
        self.write(data.as_bytes()).await
    }

    /// Subscribe to this transport's [`TerminalEvent`] stream.
    fn subscribe(&self) -> broadcast::Receiver<TerminalEvent>;
}
