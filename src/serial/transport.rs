use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use serialport::SerialPort;
use tokio::sync::{broadcast, mpsc};

use super::{DataBits, FlowControl, Parity, SerialSettings, StopBits};
use crate::decode::{InterpreterRegistry, PassthroughPreparser};
use crate::device::{
    ConnectionState, DataDevice, DeviceDescriptor, DeviceError, RawPacket, Result, TerminalEvent,
    TransportKind,
};
use crate::dispatch;

/// Bytes drained from the port per receive notification.
pub const RECEIVE_BUFFER_SIZE: usize = 1024;
/// Default cap on one write call, matching common driver write buffers.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 2048;

const EVENT_CAPACITY: usize = 256;
/// Poll interval while waiting for the byte-arrival notification.
const RECEIVE_POLL: Duration = Duration::from_millis(5);
const OPEN_TIMEOUT: Duration = Duration::from_millis(100);

type SharedPort = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

/// UART-style transport over one persistent connection object.
///
/// Parameters are mutable only while closed. Reception is notification
/// driven: the reader thread drains at most [`RECEIVE_BUFFER_SIZE`] bytes per
/// notification into a reusable buffer and hands an exact-size copy to the
/// decode task, leaving any remainder for the next notification.
pub struct SerialTransport {
    port_name: Mutex<String>,
    settings: Mutex<SerialSettings>,
    // Lazily recomputed summary, invalidated by framing-parameter changes.
    device_status: Mutex<Option<String>>,
    write_buffer_size: AtomicUsize,
    port: SharedPort,
    running: Arc<AtomicBool>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    packet_tx: mpsc::UnboundedSender<RawPacket>,
    events_tx: broadcast::Sender<TerminalEvent>,
}

impl SerialTransport {
    /// Create a transport wired to the shared interpreter registry.
    ///
    /// Spawns the decode task, so this must be called inside a tokio runtime.
    pub fn new(registry: Arc<InterpreterRegistry>) -> Self {
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        dispatch::spawn_decode_task(
            packet_rx,
            Box::new(PassthroughPreparser),
            registry,
            events_tx.clone(),
        );

        Self {
            port_name: Mutex::new(String::new()),
            settings: Mutex::new(SerialSettings::default()),
            device_status: Mutex::new(None),
            write_buffer_size: AtomicUsize::new(DEFAULT_WRITE_BUFFER_SIZE),
            port: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            reader_handle: Mutex::new(None),
            packet_tx,
            events_tx,
        }
    }

    pub fn settings(&self) -> SerialSettings {
        self.lock_settings().clone()
    }

    pub fn baud_rate(&self) -> u32 {
        self.lock_settings().baud_rate
    }

    pub fn set_baud_rate(&self, baud_rate: u32) -> Result<()> {
        self.ensure_closed("baud rate")?;
        self.lock_settings().baud_rate = baud_rate;
        Ok(())
    }

    pub fn data_bits(&self) -> DataBits {
        self.lock_settings().data_bits
    }

    pub fn set_data_bits(&self, data_bits: DataBits) -> Result<()> {
        self.ensure_closed("data bits")?;
        self.lock_settings().data_bits = data_bits;
        self.invalidate_device_status();
        Ok(())
    }

    pub fn parity(&self) -> Parity {
        self.lock_settings().parity
    }

    pub fn set_parity(&self, parity: Parity) -> Result<()> {
        self.ensure_closed("parity")?;
        self.lock_settings().parity = parity;
        self.invalidate_device_status();
        Ok(())
    }

    pub fn stop_bits(&self) -> StopBits {
        self.lock_settings().stop_bits
    }

    pub fn set_stop_bits(&self, stop_bits: StopBits) -> Result<()> {
        self.ensure_closed("stop bits")?;
        self.lock_settings().stop_bits = stop_bits;
        self.invalidate_device_status();
        Ok(())
    }

    pub fn flow_control(&self) -> FlowControl {
        self.lock_settings().flow_control
    }

    pub fn set_flow_control(&self, flow_control: FlowControl) -> Result<()> {
        self.ensure_closed("flow control")?;
        self.lock_settings().flow_control = flow_control;
        Ok(())
    }

    /// Cap applied to one write call; excess bytes are dropped, not queued.
    pub fn write_buffer_size(&self) -> usize {
        self.write_buffer_size.load(Ordering::Relaxed)
    }

    pub fn set_write_buffer_size(&self, size: usize) {
        self.write_buffer_size.store(size, Ordering::Relaxed);
    }

    fn lock_settings(&self) -> std::sync::MutexGuard<'_, SerialSettings> {
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_open(&self) -> bool {
        lock(&self.port).is_some()
    }

    fn ensure_closed(&self, setting: &'static str) -> Result<()> {
        if self.is_open() {
            return Err(DeviceError::SettingsLocked(setting));
        }
        Ok(())
    }

    fn invalidate_device_status(&self) {
        *lock(&self.device_status) = None;
        log::info!("Invalidated device status");
    }

    fn emit(&self, property: &str) {
        let _ = self.events_tx.send(TerminalEvent::PropertyChanged {
            property: property.to_string(),
        });
    }

    /// Stop the reception loop and release the handle.
    fn close_port(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = lock(&self.reader_handle).take() {
            let _ = handle.join();
        }
        *lock(&self.port) = None;
    }
}

#[async_trait]
impl DataDevice for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn list_available_devices(&self) -> Result<Vec<String>> {
        Ok(serialport::available_ports()?
            .into_iter()
            .map(|port| port.port_name)
            .collect())
    }

    fn descriptors(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(serialport::available_ports()?
            .into_iter()
            .map(|port| {
                let label = match &port.port_type {
                    serialport::SerialPortType::UsbPort(usb) => match &usb.product {
                        Some(product) => format!("{} ({product})", port.port_name),
                        None => port.port_name.clone(),
                    },
                    _ => port.port_name.clone(),
                };
                DeviceDescriptor {
                    kind: TransportKind::Serial,
                    id: port.port_name,
                    label,
                }
            })
            .collect())
    }

    fn device_name(&self) -> String {
        lock(&self.port_name).clone()
    }

    async fn select_device(&self, selector: &str) -> Result<()> {
        if self.is_open() {
            self.close_port();
            self.emit("PortState");
        }
        *lock(&self.port_name) = selector.to_string();
        self.emit("DeviceName");
        Ok(())
    }

    fn friendly_name(&self) -> String {
        self.device_name()
    }

    fn device_status(&self) -> String {
        let mut cached = lock(&self.device_status);
        if cached.is_none() {
            *cached = Some(self.lock_settings().status_summary());
        }
        cached.clone().unwrap_or_default()
    }

    fn connection_state(&self) -> ConnectionState {
        if self.is_open() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    async fn open(&self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let name = self.device_name();
        let settings = self.settings();
        log::info!("Opening serial port {name} ({})", settings.status_summary());

        let port = serialport::new(name.clone(), settings.baud_rate)
            .data_bits(settings.data_bits.to_backend())
            .parity(settings.parity.to_backend()?)
            .stop_bits(settings.stop_bits.to_backend()?)
            .flow_control(settings.flow_control.to_backend())
            .timeout(OPEN_TIMEOUT)
            .open()
            .map_err(|e| map_open_error(&name, e))?;

        *lock(&self.port) = Some(port);
        self.running.store(true, Ordering::SeqCst);

        let handle = thread::spawn({
            let port = Arc::clone(&self.port);
            let running = Arc::clone(&self.running);
            let packet_tx = self.packet_tx.clone();
            move || reception_loop(&port, &running, &packet_tx)
        });
        *lock(&self.reader_handle) = Some(handle);

        self.emit("PortState");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        self.close_port();
        log::info!("Closed serial port {}", self.device_name());
        self.emit("PortState");
        Ok(())
    }

    async fn write(&self, data: &[u8]) -> Result<usize> {
        let accepted = truncate_to_capacity(data, self.write_buffer_size());
        let mut guard = lock(&self.port);
        let port = guard.as_mut().ok_or(DeviceError::NotOpen)?;
        port.write_all(accepted)?;
        port.flush()?;
        Ok(accepted.len())
    }

    async fn write_str(&self, data: &str) -> Result<usize> {
        let line = format!("{data}\n");
        self.write(line.as_bytes()).await
    }

    fn subscribe(&self) -> broadcast::Receiver<TerminalEvent> {
        self.events_tx.subscribe()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Bytes of `data` accepted by one write; the remainder is dropped, per the
/// partial-write contract.
fn truncate_to_capacity(data: &[u8], capacity: usize) -> &[u8] {
    &data[..data.len().min(capacity)]
}

/// Bytes to drain for a notification reporting `available` bytes.
fn drain_len(available: usize) -> usize {
    available.min(RECEIVE_BUFFER_SIZE)
}

fn map_open_error(port_name: &str, e: serialport::Error) -> DeviceError {
    match e.kind {
        serialport::ErrorKind::NoDevice => DeviceError::DeviceUnavailable(port_name.to_string()),
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            log::error!("{port_name} is in use");
            DeviceError::AccessDenied(port_name.to_string())
        }
        _ => DeviceError::Serial(e),
    }
}

/// Notification-driven reception.
///
/// Each wake that observes bytes available is one notification: up to
/// [`RECEIVE_BUFFER_SIZE`] bytes are read into the reusable buffer and
/// exactly the bytes read are copied into a fresh packet, so no stale
/// content from a previous larger read can leak. A notification arriving
/// after close finds no port and is dropped.
fn reception_loop(
    port: &SharedPort,
    running: &AtomicBool,
    packet_tx: &mpsc::UnboundedSender<RawPacket>,
) {
    let mut receive_buffer = [0u8; RECEIVE_BUFFER_SIZE];

    while running.load(Ordering::SeqCst) {
        let packet = {
            let mut guard = lock(port);
            let Some(port) = guard.as_mut() else {
                // Benign race: close won while a notification was pending.
                drop(guard);
                thread::sleep(RECEIVE_POLL);
                continue;
            };

            let available = match port.bytes_to_read() {
                Ok(n) => n as usize,
                Err(e) => {
                    log::warn!("Serial status query failed: {e}");
                    0
                }
            };

            if available == 0 {
                None
            } else {
                let count = drain_len(available);
                match port.read_exact(&mut receive_buffer[..count]) {
                    Ok(()) => {
                        log::debug!("Received {count} of {available} available bytes");
                        Some(RawPacket::new(receive_buffer[..count].to_vec()))
                    }
                    Err(e) => {
                        log::warn!("Serial read failed: {e}");
                        None
                    }
                }
            }
        };

        match packet {
            Some(packet) => {
                let _ = packet_tx.send(packet);
            }
            None => thread::sleep(RECEIVE_POLL),
        }
    }

    log::debug!("Serial reception loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_capped_at_buffer_capacity() {
        assert_eq!(truncate_to_capacity(&[0x01, 0x02, 0x03], 2), &[0x01, 0x02]);
        assert_eq!(truncate_to_capacity(&[0x01, 0x02], 2), &[0x01, 0x02]);
        assert_eq!(truncate_to_capacity(&[], 2), &[] as &[u8]);
    }

    #[test]
    fn notification_drain_is_bounded() {
        assert_eq!(drain_len(10), 10);
        assert_eq!(drain_len(RECEIVE_BUFFER_SIZE), RECEIVE_BUFFER_SIZE);
        // Oversized notifications split: first drain takes the cap, the
        // remainder stays for the next notification.
        assert_eq!(drain_len(4096), RECEIVE_BUFFER_SIZE);
    }

    #[test]
    fn busy_port_errors_map_to_access_denied() {
        let e = serialport::Error::new(
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied),
            "Access is denied",
        );
        assert!(matches!(
            map_open_error("COM3", e),
            DeviceError::AccessDenied(name) if name == "COM3"
        ));
    }

    #[test]
    fn missing_port_errors_map_to_device_unavailable() {
        let e = serialport::Error::new(serialport::ErrorKind::NoDevice, "no such device");
        assert!(matches!(
            map_open_error("/dev/ttyUSB0", e),
            DeviceError::DeviceUnavailable(name) if name == "/dev/ttyUSB0"
        ));
    }
}
