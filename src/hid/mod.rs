use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use hidapi::{HidApi, HidDevice};
use tokio::sync::{broadcast, mpsc};

use crate::decode::{HidPreparser, InterpreterRegistry};
use crate::device::{
    ConnectionState, DataDevice, DeviceDescriptor, DeviceError, RawPacket, Result, TerminalEvent,
    TransportKind,
};
use crate::dispatch;

/// Payload bytes carried by one report, excluding the report-ID byte.
pub const REPORT_SIZE: usize = 64;

const EVENT_CAPACITY: usize = 256;
/// Per-read timeout; bounds how long close waits for the reader thread.
const READ_TIMEOUT_MS: i32 = 50;
/// Backoff after a failed read so a removed device does not spin the loop.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(250);

/// Parse a `"0xVVVV, 0xPPPP: <description>"` selector into its vendor and
/// product IDs. The description is free text and ignored.
pub fn parse_usb_selector(selector: &str) -> Result<(u16, u16)> {
    fn invalid(selector: &str) -> DeviceError {
        DeviceError::InvalidSelector(selector.to_string())
    }

    let rest = selector
        .strip_prefix("0x")
        .ok_or_else(|| invalid(selector))?;
    let vendor_hex = rest.get(..4).ok_or_else(|| invalid(selector))?;
    let vendor_id = u16::from_str_radix(vendor_hex, 16).map_err(|_| invalid(selector))?;

    let rest = rest
        .get(4..)
        .and_then(|tail| tail.strip_prefix(", 0x"))
        .ok_or_else(|| invalid(selector))?;
    let product_hex = rest.get(..4).ok_or_else(|| invalid(selector))?;
    let product_id = u16::from_str_radix(product_hex, 16).map_err(|_| invalid(selector))?;

    Ok((vendor_id, product_id))
}

#[derive(Debug, Clone)]
struct SelectedDevice {
    vendor_id: u16,
    product_id: u16,
    label: String,
}

/// USB HID transport.
///
/// Devices are addressed by the vendor/product pair parsed from the selector
/// string. Reception runs on a dedicated thread that re-arms each read by
/// handing the report to the decode channel before blocking again, so no
/// input is missed while decoding runs.
pub struct HidTransport {
    api: Mutex<HidApi>,
    selected: Mutex<Option<SelectedDevice>>,
    device: Arc<Mutex<Option<HidDevice>>>,
    running: Arc<AtomicBool>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    // Outgoing report frame, reused across writes; the mutex serializes
    // concurrent write calls against each other.
    write_report: Mutex<[u8; REPORT_SIZE + 1]>,
    packet_tx: mpsc::UnboundedSender<RawPacket>,
    events_tx: broadcast::Sender<TerminalEvent>,
}

impl HidTransport {
    /// Create a transport wired to the shared interpreter registry.
    ///
    /// Spawns the decode task, so this must be called inside a tokio runtime.
    pub fn new(registry: Arc<InterpreterRegistry>) -> Result<Self> {
        let api = HidApi::new()?;
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        dispatch::spawn_decode_task(
            packet_rx,
            Box::new(HidPreparser),
            registry,
            events_tx.clone(),
        );

        Ok(Self {
            api: Mutex::new(api),
            selected: Mutex::new(None),
            device: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            reader_handle: Mutex::new(None),
            write_report: Mutex::new([0u8; REPORT_SIZE + 1]),
            packet_tx,
            events_tx,
        })
    }

    /// Vendor/product pair of the selected device, if any.
    pub fn selected_ids(&self) -> Option<(u16, u16)> {
        lock(&self.selected)
            .as_ref()
            .map(|selected| (selected.vendor_id, selected.product_id))
    }

    fn selector_label(info: &hidapi::DeviceInfo) -> String {
        format!(
            "0x{:04X}, 0x{:04X}: {}",
            info.vendor_id(),
            info.product_id(),
            info.product_string().unwrap_or("HID device")
        )
    }

    fn emit(&self, property: &str) {
        let _ = self.events_tx.send(TerminalEvent::PropertyChanged {
            property: property.to_string(),
        });
    }

    fn is_open(&self) -> bool {
        lock(&self.device).is_some()
    }

    /// Stop the reception loop and release the handle.
    fn close_device(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = lock(&self.reader_handle).take() {
            let _ = handle.join();
        }
        *lock(&self.device) = None;
    }
}

#[async_trait]
impl DataDevice for HidTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Hid
    }

    fn list_available_devices(&self) -> Result<Vec<String>> {
        let mut api = lock(&self.api);
        api.refresh_devices()?;
        Ok(api.device_list().map(Self::selector_label).collect())
    }

    fn descriptors(&self) -> Result<Vec<DeviceDescriptor>> {
        let mut api = lock(&self.api);
        api.refresh_devices()?;
        Ok(api
            .device_list()
            .map(|info| DeviceDescriptor {
                kind: TransportKind::Hid,
                id: info.path().to_string_lossy().into_owned(),
                label: Self::selector_label(info),
            })
            .collect())
    }

    fn device_name(&self) -> String {
        lock(&self.selected)
            .as_ref()
            .map(|selected| selected.label.clone())
            .unwrap_or_default()
    }

    async fn select_device(&self, selector: &str) -> Result<()> {
        let (vendor_id, product_id) = parse_usb_selector(selector)?;

        if self.is_open() {
            self.close_device();
            self.emit("PortState");
        }

        let matched = {
            let mut api = lock(&self.api);
            api.refresh_devices()?;
            let found = api.device_list()
                .any(|info| info.vendor_id() == vendor_id && info.product_id() == product_id);
            found
        };
        if !matched {
            return Err(DeviceError::DeviceUnavailable(selector.to_string()));
        }

        log::info!("Selected HID device 0x{vendor_id:04X}:0x{product_id:04X}");
        *lock(&self.selected) = Some(SelectedDevice {
            vendor_id,
            product_id,
            label: selector.to_string(),
        });
        self.emit("DeviceName");
        Ok(())
    }

    fn friendly_name(&self) -> String {
        format!("HID: {}", self.device_name())
    }

    fn device_status(&self) -> String {
        self.device_name()
    }

    fn connection_state(&self) -> ConnectionState {
        if lock(&self.selected).is_none() {
            return ConnectionState::Error;
        }
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

        let selected = lock(&self.selected)
            .clone()
            .ok_or_else(|| DeviceError::DeviceUnavailable("no device selected".to_string()))?;

        // Open the first enumerated device with the selected IDs that is not
        // already claimed; a present-but-unopenable device is claimed
        // elsewhere.
        let device = {
            let mut api = lock(&self.api);
            api.refresh_devices()?;

            let mut matched = false;
            let mut opened: Option<HidDevice> = None;
            let mut last_error: Option<hidapi::HidError> = None;
            for info in api.device_list() {
                if info.vendor_id() != selected.vendor_id
                    || info.product_id() != selected.product_id
                {
                    continue;
                }
                matched = true;
                match api.open_path(info.path()) {
                    Ok(device) => {
                        opened = Some(device);
                        break;
                    }
                    Err(e) => last_error = Some(e),
                }
            }

            match opened {
                Some(device) => device,
                None if matched => {
                    log::error!(
                        "{} is in use: {}",
                        selected.label,
                        last_error.map(|e| e.to_string()).unwrap_or_default()
                    );
                    return Err(DeviceError::AccessDenied(selected.label));
                }
                None => return Err(DeviceError::DeviceUnavailable(selected.label)),
            }
        };

        *lock(&self.device) = Some(device);
        self.running.store(true, Ordering::SeqCst);

        let handle = thread::spawn({
            let device = Arc::clone(&self.device);
            let running = Arc::clone(&self.running);
            let packet_tx = self.packet_tx.clone();
            move || reception_loop(&device, &running, &packet_tx)
        });
        *lock(&self.reader_handle) = Some(handle);

        log::info!("Opened HID device {}", selected.label);
        self.emit("PortState");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        self.close_device();
        log::info!("Closed HID device {}", self.device_name());
        self.emit("PortState");
        Ok(())
    }

    async fn write(&self, data: &[u8]) -> Result<usize> {
        if data.len() > REPORT_SIZE {
            return Err(DeviceError::ReportTooLarge {
                size: data.len(),
                max: REPORT_SIZE,
            });
        }

        let guard = lock(&self.device);
        let device = guard.as_ref().ok_or(DeviceError::NotOpen)?;

        let mut frame = lock(&self.write_report);
        build_report_frame(&mut frame, data);
        device.write(&frame[..])?;
        Ok(data.len())
    }

    fn subscribe(&self) -> broadcast::Receiver<TerminalEvent> {
        self.events_tx.subscribe()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fill the outgoing report: ID byte 0, payload left-aligned, zero padding.
///
/// Callers guarantee `data` fits in [`REPORT_SIZE`] bytes.
fn build_report_frame(frame: &mut [u8; REPORT_SIZE + 1], data: &[u8]) {
    frame.fill(0);
    frame[1..1 + data.len()].copy_from_slice(data);
}

/// Reception loop for input reports.
///
/// Reads into a reusable report buffer, copies exactly the received bytes
/// into a packet, and hands it off before the next read. Decoding runs on
/// the dispatch task, so no report is missed while processing occurs. Read
/// failures cover out-of-band device removal: they are logged as warnings
/// and the loop keeps re-arming; the connection stays open until the caller
/// closes it or a write fails.
fn reception_loop(
    device: &Arc<Mutex<Option<HidDevice>>>,
    running: &AtomicBool,
    packet_tx: &mpsc::UnboundedSender<RawPacket>,
) {
    let mut report_buffer = [0u8; REPORT_SIZE + 1];

    while running.load(Ordering::SeqCst) {
        let read = {
            let guard = lock(device);
            let Some(device) = guard.as_ref() else {
                break;
            };
            device.read_timeout(&mut report_buffer, READ_TIMEOUT_MS)
        };

        match read {
            // Timeout: nothing arrived in this window.
            Ok(0) => {}
            Ok(size) => {
                log::debug!(
                    "Received report: {}",
                    hex::encode(&report_buffer[..size])
                );
                let _ = packet_tx.send(RawPacket::new(report_buffer[..size].to_vec()));
            }
            Err(e) => {
                log::warn!("HID read failed (device removed?): {e}");
                thread::sleep(READ_ERROR_BACKOFF);
            }
        }
    }

    log::debug!("HID reception loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_frame_is_left_aligned_and_zero_padded() {
        let mut frame = [0xAAu8; REPORT_SIZE + 1];
        build_report_frame(&mut frame, &[0x01, 0x02, 0x03]);
        assert_eq!(frame[0], 0);
        assert_eq!(&frame[1..4], &[0x01, 0x02, 0x03]);
        assert!(frame[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_payload_clears_the_frame() {
        let mut frame = [0xFFu8; REPORT_SIZE + 1];
        build_report_frame(&mut frame, &[]);
        assert!(frame.iter().all(|&b| b == 0));
    }

    #[test]
    fn selector_labels_parse_back_to_their_ids() {
        let selector = format!("0x{:04X}, 0x{:04X}: Composite Gadget", 0x2E8A, 0xA02F);
        assert_eq!(parse_usb_selector(&selector).unwrap(), (0x2E8A, 0xA02F));
    }
}
