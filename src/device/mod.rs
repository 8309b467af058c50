pub mod models;
pub mod transport;

pub use models::*;
pub use transport::DataDevice;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no matching idle device: {0}")]
    DeviceUnavailable(String),

    #[error("device claimed by another owner: {0}")]
    AccessDenied(String),

    #[error("device is not open")]
    NotOpen,

    #[error("connection must be closed before changing {0}")]
    SettingsLocked(&'static str),

    #[error("invalid device selector: {0}")]
    InvalidSelector(String),

    #[error("invalid device configuration: {0}")]
    InvalidConfiguration(String),

    #[error("write of {size} bytes exceeds the {max}-byte report payload")]
    ReportTooLarge { size: usize, max: usize },

    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
