pub mod transport;

pub use transport::SerialTransport;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceError, Result};

/// Data bits per character frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    pub const ALL: [DataBits; 4] = [
        DataBits::Five,
        DataBits::Six,
        DataBits::Seven,
        DataBits::Eight,
    ];

    pub fn bit_count(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }

    pub fn from_bit_count(bits: u8) -> Result<Self> {
        match bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(DeviceError::InvalidConfiguration(format!(
                "{other} data bits (expected 5-8)"
            ))),
        }
    }

    pub(crate) fn to_backend(self) -> serialport::DataBits {
        match self {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl Parity {
    pub const ALL: [Parity; 5] = [
        Parity::None,
        Parity::Odd,
        Parity::Even,
        Parity::Mark,
        Parity::Space,
    ];

    /// Single-letter form used by the device-status summary.
    pub fn initial(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        }
    }

    pub(crate) fn to_backend(self) -> Result<serialport::Parity> {
        match self {
            Parity::None => Ok(serialport::Parity::None),
            Parity::Odd => Ok(serialport::Parity::Odd),
            Parity::Even => Ok(serialport::Parity::Even),
            // Representable in the contract; the serial backend cannot
            // express them, so they fail at open rather than at set.
            Parity::Mark | Parity::Space => Err(DeviceError::InvalidConfiguration(format!(
                "{self:?} parity is not supported by the serial backend"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

impl StopBits {
    pub const ALL: [StopBits; 3] = [StopBits::One, StopBits::OnePointFive, StopBits::Two];

    /// Stop-bit count as shown in the device-status summary.
    pub fn count(self) -> f32 {
        match self {
            StopBits::One => 1.0,
            StopBits::OnePointFive => 1.5,
            StopBits::Two => 2.0,
        }
    }

    pub(crate) fn to_backend(self) -> Result<serialport::StopBits> {
        match self {
            StopBits::One => Ok(serialport::StopBits::One),
            StopBits::Two => Ok(serialport::StopBits::Two),
            StopBits::OnePointFive => Err(DeviceError::InvalidConfiguration(
                "1.5 stop bits are not supported by the serial backend".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowControl {
    None,
    RtsCts,
    XonXoff,
}

impl FlowControl {
    pub const ALL: [FlowControl; 3] = [FlowControl::None, FlowControl::RtsCts, FlowControl::XonXoff];

    pub(crate) fn to_backend(self) -> serialport::FlowControl {
        match self {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::RtsCts => serialport::FlowControl::Hardware,
            FlowControl::XonXoff => serialport::FlowControl::Software,
        }
    }
}

/// Serial connection parameters; mutable only while the port is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialSettings {
    /// The `"8;N;1"`-style summary shown for this parameter set.
    pub fn status_summary(&self) -> String {
        format!(
            "{};{};{}",
            self.data_bits.bit_count(),
            self.parity.initial(),
            self.stop_bits.count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_terminal_settings() {
        let settings = SerialSettings::default();
        assert_eq!(settings.baud_rate, 115200);
        assert_eq!(settings.status_summary(), "8;N;1");
    }

    #[test]
    fn status_summary_renders_fractional_stop_bits() {
        let settings = SerialSettings {
            data_bits: DataBits::Seven,
            parity: Parity::Even,
            stop_bits: StopBits::OnePointFive,
            ..SerialSettings::default()
        };
        assert_eq!(settings.status_summary(), "7;E;1.5");
    }

    #[test]
    fn data_bits_round_trip_through_counts() {
        for bits in DataBits::ALL {
            assert_eq!(DataBits::from_bit_count(bits.bit_count()).unwrap(), bits);
        }
        assert!(DataBits::from_bit_count(9).is_err());
    }

    #[test]
    fn unsupported_backend_parameters_fail_conversion() {
        assert!(Parity::Mark.to_backend().is_err());
        assert!(Parity::Space.to_backend().is_err());
        assert!(StopBits::OnePointFive.to_backend().is_err());
        assert!(Parity::Odd.to_backend().is_ok());
        assert!(StopBits::Two.to_backend().is_ok());
    }
}
