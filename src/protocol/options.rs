//! Serial line options carried in `openserial` requests.
//!
//! Field names follow the node-serialport options object that browser
//! clients already send:
//!
//! ```json
//! { "baudRate": 115200, "dataBits": 8, "stopBits": 1, "parity": "none", "rtscts": false }
//! ```
//!
//! Every field is optional and unknown keys are ignored. Options only take
//! effect when a session is created; clients attaching to an already open
//! port get the existing line settings.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Baud rate used when the client does not specify one.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

// ============================================================================
// SerialOptions
// ============================================================================

/// Line settings for opening a serial device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SerialOptions {
    /// Bits per second.
    #[serde(alias = "baudrate")]
    pub baud_rate: u32,

    /// Bits per character.
    pub data_bits: DataBits,

    /// Stop bits per character.
    pub stop_bits: StopBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// RTS/CTS hardware flow control.
    pub rtscts: bool,

    /// XON software flow control.
    pub xon: bool,

    /// XOFF software flow control.
    pub xoff: bool,
}

impl Default for SerialOptions {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            rtscts: false,
            xon: false,
            xoff: false,
        }
    }
}

impl SerialOptions {
    /// Creates options with the given baud rate and 8N1 framing.
    #[inline]
    #[must_use]
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    /// Resolves the flow control mode.
    ///
    /// Hardware flow control wins when both kinds are requested.
    #[must_use]
    pub fn flow_control(&self) -> FlowControl {
        if self.rtscts {
            FlowControl::Hardware
        } else if self.xon || self.xoff {
            FlowControl::Software
        } else {
            FlowControl::None
        }
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.baud_rate == 0 {
            return Err("baudRate must be greater than zero".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// DataBits
// ============================================================================

/// Number of bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    /// 5 bits.
    Five,
    /// 6 bits.
    Six,
    /// 7 bits.
    Seven,
    /// 8 bits.
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(format!("dataBits must be 5, 6, 7 or 8, got {other}")),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(value: DataBits) -> Self {
        match value {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

// ============================================================================
// StopBits
// ============================================================================

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    /// One stop bit.
    One,
    /// Two stop bits.
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(format!("stopBits must be 1 or 2, got {other}")),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(value: StopBits) -> Self {
        match value {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

// ============================================================================
// Parity / FlowControl
// ============================================================================

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit.
    None,
    /// Even parity.
    Even,
    /// Odd parity.
    Odd,
}

/// Flow control mode derived from `rtscts`/`xon`/`xoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    /// No flow control.
    None,
    /// XON/XOFF.
    Software,
    /// RTS/CTS.
    Hardware,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_defaults_are_9600_8n1() {
        let options = SerialOptions::default();
        assert_eq!(options.baud_rate, 9600);
        assert_eq!(options.data_bits, DataBits::Eight);
        assert_eq!(options.stop_bits, StopBits::One);
        assert_eq!(options.parity, Parity::None);
        assert_eq!(options.flow_control(), FlowControl::None);
    }

    #[test]
    fn test_partial_object_fills_defaults() {
        let options: SerialOptions =
            serde_json::from_value(json!({ "baudRate": 115200, "parity": "even" }))
                .expect("parse");
        assert_eq!(options.baud_rate, 115200);
        assert_eq!(options.parity, Parity::Even);
        assert_eq!(options.data_bits, DataBits::Eight);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let options: SerialOptions =
            serde_json::from_value(json!({ "baudrate": 57600, "bufferSize": 1024 }))
                .expect("parse");
        assert_eq!(options.baud_rate, 57600);
    }

    #[test]
    fn test_invalid_data_bits_rejected() {
        let result = serde_json::from_value::<SerialOptions>(json!({ "dataBits": 9 }));
        let err = result.expect_err("dataBits 9 is invalid");
        assert!(err.to_string().contains("dataBits"));
    }

    #[test]
    fn test_invalid_stop_bits_rejected() {
        assert!(serde_json::from_value::<SerialOptions>(json!({ "stopBits": 3 })).is_err());
    }

    #[test]
    fn test_flow_control_resolution() {
        let hardware = SerialOptions {
            rtscts: true,
            xon: true,
            ..SerialOptions::default()
        };
        assert_eq!(hardware.flow_control(), FlowControl::Hardware);

        let software = SerialOptions {
            xoff: true,
            ..SerialOptions::default()
        };
        assert_eq!(software.flow_control(), FlowControl::Software);
    }

    #[test]
    fn test_validate_zero_baud() {
        assert!(SerialOptions::with_baud_rate(0).validate().is_err());
        assert!(SerialOptions::with_baud_rate(300).validate().is_ok());
    }
}
