//! Hardware backend built on `tokio-serial`.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tokio_serial::{SerialPortBuilderExt, SerialPortInfo, SerialPortType};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::PortId;
use crate::protocol::{DataBits, FlowControl, Parity, SerialOptions, StopBits};

use super::backend::{PortInfo, PortStream, SerialBackend};

// ============================================================================
// TokioSerialBackend
// ============================================================================

/// Opens real serial devices through the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSerialBackend;

impl TokioSerialBackend {
    /// Creates the backend.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SerialBackend for TokioSerialBackend {
    async fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = tokio::task::spawn_blocking(tokio_serial::available_ports)
            .await
            .map_err(|e| Error::enumeration(e.to_string()))?
            .map_err(|e| Error::enumeration(e.to_string()))?;

        debug!(count = ports.len(), "Enumerated serial ports");

        Ok(ports.into_iter().map(PortInfo::from).collect())
    }

    async fn open(&self, port: &PortId, options: &SerialOptions) -> Result<Box<dyn PortStream>> {
        let stream = tokio_serial::new(port.as_str(), options.baud_rate)
            .data_bits(options.data_bits.into())
            .stop_bits(options.stop_bits.into())
            .parity(options.parity.into())
            .flow_control(options.flow_control().into())
            .open_native_async()
            .map_err(|e| Error::device_open(port.clone(), e.to_string()))?;

        debug!(port = %port, baud_rate = options.baud_rate, "Serial device opened");

        Ok(Box::new(stream))
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let description = match info.port_type {
            SerialPortType::UsbPort(usb) => usb.product.or(usb.manufacturer),
            SerialPortType::BluetoothPort => Some("Bluetooth".to_string()),
            SerialPortType::PciPort | SerialPortType::Unknown => None,
        };

        Self {
            name: info.port_name,
            description,
        }
    }
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(value: DataBits) -> Self {
        match value {
            DataBits::Five => Self::Five,
            DataBits::Six => Self::Six,
            DataBits::Seven => Self::Seven,
            DataBits::Eight => Self::Eight,
        }
    }
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(value: StopBits) -> Self {
        match value {
            StopBits::One => Self::One,
            StopBits::Two => Self::Two,
        }
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(value: Parity) -> Self {
        match value {
            Parity::None => Self::None,
            Parity::Even => Self::Even,
            Parity::Odd => Self::Odd,
        }
    }
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(value: FlowControl) -> Self {
        match value {
            FlowControl::None => Self::None,
            FlowControl::Software => Self::Software,
            FlowControl::Hardware => Self::Hardware,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
