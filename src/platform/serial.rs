// SerialScribe - platform/serial.rs
//
// Serial device boundary.
//
// The capture loop only talks to `SerialDevice` / `SerialOpener`, so the
// whole read-reassemble-persist-reconnect pipeline can be driven by a
// scripted device in tests. `SystemSerialOpener` is the real implementation
// on top of the `serialport` crate.
//
// Read timeouts are not errors: the handle is opened with a short timeout so
// the reader regains control regularly, and a timed-out read is reported as
// zero bytes.

use crate::util::error::TransportError;
use std::io::{self, Read};
use std::time::Duration;

/// An open serial device handle.
pub trait SerialDevice: Send {
    /// Number of bytes waiting in the receive buffer.
    fn bytes_available(&mut self) -> Result<usize, TransportError>;

    /// Read up to `buf.len()` pending bytes. Returns 0 on read timeout.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    fn is_open(&self) -> bool;

    /// Release the handle. Idempotent.
    fn close(&mut self);
}

/// Opens device handles; a reconnection is simply a fresh `open`.
pub trait SerialOpener: Send + Sync {
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn SerialDevice>, TransportError>;
}

// =============================================================================
// serialport-backed implementation
// =============================================================================

/// Opens real serial ports through the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerialOpener;

impl SerialOpener for SystemSerialOpener {
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn SerialDevice>, TransportError> {
        let handle = serialport::new(port, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|e| TransportError::Open {
                port: port.to_string(),
                source: io::Error::from(e),
            })?;

        tracing::debug!(port, baud_rate, ?read_timeout, "Serial port opened");

        Ok(Box::new(SystemSerial {
            port: port.to_string(),
            handle: Some(handle),
        }))
    }
}

struct SystemSerial {
    port: String,
    handle: Option<Box<dyn serialport::SerialPort>>,
}

impl SystemSerial {
    fn handle(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>, TransportError> {
        let port = &self.port;
        self.handle
            .as_mut()
            .ok_or_else(|| TransportError::Closed { port: port.clone() })
    }
}

impl SerialDevice for SystemSerial {
    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        let port = self.port.clone();
        let n = self
            .handle()?
            .bytes_to_read()
            .map_err(|e| TransportError::Read {
                port,
                source: io::Error::from(e),
            })?;
        Ok(n as usize)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let port = self.port.clone();
        match self.handle()?.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(source) => Err(TransportError::Read { port, source }),
        }
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn close(&mut self) {
        if self.handle.take().is_some() {
            tracing::debug!(port = %self.port, "Serial port closed");
        }
    }
}

// =============================================================================
// Port enumeration
// =============================================================================

/// A serial port visible to the operating system.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PortInfo {
    /// Identifier to pass to `open` (e.g. `/dev/ttyUSB0`, `COM3`).
    pub name: String,
    /// Human-readable description of the port type.
    pub description: String,
}

/// List the serial ports currently available.
pub fn list_ports() -> Result<Vec<PortInfo>, TransportError> {
    let ports = serialport::available_ports().map_err(|e| TransportError::Open {
        port: "<enumerate>".to_string(),
        source: io::Error::from(e),
    })?;

    Ok(ports
        .into_iter()
        .map(|p| PortInfo {
            description: describe(&p.port_type),
            name: p.port_name,
        })
        .collect())
}

fn describe(kind: &serialport::SerialPortType) -> String {
    use serialport::SerialPortType;
    match kind {
        SerialPortType::UsbPort(usb) => {
            let product = usb
                .product
                .as_deref()
                .or(usb.manufacturer.as_deref())
                .unwrap_or("USB serial");
            format!("{product} ({:04x}:{:04x})", usb.vid, usb.pid)
        }
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::Unknown => "Unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_non_usb_ports() {
        assert_eq!(describe(&serialport::SerialPortType::PciPort), "PCI");
        assert_eq!(describe(&serialport::SerialPortType::Unknown), "Unknown");
    }

    #[test]
    fn test_open_missing_port_is_transport_error() {
        let err = SystemSerialOpener
            .open(
                "/dev/serialscribe-does-not-exist",
                115_200,
                Duration::from_millis(10),
            )
            .err()
            .expect("open must fail");
        assert!(matches!(
            err,
            TransportError::Open { ref port, .. } if port == "/dev/serialscribe-does-not-exist"
        ));
    }
}
