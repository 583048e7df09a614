//! Serial port handling
//!
//! Opens and lists native serial ports for the line transport.

use super::{ByteChannel, ProtocolError, TransportConfig};

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0" or "COM16")
    pub name: String,

    /// Product name reported by a USB device
    pub product: Option<String>,

    /// Manufacturer reported by a USB device
    pub manufacturer: Option<String>,
}

impl PortInfo {
    /// A port known only by name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            product: None,
            manufacturer: None,
        }
    }
}

#[cfg(feature = "serial")]
impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let (product, manufacturer) = match info.port_type {
            serialport::SerialPortType::UsbPort(usb) => (usb.product, usb.manufacturer),
            _ => (None, None),
        };
        Self {
            name: info.port_name,
            product,
            manufacturer,
        }
    }
}

/// Ordering used for port listings:
///  - ttyACM* first (boards with native USB), numerically
///  - then ttyUSB* (USB serial adapters), numerically
///  - then COMn, numerically so COM3 sorts before COM16
///  - then everything else by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    let numbered = [("ttyACM", 0u8), ("ttyUSB", 1), ("COM", 2)];
    for (prefix, rank) in numbered {
        if let Some(rest) = basename.strip_prefix(prefix) {
            if let Ok(num) = rest.parse::<usize>() {
                return (rank, num, basename.to_string());
            }
        }
    }
    (3, 0, basename.to_string())
}

fn sorted(mut ports: Vec<PortInfo>) -> Vec<PortInfo> {
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports.dedup_by(|a, b| a.name == b.name);
    ports
}

/// List available serial ports in a stable order.
///
/// Returns an empty list when the serial backend is unavailable.
#[cfg(feature = "serial")]
pub fn list_ports() -> Vec<PortInfo> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(PortInfo::from).collect(),
        Err(e) => {
            tracing::debug!("list_ports: enumeration failed: {}", e);
            Vec::new()
        }
    };
    sorted(ports)
}

/// List available serial ports in a stable order.
///
/// Returns an empty list when the serial backend is unavailable.
#[cfg(not(feature = "serial"))]
pub fn list_ports() -> Vec<PortInfo> {
    sorted(Vec::new())
}

/// Open and configure the port named in `config`.
///
/// The port is opened 8N1 with every form of flow control disabled and with
/// DTR/RTS left alone, using the inter-byte timeout for reads.
#[cfg(feature = "serial")]
pub(crate) fn open_port(config: &TransportConfig) -> Result<Box<dyn ByteChannel>, ProtocolError> {
    let read_timeout = std::time::Duration::from_millis(config.inter_byte_timeout_ms);
    let write_timeout = std::time::Duration::from_millis(config.write_timeout_ms);

    let port = serialport::new(&config.port_name, config.baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(read_timeout)
        .open()
        .map_err(|e| map_open_error(&config.port_name, e))?;

    Ok(Box::new(super::channel::SerialChannel::new(
        port,
        read_timeout,
        write_timeout,
    )))
}

#[cfg(not(feature = "serial"))]
pub(crate) fn open_port(_config: &TransportConfig) -> Result<Box<dyn ByteChannel>, ProtocolError> {
    Err(ProtocolError::TransportUnavailable(
        "built without the `serial` feature".to_string(),
    ))
}

#[cfg(feature = "serial")]
fn map_open_error(port_name: &str, e: serialport::Error) -> ProtocolError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(port_name.to_string()),
        serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
            ProtocolError::PortNotFound(port_name.to_string())
        }
        serialport::ErrorKind::Unknown => ProtocolError::TransportUnavailable(e.description),
        _ => ProtocolError::SerialError(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports() {
        // This test just ensures the function doesn't panic
        let ports = list_ports();
        for port in &ports {
            println!("Found port: {} - {:?}", port.name, port.product);
        }
    }

    #[test]
    fn test_port_sorting() {
        let names = vec![
            "COM16",
            "/dev/ttyUSB1",
            "/dev/ttyACM1",
            "COM3",
            "/dev/ttyUSB0",
            "/dev/ttyACM0",
            "/dev/someport",
            "/dev/ttyACM10",
            "/dev/ttyACM0",
        ];
        let ports = sorted(names.into_iter().map(PortInfo::named).collect());
        let ordered: Vec<String> = ports.into_iter().map(|p| p.name).collect();

        assert_eq!(
            ordered,
            vec![
                "/dev/ttyACM0",
                "/dev/ttyACM1",
                "/dev/ttyACM10",
                "/dev/ttyUSB0",
                "/dev/ttyUSB1",
                "COM3",
                "COM16",
                "/dev/someport",
            ]
        );
    }

    #[cfg(feature = "serial")]
    #[test]
    fn test_open_missing_port() {
        let config = TransportConfig::for_port("/dev/pidlink-does-not-exist");
        match open_port(&config) {
            Err(ProtocolError::PortNotFound(name)) => {
                assert_eq!(name, "/dev/pidlink-does-not-exist")
            }
            Err(ProtocolError::SerialError(_)) | Err(ProtocolError::TransportUnavailable(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opening a missing port should fail"),
        }
    }
}
