/// Serial port discovery and interactive selection
use serialport::SerialPortType;
use std::io::{self, BufRead, Write};

/// An available port and a short human description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub name: String,
    pub description: String,
}

/// Enumerate serial ports present on this machine
pub fn list_ports() -> Result<Vec<PortEntry>, serialport::Error> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|port| PortEntry {
            description: describe(&port.port_type),
            name: port.port_name,
        })
        .collect())
}

fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let product = usb.product.as_deref().unwrap_or("USB serial");
            match usb.manufacturer.as_deref() {
                Some(manufacturer) => format!("{} ({})", product, manufacturer),
                None => product.to_string(),
            }
        }
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::Unknown => "Unknown".to_string(),
    }
}

/// Resolve an operator answer to a port name
///
/// A number selects by zero-based index into `ports`; anything else is taken
/// as a literal port name, listed or not. Empty answers and out-of-range
/// indexes resolve to `None`.
pub fn choose_port(ports: &[PortEntry], answer: &str) -> Option<String> {
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }

    match answer.parse::<usize>() {
        Ok(index) => ports.get(index).map(|port| port.name.clone()),
        Err(_) => Some(answer.to_string()),
    }
}

/// Prompt until the operator picks a port
///
/// Returns `Ok(None)` when input ends before a valid answer is given.
pub fn prompt_for_port<R: BufRead, W: Write>(
    ports: &[PortEntry],
    mut input: R,
    mut output: W,
) -> io::Result<Option<String>> {
    loop {
        if ports.is_empty() {
            writeln!(output, "No serial ports detected.")?;
        } else {
            writeln!(output, "Available serial ports:")?;
            for (index, port) in ports.iter().enumerate() {
                writeln!(output, "  [{}] {} - {}", index, port.name, port.description)?;
            }
        }
        write!(output, "Select port (index or name): ")?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Ok(None);
        }

        match choose_port(ports, &answer) {
            Some(port) => return Ok(Some(port)),
            None => writeln!(output, "Invalid selection: '{}'", answer.trim())?,
        }
    }
}
