/// Serial port access for the ingestion loop
use log::info;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Read;
use std::time::Duration;

use crate::error::StreamError;
use crate::ingest::source::{ByteSource, SourceConnector};

/// Open serial port, 8N1 without flow control
pub struct SerialSource {
    port: Box<dyn SerialPort>,
}

impl SerialSource {
    /// Open a serial port
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/ttyUSB0" or "COM5")
    /// * `baud_rate` - Baud rate (e.g., 115200)
    /// * `timeout` - Read timeout
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self, StreamError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|source| StreamError::Open {
                port: path.to_string(),
                source,
            })?;

        info!("Opened serial port: {} at {} baud", path, baud_rate);

        Ok(SerialSource { port })
    }
}

impl ByteSource for SerialSource {
    fn bytes_available(&mut self) -> Result<usize, StreamError> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, StreamError> {
        match self.port.read(buffer) {
            Ok(0) if !buffer.is_empty() => Err(StreamError::Disconnected),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

/// Connector that opens the configured serial port on demand
#[derive(Debug, Clone)]
pub struct SerialConnector {
    path: String,
    baud_rate: u32,
    timeout: Duration,
}

impl SerialConnector {
    pub fn new(path: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            timeout,
        }
    }
}

impl SourceConnector for SerialConnector {
    fn connect(&mut self) -> Result<Box<dyn ByteSource>, StreamError> {
        let source = SerialSource::open(&self.path, self.baud_rate, self.timeout)?;
        Ok(Box::new(source))
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.path, self.baud_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_missing_port_reports_path() {
        let mut connector =
            SerialConnector::new("/dev/does-not-exist-bridge", 115_200, Duration::from_secs(1));
        match connector.connect() {
            Err(StreamError::Open { port, .. }) => assert_eq!(port, "/dev/does-not-exist-bridge"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("missing port opened"),
        }
        assert_eq!(connector.describe(), "/dev/does-not-exist-bridge @ 115200 baud");
    }
}
