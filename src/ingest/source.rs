use crate::error::StreamError;

/// Exclusive handle on the input byte stream
///
/// Implementations must not block for long in either call: the ingestion loop
/// only reads what `bytes_available` reports.
pub trait ByteSource: Send {
    /// Number of bytes that can be read without waiting
    fn bytes_available(&mut self) -> Result<usize, StreamError>;

    /// Read up to `buffer.len()` bytes, returning how many were read
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, StreamError>;
}

/// Opens (and re-opens) the input stream
pub trait SourceConnector: Send {
    fn connect(&mut self) -> Result<Box<dyn ByteSource>, StreamError>;

    /// Name used in logs
    fn describe(&self) -> String;
}
