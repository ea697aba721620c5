//! Serial-to-MQTT bridge for a UART-attached environmental sensor.
//!
//! Bytes read from the serial port are framed (fixed 18-byte binary frames or
//! newline-terminated hex/JSON lines), decoded into [`models::SensorRecord`]s
//! and fanned out to the configured sinks: an MQTT topic and an optional
//! spreadsheet archive.

pub mod config;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod models;
pub mod serial;
pub mod sink;
pub mod utils;

pub use config::BridgeConfig;
pub use error::{DecodeError, FrameError, FramingError, SinkError, StreamError};
pub use models::{FrameMode, SensorRecord};
