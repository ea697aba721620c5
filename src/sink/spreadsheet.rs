/// Tabular file archive of decoded records
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::borrow::Cow;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::SinkError;
use crate::models::{SensorRecord, NOT_AVAILABLE};
use crate::sink::Sink;

/// Column order of the archive
pub const HEADER: [&str; 7] = [
    "Packet Count",
    "Timestamp",
    "Temperature",
    "Humidity",
    "Pressure",
    "Device Name",
    "Address",
];

/// Comma-separated archive, one row per record
///
/// The file is opened, appended, flushed and closed for every record, so an
/// abrupt stop never loses a row that was already reported as stored.
#[derive(Debug, Clone)]
pub struct SpreadsheetStore {
    path: PathBuf,
}

impl SpreadsheetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, writing the header first if the file is new or empty
    pub fn append(&self, record: &SensorRecord) -> io::Result<()> {
        let needs_header = fs::metadata(&self.path)
            .map(|meta| meta.len() == 0)
            .unwrap_or(true);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut out = String::new();
        if needs_header {
            push_row(&mut out, HEADER.iter().copied());
        }
        let row = table_row(record);
        push_row(&mut out, row.iter().map(String::as_str));

        file.write_all(out.as_bytes())?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }
}

#[async_trait]
impl Sink for SpreadsheetStore {
    fn name(&self) -> &str {
        "spreadsheet"
    }

    async fn accept(&self, record: &SensorRecord) -> Result<(), SinkError> {
        let store = self.clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || store.append(&record))
            .await
            .map_err(|e| SinkError::Join(e.to_string()))??;
        debug!("Appended record to {}", self.path.display());
        Ok(())
    }
}

/// Cells for one record, in `HEADER` order
pub fn table_row(record: &SensorRecord) -> [String; 7] {
    match record {
        SensorRecord::Frame(r) => [
            r.packet_no.to_string(),
            r.timestamp.clone(),
            r.temperature.to_string(),
            r.humidity.to_string(),
            r.pressure.to_string(),
            NOT_AVAILABLE.to_string(),
            r.device_mac.clone(),
        ],
        SensorRecord::Text(r) => [
            cell(&r.packet_count),
            r.timestamp.clone(),
            cell(&r.temperature),
            cell(&r.humidity),
            cell(&r.pressure),
            cell(&r.device_name),
            cell(&r.address),
        ],
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn push_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    let line: Vec<Cow<'a, str>> = cells.map(escape).collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

fn escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{sentinel, FrameReading, TextReading};
    use serde_json::json;

    fn frame_record(packet_no: u16) -> SensorRecord {
        SensorRecord::Frame(FrameReading {
            timestamp: "2024-01-01 00:00:00 UTC".into(),
            device_mac: "FFEEDDCCBBAA".into(),
            packet_no,
            temperature: 21.5,
            humidity: 40,
            pressure: 101325,
        })
    }

    #[test]
    fn header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpreadsheetStore::new(dir.path().join("readings.csv"));

        store.append(&frame_record(1)).unwrap();
        store.append(&frame_record(2)).unwrap();

        let contents = fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Packet Count,Timestamp,Temperature,Humidity,Pressure,Device Name,Address",
                "1,2024-01-01 00:00:00 UTC,21.5,40,101325,N/A,FFEEDDCCBBAA",
                "2,2024-01-01 00:00:00 UTC,21.5,40,101325,N/A,FFEEDDCCBBAA",
            ]
        );
    }

    #[test]
    fn text_records_keep_sentinels_and_quote_separators() {
        let record = SensorRecord::Text(TextReading {
            timestamp: "t".into(),
            packet_count: json!(5),
            temperature: json!(21.3),
            humidity: sentinel(),
            pressure: json!(null),
            device_name: json!("kitchen, north"),
            address: json!("say \"hi\""),
        });
        assert_eq!(
            table_row(&record),
            [
                "5".to_string(),
                "t".into(),
                "21.3".into(),
                "N/A".into(),
                "".into(),
                "kitchen, north".into(),
                "say \"hi\"".into(),
            ]
        );

        let mut out = String::new();
        let row = table_row(&record);
        push_row(&mut out, row.iter().map(String::as_str));
        assert_eq!(out, "5,t,21.3,N/A,,\"kitchen, north\",\"say \"\"hi\"\"\"\n");
    }

    #[tokio::test]
    async fn sink_appends_through_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpreadsheetStore::new(dir.path().join("sink.csv"));
        store.accept(&frame_record(9)).await.unwrap();

        let contents = fs::read_to_string(store.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.lines().nth(1).unwrap().starts_with("9,"));
    }

    #[tokio::test]
    async fn unwritable_path_is_a_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpreadsheetStore::new(dir.path().join("missing").join("sink.csv"));
        assert!(matches!(
            store.accept(&frame_record(1)).await,
            Err(SinkError::Store(_))
        ));
    }
}
