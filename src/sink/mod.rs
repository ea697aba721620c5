/// Fan-out of decoded records to publish and persistence targets
pub mod mqtt;
pub mod spreadsheet;

use async_trait::async_trait;
use futures_util::future::join_all;
use log::{debug, error};
use std::sync::Arc;

use crate::error::SinkError;
use crate::models::SensorRecord;

pub use mqtt::{MqttSession, MqttSettings, MqttSink};
pub use spreadsheet::SpreadsheetStore;

/// Downstream consumer of decoded records
#[async_trait]
pub trait Sink: Send + Sync {
    /// Name used in logs and dispatch reports
    fn name(&self) -> &str;

    async fn accept(&self, record: &SensorRecord) -> Result<(), SinkError>;
}

/// Outcome of delivering one record to every sink
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: Vec<(String, SinkError)>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delivers each record to all configured sinks
///
/// Sinks run concurrently for a record and fail independently. The next record
/// is only dispatched after every sink has finished with the current one.
#[derive(Default, Clone)]
pub struct SinkDispatcher {
    sinks: Vec<Arc<dyn Sink>>,
}

impl SinkDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.add(sink);
        self
    }

    pub fn add(&mut self, sink: Arc<dyn Sink>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    pub async fn dispatch(&self, record: &SensorRecord) -> DispatchReport {
        let results = join_all(self.sinks.iter().map(|sink| async move {
            (sink.name().to_string(), sink.accept(record).await)
        }))
        .await;

        let mut report = DispatchReport::default();
        for (name, result) in results {
            match result {
                Ok(()) => {
                    debug!("Record delivered to {}", name);
                    report.delivered += 1;
                }
                Err(e) => {
                    error!("Sink {} failed: {}", name, e);
                    report.failed.push((name, e));
                }
            }
        }
        report
    }
}
