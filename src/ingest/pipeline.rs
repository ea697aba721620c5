/// Ingestion loop: read, frame, decode and dispatch sensor data
use log::{debug, error, info, warn};
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use crate::config::BridgeConfig;
use crate::error::{FrameError, FramingError, FramingErrorKind, StreamError};
use crate::frame::decode_unit;
use crate::ingest::framer::Framer;
use crate::ingest::source::{ByteSource, SourceConnector};
use crate::models::FrameMode;
use crate::sink::SinkDispatcher;
use crate::utils::hex_upper;

const READ_CHUNK: usize = 1024;

/// Settings for one ingestion loop
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub mode: FrameMode,
    pub poll_interval: Duration,
    /// How long a partial binary frame may wait for its remaining bytes
    pub read_timeout: Duration,
    pub max_line_length: usize,
    /// Re-open attempts after the first failed open
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl From<&BridgeConfig> for IngestConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            mode: config.frame_mode,
            poll_interval: config.poll_interval,
            read_timeout: config.read_timeout,
            max_line_length: config.max_line_length,
            reconnect_attempts: config.reconnect_attempts,
            reconnect_delay: config.reconnect_delay,
        }
    }
}

/// Connection state of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Disconnected,
    Idle,
    Reading,
    Dispatching,
    Closed,
}

/// Counters reported when the loop closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames_decoded: u64,
    pub frames_dropped: u64,
    pub records_dispatched: u64,
    pub sink_failures: u64,
    pub connections: u64,
}

/// Owns the input stream and drives it until shutdown
///
/// Decode failures are logged and skipped. Stream failures drop the handle and
/// go back to `Disconnected`, where the connector is retried according to
/// `IngestConfig`; the loop closes with the last error once attempts run out.
pub struct IngestionLoop<C: SourceConnector> {
    config: IngestConfig,
    connector: C,
    dispatcher: SinkDispatcher,
    shutdown: watch::Receiver<bool>,
    state: LoopState,
    summary: LoopSummary,
}

impl<C: SourceConnector> IngestionLoop<C> {
    pub fn new(
        config: IngestConfig,
        connector: C,
        dispatcher: SinkDispatcher,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            connector,
            dispatcher,
            shutdown,
            state: LoopState::Disconnected,
            summary: LoopSummary::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until shutdown is signalled or the stream cannot be re-opened
    pub async fn run(mut self) -> Result<LoopSummary, StreamError> {
        info!(
            "Starting ingestion from {} in {} mode",
            self.connector.describe(),
            self.config.mode
        );

        let result = loop {
            let source = match self.connect().await {
                Ok(Some(source)) => source,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };

            match self.read_session(source).await {
                Ok(()) => break Ok(()),
                Err(e) => {
                    error!("Stream error on {}: {}", self.connector.describe(), e);
                    self.state = LoopState::Disconnected;
                }
            }
        };

        self.state = LoopState::Closed;
        let summary = self.summary;
        info!(
            "Ingestion closed: {} decoded, {} dropped, {} dispatched, {} sink failures",
            summary.frames_decoded,
            summary.frames_dropped,
            summary.records_dispatched,
            summary.sink_failures
        );
        result.map(|_| summary)
    }

    /// Open the stream, retrying with an interruptible delay
    ///
    /// Returns `Ok(None)` if shutdown arrives first.
    async fn connect(&mut self) -> Result<Option<Box<dyn ByteSource>>, StreamError> {
        self.state = LoopState::Disconnected;
        let attempts = self.config.reconnect_attempts + 1;

        for attempt in 1..=attempts {
            if self.shutdown_requested() {
                return Ok(None);
            }

            match self.connector.connect() {
                Ok(source) => {
                    self.summary.connections += 1;
                    info!("Connected to {}", self.connector.describe());
                    return Ok(Some(source));
                }
                Err(e) => {
                    error!("Attempt {}/{}: {}", attempt, attempts, e);
                    if attempt == attempts {
                        return Err(e);
                    }
                }
            }

            if self.wait(self.config.reconnect_delay).await {
                return Ok(None);
            }
        }

        Err(StreamError::Disconnected)
    }

    /// Read until shutdown (`Ok`) or a stream failure
    async fn read_session(&mut self, mut source: Box<dyn ByteSource>) -> Result<(), StreamError> {
        let mut framer = Framer::new(self.config.mode, self.config.max_line_length);
        let mut buffer = [0u8; READ_CHUNK];

        loop {
            if self.shutdown_requested() {
                self.discard_pending(&mut framer);
                return Ok(());
            }

            self.state = LoopState::Idle;
            let available = match source.bytes_available() {
                Ok(available) => available,
                Err(e) => {
                    self.discard_pending(&mut framer);
                    return Err(e);
                }
            };

            if available == 0 {
                if let Some(stale) = framer.take_stale(Instant::now(), self.config.read_timeout) {
                    self.handle_unit(&stale).await;
                    continue;
                }
                self.wait(self.config.poll_interval).await;
                continue;
            }

            self.state = LoopState::Reading;
            let len = available.min(READ_CHUNK);
            let n = match source.read(&mut buffer[..len]) {
                Ok(n) => n,
                Err(e) => {
                    self.discard_pending(&mut framer);
                    return Err(e);
                }
            };
            framer.push(&buffer[..n], Instant::now());

            while let Some(unit) = framer.next_unit() {
                match unit {
                    Ok(bytes) => self.handle_unit(&bytes).await,
                    Err(e) => self.report_drop(&FrameError::from(e)),
                }
            }
        }
    }

    async fn handle_unit(&mut self, raw: &[u8]) {
        self.state = LoopState::Dispatching;
        debug!("Raw: {}", hex_upper(raw));

        match decode_unit(self.config.mode, raw) {
            Ok(record) => {
                self.summary.frames_decoded += 1;
                let report = self.dispatcher.dispatch(&record).await;
                self.summary.records_dispatched += 1;
                self.summary.sink_failures += report.failed.len() as u64;
            }
            Err(e) => self.report_drop(&FrameError::from(e)),
        }
    }

    /// Report whatever the session leaves behind in the framer as one drop
    fn discard_pending(&mut self, framer: &mut Framer) {
        if let Some(raw) = framer.take_pending() {
            let err = FramingError::new(FramingErrorKind::Incomplete, raw);
            self.report_drop(&FrameError::from(err));
        }
    }

    fn report_drop(&mut self, err: &FrameError) {
        self.summary.frames_dropped += 1;
        match self.config.mode {
            FrameMode::Binary => warn!(
                "Dropped frame: {} (raw: {})",
                err.reason(),
                err.raw_payload()
            ),
            FrameMode::Text => warn!(
                "Dropped line: {} (raw: {}, text: {:?})",
                err.reason(),
                err.raw_payload(),
                String::from_utf8_lossy(err.raw())
            ),
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep for `duration` unless shutdown is signalled first. Returns
    /// whether shutdown has been requested.
    async fn wait(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = sleep(duration) => {}
            changed = self.shutdown.changed() => {
                // Sender gone: nobody can signal any more, keep the cadence
                if changed.is_err() {
                    sleep(duration).await;
                }
            }
        }
        self.shutdown_requested()
    }
}
