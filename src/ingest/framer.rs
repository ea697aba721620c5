/// Segmentation of the input byte stream into decodable units
use std::time::{Duration, Instant};

use crate::error::{FramingError, FramingErrorKind};
use crate::frame::FRAME_LEN;
use crate::models::FrameMode;

/// Accumulates received bytes and hands out whole frames or lines
///
/// Binary mode yields exactly `FRAME_LEN` bytes per unit and never decodes a
/// partial frame, except through `take_stale`. Text mode yields one line per
/// unit with the terminator (and a trailing `\r`) removed. A line longer than
/// `max_line_length` is dropped whole, including any tail that arrives after
/// the overflow was reported.
#[derive(Debug)]
pub struct Framer {
    mode: FrameMode,
    max_line_length: usize,
    buffer: Vec<u8>,
    last_rx: Option<Instant>,
    // Skipping the rest of an overlong line up to its terminator
    discarding: bool,
}

impl Framer {
    pub fn new(mode: FrameMode, max_line_length: usize) -> Self {
        Self {
            mode,
            max_line_length,
            buffer: Vec::new(),
            last_rx: None,
            discarding: false,
        }
    }

    /// Append bytes received at `now`
    pub fn push(&mut self, bytes: &[u8], now: Instant) {
        if bytes.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(bytes);
        self.last_rx = Some(now);
    }

    /// Bytes buffered but not yet part of a complete unit
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Everything still buffered, for reporting when the stream ends mid-unit
    pub fn take_pending(&mut self) -> Option<Vec<u8>> {
        self.discarding = false;
        self.last_rx = None;
        if self.buffer.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.buffer))
    }

    /// Next complete unit, if any
    pub fn next_unit(&mut self) -> Option<Result<Vec<u8>, FramingError>> {
        match self.mode {
            FrameMode::Binary => self.next_frame().map(Ok),
            FrameMode::Text => self.next_line(),
        }
    }

    /// Flush a binary partial frame that has not grown for `timeout`
    ///
    /// The returned bytes are shorter than a frame and decode as truncated.
    pub fn take_stale(&mut self, now: Instant, timeout: Duration) -> Option<Vec<u8>> {
        if self.mode != FrameMode::Binary || self.buffer.is_empty() {
            return None;
        }
        let last_rx = self.last_rx?;
        if now.saturating_duration_since(last_rx) < timeout {
            return None;
        }
        self.last_rx = None;
        Some(std::mem::take(&mut self.buffer))
    }

    fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.buffer.len() < FRAME_LEN {
            return None;
        }
        Some(self.buffer.drain(..FRAME_LEN).collect())
    }

    fn next_line(&mut self) -> Option<Result<Vec<u8>, FramingError>> {
        let terminator = self.buffer.iter().position(|&b| b == b'\n');

        if self.discarding {
            match terminator {
                Some(end) => {
                    self.buffer.drain(..=end);
                    self.discarding = false;
                }
                None => {
                    self.buffer.clear();
                    return None;
                }
            }
            return self.next_line();
        }

        match terminator {
            Some(end) => {
                let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                if line.len() > self.max_line_length {
                    return Some(Err(self.too_long(line)));
                }
                if line.iter().all(|b| b.is_ascii_whitespace()) {
                    return Some(Err(FramingError::new(FramingErrorKind::EmptyLine, line)));
                }
                Some(Ok(line))
            }
            None if self.buffer.len() > self.max_line_length => {
                let raw = std::mem::take(&mut self.buffer);
                self.discarding = true;
                Some(Err(self.too_long(raw)))
            }
            None => None,
        }
    }

    fn too_long(&self, raw: Vec<u8>) -> FramingError {
        FramingError::new(
            FramingErrorKind::LineTooLong {
                limit: self.max_line_length,
            },
            raw,
        )
    }
}
