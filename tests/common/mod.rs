//! Shared utilities for integration tests.

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ctxlog::test_support::CaptureSink;
use ctxlog::{new_logger, Logger, LoggerOptions};

/// Sink that sleeps on every write and counts the lines it received.
#[allow(dead_code)]
#[derive(Clone)]
pub struct SlowSink {
    lines: Arc<AtomicUsize>,
    delay: Duration,
}

#[allow(dead_code)]
impl SlowSink {
    pub fn new(delay: Duration) -> Self {
        Self {
            lines: Arc::new(AtomicUsize::new(0)),
            delay,
        }
    }

    pub fn lines(&self) -> usize {
        self.lines.load(Ordering::SeqCst)
    }
}

impl Write for SlowSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        thread::sleep(self.delay);
        let lines = buf.iter().filter(|b| **b == b'\n').count();
        self.lines.fetch_add(lines, Ordering::SeqCst);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Logger writing synchronously into a fresh capture sink.
#[allow(dead_code)]
pub fn capture_logger(options: LoggerOptions) -> (Logger, CaptureSink) {
    let sink = CaptureSink::new();
    (new_logger(sink.clone(), options), sink)
}
