//! Bounded asynchronous writer.
//!
//! # Responsibilities
//! - Decouple logging threads from the output sink
//! - Drop entries instead of blocking when the buffer is full
//! - Report how many entries were dropped through a callback
//!
//! # Data Flow
//! ```text
//! Logger::write_line
//!     → LineWriter (submitted += 1)
//!         → NonBlocking (lossy, bounded channel)
//!             → worker thread → DeliveringSink (delivered += 1) → sink
//!         ↘ full: ErrorCounter += 1
//!
//! drop watcher thread (every poll_interval)
//!     → (ErrorCounter + discarded) delta → on_dropped(n)
//! ```
//!
//! # Design Decisions
//! - The channel and worker come from `tracing-appender`; this module only
//!   adds drop reporting and lifecycle
//! - Drops are reported as deltas, so the reported counts always sum to
//!   the total number of entries discarded
//! - `close` gives the worker a bounded time to drain (the
//!   `tracing-appender` shutdown timeout, about one second); lines still
//!   queued after that are discarded and reported as dropped

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use tracing_appender::non_blocking::{ErrorCounter, NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::fmt::writer::MakeWriter;

use crate::config::DiodeConfig;
use crate::observability::metrics;

/// Called with the number of entries dropped since the previous call.
pub type DroppedFn = Arc<dyn Fn(usize) + Send + Sync>;

/// Warns through the `log` facade and counts the drops.
pub fn default_on_dropped() -> DroppedFn {
    Arc::new(|count: usize| {
        metrics::record_dropped_entries(count);
        log::warn!(target: "ctxlog", "ctxlog: dropped {count} logs due to buffer overflow");
    })
}

/// Lossy, bounded, non-blocking writer around a sink.
///
/// Clones share the same buffer and worker. The worker stops when
/// [`DiodeWriter::close`] is called or the last clone is dropped.
#[derive(Clone)]
pub struct DiodeWriter {
    writer: NonBlocking,
    shared: Arc<Shared>,
}

struct Shared {
    guard: Mutex<Option<WorkerGuard>>,
    stop: Mutex<Option<mpsc::Sender<()>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    drops: Arc<DropReporter>,
}

/// Line accounting shared by the writers, the worker-side sink and `close`.
///
/// Every submitted line is either dropped by the channel, delivered to the
/// sink, or counted in `discarded` when `close` finds it still queued.
#[derive(Default)]
struct Ledger {
    // Submission holds the read side; close takes the write side.
    open: RwLock<bool>,
    submitted: AtomicUsize,
    discarded: AtomicUsize,
    sink: Mutex<SinkState>,
}

#[derive(Default)]
struct SinkState {
    closed: bool,
    delivered: usize,
}

/// Sink wrapper run on the worker thread.
struct DeliveringSink<W> {
    sink: W,
    ledger: Arc<Ledger>,
}

impl<W: io::Write> io::Write for DeliveringSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.ledger.sink);
        if state.closed {
            return Ok(buf.len());
        }
        io::Write::write_all(&mut self.sink, buf)?;
        state.delivered += 1;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if lock(&self.ledger.sink).closed {
            return Ok(());
        }
        io::Write::flush(&mut self.sink)
    }
}

/// Writer handed out per entry by [`DiodeWriter`].
pub struct LineWriter {
    inner: NonBlocking,
    ledger: Arc<Ledger>,
}

impl io::Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let open = self.ledger.open.read().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            self.ledger.discarded.fetch_add(1, Ordering::AcqRel);
            return Ok(buf.len());
        }
        self.ledger.submitted.fetch_add(1, Ordering::AcqRel);
        io::Write::write(&mut self.inner, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.inner)
    }
}

struct DropReporter {
    counter: ErrorCounter,
    ledger: Arc<Ledger>,
    reported: AtomicUsize,
    on_dropped: DroppedFn,
}

impl DropReporter {
    fn total(&self) -> usize {
        self.counter.dropped_lines() + self.ledger.discarded.load(Ordering::Acquire)
    }

    fn report(&self) {
        let total = self.total();
        let previous = self.reported.fetch_max(total, Ordering::AcqRel);
        if total > previous {
            (self.on_dropped)(total - previous);
        }
    }
}

impl DiodeWriter {
    /// Wrap `sink` with the default drop callback.
    pub fn new<W>(sink: W, config: &DiodeConfig) -> io::Result<Self>
    where
        W: io::Write + Send + 'static,
    {
        Self::with_on_dropped(sink, config, default_on_dropped())
    }

    pub fn with_on_dropped<W>(sink: W, config: &DiodeConfig, on_dropped: DroppedFn) -> io::Result<Self>
    where
        W: io::Write + Send + 'static,
    {
        let ledger = Arc::new(Ledger {
            open: RwLock::new(true),
            ..Ledger::default()
        });
        let (writer, guard) = NonBlockingBuilder::default()
            .lossy(true)
            .buffered_lines_limit(config.buffer_size)
            .thread_name("ctxlog-diode")
            .finish(DeliveringSink {
                sink,
                ledger: ledger.clone(),
            });

        let drops = Arc::new(DropReporter {
            counter: writer.error_counter(),
            ledger,
            reported: AtomicUsize::new(0),
            on_dropped,
        });

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let poll_interval = config.poll_interval();
        let watched = drops.clone();
        let watcher = thread::Builder::new()
            .name("ctxlog-diode-drops".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(poll_interval) {
                    Err(RecvTimeoutError::Timeout) => watched.report(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            writer,
            shared: Arc::new(Shared {
                guard: Mutex::new(Some(guard)),
                stop: Mutex::new(Some(stop_tx)),
                watcher: Mutex::new(Some(watcher)),
                drops,
            }),
        })
    }

    /// Total entries dropped so far, including those discarded by `close`.
    pub fn dropped(&self) -> usize {
        self.shared.drops.total()
    }

    /// Stop accepting entries, let the worker drain for up to about one
    /// second, then discard what is still queued and report every drop.
    ///
    /// Writes after `close` are discarded and counted by [`dropped`], but
    /// not passed to the drop callback.
    ///
    /// [`dropped`]: DiodeWriter::dropped
    pub fn close(&self) {
        self.shared.close();
    }

    fn line_writer(&self) -> LineWriter {
        LineWriter {
            inner: self.writer.clone(),
            ledger: self.shared.drops.ledger.clone(),
        }
    }
}

impl Shared {
    fn close(&self) {
        let Some(guard) = lock(&self.guard).take() else {
            return;
        };
        let ledger = &self.drops.ledger;
        *ledger.open.write().unwrap_or_else(PoisonError::into_inner) = false;

        // Bounded wait: the guard gives up after its shutdown timeout.
        drop(guard);

        {
            let mut state = lock(&ledger.sink);
            state.closed = true;
            let accepted = ledger
                .submitted
                .load(Ordering::Acquire)
                .saturating_sub(self.drops.counter.dropped_lines());
            let queued = accepted.saturating_sub(state.delivered);
            ledger.discarded.fetch_add(queued, Ordering::AcqRel);
        }

        drop(lock(&self.stop).take());
        if let Some(handle) = lock(&self.watcher).take() {
            let _ = handle.join();
        }
        self.drops.report();
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<'a> MakeWriter<'a> for DiodeWriter {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.line_writer()
    }
}

impl fmt::Debug for DiodeWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiodeWriter")
            .field("dropped", &self.dropped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CaptureSink;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_entries_reach_the_sink_after_close() {
        let sink = CaptureSink::new();
        let diode = DiodeWriter::new(sink.clone(), &DiodeConfig::default()).unwrap();

        let mut writer = diode.make_writer();
        for i in 0..10 {
            writer.write_all(format!("{{\"n\":{i}}}\n").as_bytes()).unwrap();
        }
        diode.close();

        let entries = sink.entries();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[9]["n"], 9);
        assert_eq!(diode.dropped(), 0);
    }

    #[test]
    fn test_writes_after_close_are_counted() {
        let sink = CaptureSink::new();
        let diode = DiodeWriter::new(sink.clone(), &DiodeConfig::default()).unwrap();
        diode.close();

        diode.make_writer().write_all(b"{\"late\":true}\n").unwrap();
        assert!(sink.entries().is_empty());
        assert_eq!(diode.dropped(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let config = DiodeConfig {
            buffer_size: 4,
            poll_interval_ms: 5,
        };
        let diode = DiodeWriter::new(io::sink(), &config).unwrap();
        let clone = diode.clone();
        diode.close();
        clone.close();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(clone.dropped(), 0);
    }
}
