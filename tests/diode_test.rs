//! Backpressure tests for the bounded asynchronous writer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ctxlog::config::DiodeConfig;
use ctxlog::{new_logger, DiodeWriter, LoggerOptions};

mod common;
use common::SlowSink;

fn counting_diode(sink: SlowSink, buffer_size: usize) -> (DiodeWriter, Arc<AtomicUsize>) {
    let reported = Arc::new(AtomicUsize::new(0));
    let counter = reported.clone();
    let config = DiodeConfig {
        buffer_size,
        poll_interval_ms: 1,
    };
    let diode = DiodeWriter::with_on_dropped(
        sink,
        &config,
        Arc::new(move |n| {
            counter.fetch_add(n, Ordering::SeqCst);
        }),
    )
    .unwrap();
    (diode, reported)
}

#[test]
fn test_overflow_is_dropped_and_reported() {
    let sink = SlowSink::new(Duration::from_millis(1));
    let (diode, reported) = counting_diode(sink.clone(), 8);
    let logger = new_logger(diode.clone(), LoggerOptions::new());

    const TOTAL: usize = 300;
    for i in 0..TOTAL {
        logger.info().field("i", i).msg("burst");
    }
    diode.close();

    let delivered = sink.lines();
    let dropped = reported.load(Ordering::SeqCst);
    assert!(dropped > 0, "expected overflow with a slow sink");
    assert_eq!(delivered + dropped, TOTAL);
    assert_eq!(diode.dropped(), dropped);
}

#[test]
fn test_concurrent_producers_account_for_every_entry() {
    let sink = SlowSink::new(Duration::from_micros(500));
    let (diode, reported) = counting_diode(sink.clone(), 16);
    let logger = new_logger(diode.clone(), LoggerOptions::new());

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let logger = logger.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    logger.warn().field("worker", worker).field("i", i).msg("concurrent");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    diode.close();

    assert_eq!(sink.lines() + reported.load(Ordering::SeqCst), 400);
}

#[test]
fn test_no_drops_when_sink_keeps_up() {
    let sink = SlowSink::new(Duration::ZERO);
    let (diode, reported) = counting_diode(sink.clone(), 1000);
    let logger = new_logger(diode.clone(), LoggerOptions::new());

    for _ in 0..50 {
        logger.debug().msg("steady");
    }
    diode.close();

    assert_eq!(sink.lines(), 50);
    assert_eq!(reported.load(Ordering::SeqCst), 0);
}

#[test]
fn test_close_counts_entries_left_in_the_queue() {
    // Roughly three seconds of backlog, more than close waits for.
    let sink = SlowSink::new(Duration::from_millis(5));
    let (diode, reported) = counting_diode(sink.clone(), 1000);
    let logger = new_logger(diode.clone(), LoggerOptions::new());

    const TOTAL: usize = 600;
    for i in 0..TOTAL {
        logger.info().field("i", i).msg("backlog");
    }
    diode.close();

    let delivered = sink.lines();
    let dropped = reported.load(Ordering::SeqCst);
    assert!(dropped > 0, "expected queued entries to be discarded");
    assert_eq!(delivered + dropped, TOTAL);

    // Nothing reaches the sink once close has returned.
    thread::sleep(Duration::from_millis(200));
    assert_eq!(sink.lines(), delivered);
    assert_eq!(diode.dropped(), dropped);
}
