//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! annotation store (field dropped) ─┐
//! diode writer (entries dropped)   ─┼─→ metrics.rs → `metrics` recorder
//! logger (write failed)            ─┘
//! ```
//!
//! Human-readable diagnostics for the same events go through the `log`
//! facade at the point where they happen.

pub mod metrics;
