//! # FaceLens Core
//!
//! Foundational pieces shared by the FaceLens media and application crates:
//! the error type, the tick clocks that drive playback, the scoped gate that
//! keeps camera open/close sequences from interleaving, and the named
//! background worker that camera session setup runs on.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod gate;
pub mod worker;

// Re-export main types
pub use clock::{IntervalTicker, ManualTicker, Tick, Ticker, DEFAULT_TICK_RATE_HZ};
pub use error::FaceLensError;
pub use gate::{CameraGate, CameraGateGuard, DEFAULT_GATE_TIMEOUT};
pub use worker::BackgroundWorker;
