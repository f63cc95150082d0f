//! Tick clocks that drive playback
//!
//! A [`Ticker`] plays the role of a display-synchronised animator: every tick
//! reports the total time elapsed since the first tick and the time since the
//! previous one. Playback pumps consume these ticks to decide which decoded
//! frames are due.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Default display refresh rate used when nothing else is configured
pub const DEFAULT_TICK_RATE_HZ: u32 = 60;

/// A single clock tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Milliseconds since the ticker started
    pub total_ms: u64,
    /// Milliseconds since the previous tick
    pub delta_ms: u64,
}

/// Source of periodic ticks
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick. Returns `None` once the ticker has ended.
    async fn next_tick(&mut self) -> Option<Tick>;

    /// Stop producing ticks
    fn end(&mut self);

    /// Whether [`Ticker::end`] has been called or the ticker ran out
    fn is_ended(&self) -> bool;
}

/// Ticker backed by `tokio::time::interval`
///
/// Late ticks are skipped rather than bursted, so a slow consumer sees a
/// larger `delta_ms` instead of a backlog of ticks.
#[derive(Debug)]
pub struct IntervalTicker {
    period: Duration,
    interval: Option<Interval>,
    started_at: Option<Instant>,
    last_total_ms: u64,
    ended: bool,
}

impl IntervalTicker {
    /// Create a ticker with an explicit period
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
            started_at: None,
            last_total_ms: 0,
            ended: false,
        }
    }

    /// Create a ticker firing `rate_hz` times per second
    pub fn from_rate_hz(rate_hz: u32) -> Self {
        let rate_hz = rate_hz.max(1);
        Self::new(Duration::from_micros(1_000_000 / rate_hz as u64))
    }

    /// Tick period
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for IntervalTicker {
    fn default() -> Self {
        Self::from_rate_hz(DEFAULT_TICK_RATE_HZ)
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn next_tick(&mut self) -> Option<Tick> {
        if self.ended {
            return None;
        }

        // Created lazily so the ticker can be built outside a runtime
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        let now = interval.tick().await;
        let started_at = *self.started_at.get_or_insert(now);
        let total_ms = now.duration_since(started_at).as_millis() as u64;
        let delta_ms = total_ms.saturating_sub(self.last_total_ms);
        self.last_total_ms = total_ms;

        Some(Tick { total_ms, delta_ms })
    }

    fn end(&mut self) {
        if !self.ended {
            debug!("Interval ticker ended after {} ms", self.last_total_ms);
        }
        self.ended = true;
        self.interval = None;
    }

    fn is_ended(&self) -> bool {
        self.ended
    }
}

/// Ticker that replays a fixed list of timestamps
///
/// Useful for deterministic playback and tests.
#[derive(Debug, Clone, Default)]
pub struct ManualTicker {
    pending: VecDeque<u64>,
    last_total_ms: u64,
    ended: bool,
}

impl ManualTicker {
    /// Create a ticker that yields the given totals in order
    pub fn new(totals_ms: impl IntoIterator<Item = u64>) -> Self {
        Self {
            pending: totals_ms.into_iter().collect(),
            last_total_ms: 0,
            ended: false,
        }
    }

    /// Create a ticker with `count` ticks spaced `step_ms` apart, starting at zero
    pub fn stepped(step_ms: u64, count: usize) -> Self {
        Self::new((0..count as u64).map(|i| i * step_ms))
    }

    /// Append another tick
    pub fn push(&mut self, total_ms: u64) {
        self.pending.push_back(total_ms);
    }

    /// Number of ticks left
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn next_tick(&mut self) -> Option<Tick> {
        if self.ended {
            return None;
        }

        match self.pending.pop_front() {
            Some(total_ms) => {
                let delta_ms = total_ms.saturating_sub(self.last_total_ms);
                self.last_total_ms = total_ms;
                Some(Tick { total_ms, delta_ms })
            }
            None => {
                self.ended = true;
                None
            }
        }
    }

    fn end(&mut self) {
        self.ended = true;
        self.pending.clear();
    }

    fn is_ended(&self) -> bool {
        self.ended
    }
}
