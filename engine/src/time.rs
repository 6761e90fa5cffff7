use jiff::Timestamp;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
#[cfg(feature = "mock-time")]
use std::sync::Mutex;

/// Ordering key for recorded ledger events.
///
/// Host clocks may repeat or step backwards; `seq` is a per-process counter
/// that breaks ties, and `at` is clamped to never regress, so stamps issued
/// by one `TimeSource` are strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordStamp {
    pub at: Timestamp,
    pub seq: i64,
}

#[derive(Clone)]
pub struct TimeSource {
    /// Largest microsecond value handed out so far.
    high_water: Arc<AtomicI64>,
    seq: Arc<AtomicI64>,
    #[cfg(feature = "mock-time")]
    time: Arc<Mutex<Timestamp>>,
}

impl TimeSource {
    #[allow(clippy::new_without_default)]
    #[cfg(not(feature = "mock-time"))]
    pub fn new() -> Self {
        Self {
            high_water: Arc::new(AtomicI64::new(i64::MIN)),
            seq: Arc::new(AtomicI64::new(0)),
        }
    }

    #[cfg(feature = "mock-time")]
    pub fn new(initial_time: Timestamp) -> Self {
        Self {
            high_water: Arc::new(AtomicI64::new(i64::MIN)),
            seq: Arc::new(AtomicI64::new(0)),
            time: Arc::new(Mutex::new(initial_time)),
        }
    }

    #[cfg(not(feature = "mock-time"))]
    pub fn now(&self) -> Timestamp {
        Timestamp::now()
    }

    #[cfg(feature = "mock-time")]
    pub fn now(&self) -> Timestamp {
        *self.time.lock().unwrap()
    }

    /// Issue the next `(recorded_at, seq)` ordering key.
    pub fn stamp(&self) -> RecordStamp {
        let now = self.now().as_microsecond();
        let prev = self.high_water.fetch_max(now, Ordering::SeqCst);
        let clamped = now.max(prev);
        let at = Timestamp::from_microsecond(clamped)
            .expect("max of two valid timestamps is valid");
        RecordStamp { at, seq: self.seq.fetch_add(1, Ordering::SeqCst) }
    }

    #[cfg(feature = "mock-time")]
    pub fn advance(&self, duration: jiff::Span) {
        let duration = duration
            .to_duration(jiff::SpanRelativeTo::days_are_24_hours())
            .expect("span is representable as a fixed duration");
        *self.time.lock().unwrap() += duration;
    }

    #[cfg(feature = "mock-time")]
    pub fn set(&self, time: Timestamp) {
        *self.time.lock().unwrap() = time;
    }
}
