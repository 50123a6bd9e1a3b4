use crate::core::{Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

/// Source of the current instant in epoch millis.
pub trait InstantSource: Send + Sync {
    fn millis(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl InstantSource for SystemClock {
    fn millis(&self) -> Timestamp {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl InstantSource for ManualClock {
    fn millis(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// How the engine's notion of "now" deviates from its instant source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClockModification {
    #[default]
    None,
    Pin { time: Timestamp },
    Offset { offset: i64 },
}

impl ClockModification {
    pub fn apply(self, now: Timestamp) -> Timestamp {
        match self {
            ClockModification::None => now,
            ClockModification::Pin { time } => time,
            ClockModification::Offset { offset } => now.saturating_add(offset),
        }
    }
}

/// The clock every "now" read during processing and due-date checks goes through.
#[derive(Clone)]
pub struct StreamClock {
    source: Arc<dyn InstantSource>,
    modification: Arc<RwLock<ClockModification>>,
}

impl StreamClock {
    pub fn new(source: Arc<dyn InstantSource>) -> Self {
        Self {
            source,
            modification: Arc::new(RwLock::new(ClockModification::None)),
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    pub fn millis(&self) -> Result<Timestamp> {
        let modification = *self.modification.read()?;
        Ok(modification.apply(self.source.millis()))
    }

    pub fn modification(&self) -> Result<ClockModification> {
        Ok(*self.modification.read()?)
    }

    pub fn apply_modification(&self, modification: ClockModification) -> Result<()> {
        *self.modification.write()? = modification;
        Ok(())
    }

    pub fn pin_at(&self, time: Timestamp) -> Result<()> {
        self.apply_modification(ClockModification::Pin { time })
    }

    pub fn offset_by(&self, offset: i64) -> Result<()> {
        self.apply_modification(ClockModification::Offset { offset })
    }

    pub fn reset(&self) -> Result<()> {
        self.apply_modification(ClockModification::None)
    }
}

impl std::fmt::Debug for StreamClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClock")
            .field("now", &self.source.millis())
            .field("modification", &self.modification.read().ok().map(|m| *m))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifications_apply_to_source() {
        let source = ManualClock::new(1_000);
        let clock = StreamClock::new(Arc::new(source.clone()));
        assert_eq!(clock.millis().unwrap(), 1_000);

        clock.offset_by(500).unwrap();
        source.advance(10);
        assert_eq!(clock.millis().unwrap(), 1_510);

        clock.pin_at(42).unwrap();
        source.advance(10);
        assert_eq!(clock.millis().unwrap(), 42);

        clock.reset().unwrap();
        assert_eq!(clock.millis().unwrap(), 1_020);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.millis() > 1_577_836_800_000);
    }
}
