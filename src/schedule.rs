//! Tick-count scheduling.

/// Fires a task every N ticks.
///
/// Tasks built with the same period but different `stagger` values fire on
/// different ticks, so several of them do not all do their work at once.
#[derive(Debug, Clone)]
pub struct Periodic {
    period: u64,
    count: u64,
}

impl Periodic {
    /// `interval_s` seconds between fires at `tick_period_ms` per tick.
    /// An interval of 0 fires on every tick. The first fire comes after
    /// `stagger` ticks, capped at one period.
    pub fn new(interval_s: u64, tick_period_ms: u64, stagger: u64) -> Self {
        let period = if interval_s == 0 {
            0
        } else {
            (interval_s.saturating_mul(1000) / tick_period_ms.max(1)).saturating_sub(1)
        };

        Self {
            period,
            count: period.saturating_sub(stagger),
        }
    }

    /// Ticks between fires, minus one.
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Advances one tick, calling `fire` when due.
    ///
    /// `fire` returns whether it did its work. If it did not, it is called
    /// again on the next tick. Returns whether `fire` ran and succeeded.
    pub fn tick(&mut self, fire: impl FnOnce() -> bool) -> bool {
        if self.count >= self.period {
            if fire() {
                self.count = 0;
                return true;
            }
            return false;
        }

        self.count += 1;
        false
    }
}
