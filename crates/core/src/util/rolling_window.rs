use std::collections::VecDeque;
use std::time::Duration;

pub trait Timestamped {
    fn timestamp(&self) -> Duration;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("timestamp {got:?} is not after the newest entry {newest:?}")]
    OutOfOrder { newest: Duration, got: Duration },
}

/// Timestamp-ordered buffer that only keeps entries within `horizon` of the newest one.
///
/// Entries must be pushed with strictly increasing timestamps. After every push,
/// `newest - oldest <= horizon`.
#[derive(Clone, Debug)]
pub struct RollingWindow<T> {
    buf: VecDeque<T>,
    horizon: Duration,
}

impl<T: Timestamped> RollingWindow<T> {
    pub fn new(horizon: Duration) -> Self {
        Self {
            buf: VecDeque::new(),
            horizon,
        }
    }

    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends `value` and evicts everything older than `value.timestamp() - horizon`.
    /// Returns how many entries were evicted.
    pub fn push(&mut self, value: T) -> Result<usize, WindowError> {
        let now = value.timestamp();
        if let Some(newest) = self.newest() {
            let newest = newest.timestamp();
            if now <= newest {
                return Err(WindowError::OutOfOrder { newest, got: now });
            }
        }
        self.buf.push_back(value);
        Ok(self.evict_before(now.saturating_sub(self.horizon)))
    }

    /// Drops entries with a timestamp strictly before `cutoff`.
    pub fn evict_before(&mut self, cutoff: Duration) -> usize {
        let mut evicted = 0;
        while self
            .buf
            .front()
            .is_some_and(|oldest| oldest.timestamp() < cutoff)
        {
            self.buf.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn oldest(&self) -> Option<&T> {
        self.buf.front()
    }

    pub fn newest(&self) -> Option<&T> {
        self.buf.back()
    }

    /// Time between the oldest and newest entry.
    pub fn span(&self) -> Duration {
        match (self.oldest(), self.newest()) {
            (Some(a), Some(b)) => b.timestamp().saturating_sub(a.timestamp()),
            _ => Duration::ZERO,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct At(u64);

    impl Timestamped for At {
        fn timestamp(&self) -> Duration {
            Duration::from_millis(self.0)
        }
    }

    fn stamps(w: &RollingWindow<At>) -> Vec<u64> {
        w.iter().map(|a| a.0).collect()
    }

    #[test]
    fn evicts_entries_older_than_horizon() {
        let mut w = RollingWindow::new(Duration::from_millis(100));
        assert!(w.is_empty());

        assert_eq!(w.push(At(0)), Ok(0));
        assert_eq!(w.push(At(50)), Ok(0));
        assert_eq!(w.push(At(100)), Ok(0));
        assert_eq!(stamps(&w), vec![0, 50, 100]);

        assert_eq!(w.push(At(151)), Ok(2));
        assert_eq!(stamps(&w), vec![100, 151]);
    }

    #[test]
    fn rejects_non_increasing_timestamps() {
        let mut w = RollingWindow::new(Duration::from_secs(1));
        w.push(At(10)).expect("first push");
        let err = w.push(At(10)).unwrap_err();
        assert_eq!(
            err,
            WindowError::OutOfOrder {
                newest: Duration::from_millis(10),
                got: Duration::from_millis(10)
            }
        );
        assert!(w.push(At(5)).is_err());
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn span_never_exceeds_horizon() {
        let horizon = Duration::from_millis(250);
        let mut w = RollingWindow::new(horizon);
        // Irregular gaps, including jumps larger than the horizon.
        let mut t = 0;
        for gap in [1, 7, 90, 3, 400, 12, 249, 250, 251, 1, 1, 600, 33] {
            t += gap;
            w.push(At(t)).expect("increasing");
            assert!(w.span() <= horizon, "span {:?} at t={t}", w.span());
            assert_eq!(w.newest(), Some(&At(t)));
        }
    }

    #[test]
    fn explicit_eviction() {
        let mut w = RollingWindow::new(Duration::from_secs(10));
        for t in [1, 2, 3, 4] {
            w.push(At(t * 1000)).expect("increasing");
        }
        assert_eq!(w.evict_before(Duration::from_millis(2500)), 2);
        assert_eq!(stamps(&w), vec![3000, 4000]);
        assert_eq!(w.span(), Duration::from_secs(1));
    }
}
