use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Callback invoked with every progress update.
pub type Renderer = Box<dyn Fn(Snapshot) + Send + Sync>;

/// A point-in-time view of a [`Progress`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub current: u64,
    pub total: u64,
}

impl Snapshot {
    /// Completion in percent, within `0.0..=100.0`.
    ///
    /// An empty total reads as zero instead of dividing by it, and a current
    /// count that overshoots the total (a server sending more bytes than the
    /// manifest promised) is clamped.
    ///
    /// ```
    /// use retrocache_fetch::Snapshot;
    ///
    /// assert_eq!(Snapshot { current: 0, total: 0 }.percentage(), 0.0);
    /// assert_eq!(Snapshot { current: 25, total: 100 }.percentage(), 25.0);
    /// assert_eq!(Snapshot { current: 150, total: 100 }.percentage(), 100.0);
    /// ```
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let percentage = self.current as f64 / self.total as f64 * 100.0;
        match percentage.is_finite() {
            true => percentage.clamp(0.0, 100.0),
            false => 0.0,
        }
    }
}

/// Aggregated byte progress across every asset of one loading phase.
///
/// Counters are atomics, so one `Progress` can be shared by reference
/// between all concurrent fetches of a phase. Totals only ever grow: each
/// fetch registers its expected size once, before it first yields, and then
/// reports bytes as they arrive.
pub struct Progress {
    current: AtomicU64,
    total: AtomicU64,
    renderer: Option<Renderer>,
}

impl Progress {
    pub fn new() -> Self {
        Self {
            current: AtomicU64::new(0),
            total: AtomicU64::new(0),
            renderer: None,
        }
    }

    pub fn with_renderer(renderer: impl Fn(Snapshot) + Send + Sync + 'static) -> Self {
        Self {
            renderer: Some(Box::new(renderer)),
            ..Self::new()
        }
    }

    /// Add an asset's expected size to the total.
    pub fn register(&self, expected_size: u64) {
        self.total.fetch_add(expected_size, Ordering::Relaxed);
    }

    /// Record received bytes and notify the renderer.
    pub fn advance(&self, bytes: u64) {
        let current = self.current.fetch_add(bytes, Ordering::Relaxed).saturating_add(bytes);
        let total = self.total.load(Ordering::Relaxed);
        if let Some(renderer) = &self.renderer {
            renderer(Snapshot { current, total });
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            current: self.current.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
        }
    }

    pub fn percentage(&self) -> f64 {
        self.snapshot().percentage()
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("current", &self.current)
            .field("total", &self.total)
            .field("renderer", &self.renderer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_aggregates_across_assets() {
        let progress = Progress::new();
        progress.register(1000);
        progress.register(3000);
        assert_eq!(progress.percentage(), 0.0);
        progress.advance(1000);
        assert_eq!(progress.percentage(), 25.0);
        progress.advance(3000);
        assert_eq!(progress.snapshot(), Snapshot { current: 4000, total: 4000 });
        assert_eq!(progress.percentage(), 100.0);
    }

    #[test]
    fn test_empty_total_is_zero() {
        let progress = Progress::new();
        progress.advance(10);
        assert_eq!(progress.percentage(), 0.0);
    }

    #[test]
    fn test_overshoot_is_clamped() {
        let progress = Progress::new();
        progress.register(10);
        progress.advance(25);
        assert_eq!(progress.percentage(), 100.0);
    }

    #[test]
    fn test_renderer_sees_every_update() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let progress = Progress::with_renderer({
            let seen = Arc::clone(&seen);
            move |snapshot| seen.lock().unwrap().push(snapshot.percentage())
        });
        progress.register(4);
        progress.advance(1);
        progress.advance(1);
        progress.advance(2);
        assert_eq!(*seen.lock().unwrap(), vec![25.0, 50.0, 100.0]);
    }
}
