use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

type Sink = Box<dyn Fn(u8) + Send + Sync>;

struct Shared {
    last: AtomicU8,
    sink: Sink,
}

/// Progress reporter. Reported values never go backwards, and a sub-range
/// reporter maps its own 0..=100 onto a slice of its parent.
#[derive(Clone)]
pub struct Progress {
    shared: Arc<Shared>,
    start: u8,
    end: u8,
}

impl Progress {
    pub fn new(sink: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                last: AtomicU8::new(0),
                sink: Box::new(sink),
            }),
            start: 0,
            end: 100,
        }
    }

    pub fn silent() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, percent: u8) {
        let span = u32::from(self.end - self.start);
        let mapped = self.start + (span * u32::from(percent.min(100)) / 100) as u8;
        let previous = self.shared.last.fetch_max(mapped, Ordering::SeqCst);
        if mapped > previous {
            (self.shared.sink)(mapped);
        }
    }

    pub fn last(&self) -> u8 {
        self.shared.last.load(Ordering::SeqCst)
    }

    /// Reporter for the `[start, end]` percent slice of this one.
    pub fn sub_range(&self, start: u8, end: u8) -> Self {
        let span = u32::from(self.end - self.start);
        let at = |p: u8| self.start + (span * u32::from(p.min(100)) / 100) as u8;
        let (start, end) = (at(start), at(end.max(start)));
        Self {
            shared: Arc::clone(&self.shared),
            start,
            end,
        }
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("last", &self.last())
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording() -> (Progress, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (Progress::new(move |p| sink.lock().push(p)), seen)
    }

    #[test]
    fn never_goes_backwards() {
        let (progress, seen) = recording();
        for p in [10, 30, 20, 30, 150, 90] {
            progress.report(p);
        }
        assert_eq!(*seen.lock(), vec![10, 30, 100]);
        assert_eq!(progress.last(), 100);
    }

    #[test]
    fn sub_ranges_map_into_parent() {
        let (progress, seen) = recording();
        let first = progress.sub_range(0, 50);
        let second = progress.sub_range(50, 100);
        first.report(100);
        second.report(0);
        second.report(50);
        first.report(20);
        second.report(100);
        assert_eq!(*seen.lock(), vec![50, 75, 100]);
    }
}
