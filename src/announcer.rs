//! Progress announcer.
//!
//! Purely cosmetic: while a submission is in flight, cycle through a fixed
//! list of status strings on a fixed cadence. The strings say nothing about
//! real progress and nothing downstream may branch on them.
//!
//! `begin()` returns an `Announcement` guard. Ending happens exactly once,
//! either through `Announcement::end()` or when the guard is dropped on an
//! early return or unwind.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::ticker::{self, TickerHandle};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

pub const DEFAULT_MESSAGES: [&str; 7] = [
    "Analyzing face...",
    "Checking credit score...",
    "Cross-checking your search history...",
    "Evaluating meme preferences...",
    "Detecting emotional instability...",
    "Connecting to refrigerator camera...",
    "Comparing with government database...",
];

/// Receives each published status string.
pub type StatusSink = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnnouncerStats {
    pub begun: u64,
    pub ended: u64,
}

impl AnnouncerStats {
    pub fn running(&self) -> u64 {
        self.begun.saturating_sub(self.ended)
    }
}

#[derive(Debug, Default)]
struct Counters {
    begun: AtomicU64,
    ended: AtomicU64,
}

pub struct ProgressAnnouncer {
    messages: Arc<[String]>,
    interval: Duration,
    counters: Arc<Counters>,
}

impl ProgressAnnouncer {
    pub fn new(messages: Vec<String>, interval: Duration) -> Result<Self> {
        if messages.is_empty() {
            return Err(anyhow!("progress announcer needs at least one message"));
        }
        if interval.is_zero() {
            return Err(anyhow!("progress interval must be greater than zero"));
        }
        Ok(Self {
            messages: messages.into(),
            interval,
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn with_defaults() -> Self {
        Self {
            messages: DEFAULT_MESSAGES.iter().map(|m| m.to_string()).collect(),
            interval: DEFAULT_INTERVAL,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Message shown on tick `n`.
    pub fn message_for_tick(&self, tick: u64) -> &str {
        &self.messages[(tick % self.messages.len() as u64) as usize]
    }

    /// Start cycling. Tick `n` publishes `messages[n % len]` to `sink`.
    ///
    /// If the timer thread cannot be spawned the announcement still counts
    /// as begun (and will be ended) but publishes nothing.
    pub fn begin(&self, sink: StatusSink) -> Announcement {
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        let messages = self.messages.clone();
        let task = ticker::schedule(self.interval, move |tick| {
            let index = (tick % messages.len() as u64) as usize;
            sink(&messages[index]);
        });
        let task = match task {
            Ok(task) => Some(task),
            Err(err) => {
                log::warn!("progress announcer disabled: {:#}", err);
                None
            }
        };
        Announcement {
            task,
            counters: Some(self.counters.clone()),
        }
    }

    pub fn stats(&self) -> AnnouncerStats {
        AnnouncerStats {
            begun: self.counters.begun.load(Ordering::SeqCst),
            ended: self.counters.ended.load(Ordering::SeqCst),
        }
    }
}

impl Default for ProgressAnnouncer {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// A running announcement. Ends on `end()` or drop, whichever comes first.
pub struct Announcement {
    task: Option<TickerHandle>,
    counters: Option<Arc<Counters>>,
}

impl Announcement {
    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        let Some(counters) = self.counters.take() else {
            return;
        };
        if let Some(task) = self.task.take() {
            let ticks = task.cancel();
            log::debug!("progress announcer stopped after {} tick(s)", ticks);
        }
        counters.ended.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for Announcement {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_sink() -> (StatusSink, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let store = seen.clone();
        let sink: StatusSink = Arc::new(move |msg: &str| {
            store
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(msg.to_string());
        });
        (sink, seen)
    }

    #[test]
    fn cycles_and_wraps_around() -> Result<()> {
        let announcer = ProgressAnnouncer::new(
            vec!["one".into(), "two".into(), "three".into()],
            Duration::from_millis(5),
        )?;
        let (sink, seen) = recording_sink();
        let announcement = announcer.begin(sink);
        std::thread::sleep(Duration::from_millis(80));
        announcement.end();

        let seen = seen.lock().unwrap().clone();
        assert!(seen.len() >= 4, "expected a wrap-around, got {:?}", seen);
        for (tick, msg) in seen.iter().enumerate() {
            assert_eq!(msg, announcer.message_for_tick(tick as u64));
        }
        Ok(())
    }

    #[test]
    fn end_runs_once_per_begin_even_on_panic() -> Result<()> {
        let announcer = ProgressAnnouncer::new(vec!["busy".into()], Duration::from_millis(5))?;
        let (sink, _) = recording_sink();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _announcement = announcer.begin(sink.clone());
            panic!("wrapped operation failed");
        }));
        assert!(result.is_err());
        assert_eq!(announcer.stats(), AnnouncerStats { begun: 1, ended: 1 });

        let announcement = announcer.begin(sink);
        announcement.end();
        assert_eq!(announcer.stats(), AnnouncerStats { begun: 2, ended: 2 });
        assert_eq!(announcer.stats().running(), 0);
        Ok(())
    }

    #[test]
    fn nothing_is_published_after_end() -> Result<()> {
        let announcer = ProgressAnnouncer::new(vec!["tick".into()], Duration::from_millis(5))?;
        let (sink, seen) = recording_sink();
        let announcement = announcer.begin(sink);
        std::thread::sleep(Duration::from_millis(30));
        drop(announcement);

        let count = seen.lock().unwrap().len();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(seen.lock().unwrap().len(), count);
        Ok(())
    }

    #[test]
    fn rejects_empty_message_list() {
        assert!(ProgressAnnouncer::new(Vec::new(), DEFAULT_INTERVAL).is_err());
    }
}
