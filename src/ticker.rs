//! Cancellable repeating task.
//!
//! `schedule(interval, callback)` runs `callback(tick)` on a background thread
//! every `interval` until the returned handle is cancelled or dropped.
//! Cancellation wakes the thread immediately and joins it, so no callback
//! runs after `cancel()` returns.

use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

pub struct TickerHandle {
    cancel: Option<Sender<()>>,
    join: Option<JoinHandle<u64>>,
}

pub fn schedule<F>(interval: Duration, mut callback: F) -> Result<TickerHandle>
where
    F: FnMut(u64) + Send + 'static,
{
    if interval.is_zero() {
        return Err(anyhow!("ticker interval must be greater than zero"));
    }
    let (cancel, cancelled) = mpsc::channel::<()>();
    let join = std::thread::Builder::new()
        .name("progress-ticker".to_string())
        .spawn(move || {
            let mut tick = 0u64;
            loop {
                match cancelled.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        callback(tick);
                        tick += 1;
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            tick
        })?;
    Ok(TickerHandle {
        cancel: Some(cancel),
        join: Some(join),
    })
}

impl TickerHandle {
    /// Stop the task and wait for it. Returns the number of ticks that fired.
    pub fn cancel(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        // Dropping the sender disconnects the channel and wakes the thread.
        self.cancel.take();
        match self.join.take() {
            Some(join) => join.join().unwrap_or_else(|_| {
                log::error!("progress ticker thread panicked");
                0
            }),
            None => 0,
        }
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn ticks_until_cancelled() -> Result<()> {
        let seen = Arc::new(AtomicU64::new(0));
        let counter = seen.clone();
        let handle = schedule(Duration::from_millis(5), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })?;
        std::thread::sleep(Duration::from_millis(60));
        let fired = handle.cancel();
        assert!(fired >= 2, "expected several ticks, got {}", fired);
        assert_eq!(seen.load(Ordering::SeqCst), fired);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(seen.load(Ordering::SeqCst), fired);
        Ok(())
    }

    #[test]
    fn cancel_is_prompt_for_long_intervals() -> Result<()> {
        let handle = schedule(Duration::from_secs(3600), |_| {})?;
        let start = std::time::Instant::now();
        assert_eq!(handle.cancel(), 0);
        assert!(start.elapsed() < Duration::from_secs(1));
        Ok(())
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(schedule(Duration::ZERO, |_| {}).is_err());
    }
}
