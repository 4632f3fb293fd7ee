//! Polling watchers for the signals the background binary leaves behind.
//!
//! Each watcher races a fixed poll interval against a single deadline. Both
//! resolve exactly once and stop polling as soon as they resolve.

use crate::error::ActionError;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// A source of a one-way state transition published by another process.
pub trait Probe {
    fn observe(&self) -> bool;
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct SentinelFile {
    path: PathBuf,
}

impl SentinelFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Probe for SentinelFile {
    fn observe(&self) -> bool {
        self.path.exists()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTiming {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    Found,
    TimedOut,
}

/// Ticks every `poll_interval` until the probe fires or `timeout` elapses.
///
/// The last tick lands on the deadline and still observes the probe.
pub fn watch(probe: &dyn Probe, timing: WatchTiming) -> WatchOutcome {
    let deadline = Instant::now() + timing.timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        thread::sleep(timing.poll_interval.min(remaining));
        if probe.observe() {
            return WatchOutcome::Found;
        }
        if Instant::now() >= deadline {
            return WatchOutcome::TimedOut;
        }
    }
}

pub fn await_ready(probe: &dyn Probe, timing: WatchTiming) -> Result<(), ActionError> {
    match watch(probe, timing) {
        WatchOutcome::Found => {
            debug!("Found pipeline-enforcer init file: {}", probe.describe());
            Ok(())
        }
        WatchOutcome::TimedOut => Err(ActionError::Timeout(format!(
            "{} did not appear within {} ms",
            probe.describe(),
            timing.timeout.as_millis()
        ))),
    }
}

/// Succeeds when the error probe stays silent for the whole window.
pub fn await_no_error(probe: &dyn Probe, timing: WatchTiming) -> Result<(), ActionError> {
    match watch(probe, timing) {
        WatchOutcome::Found => {
            debug!("Found pipeline-enforcer error file: {}", probe.describe());
            Err(ActionError::Scan(probe.describe()))
        }
        WatchOutcome::TimedOut => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use tempfile::tempdir;

    struct CountingProbe {
        fires_on: Option<u32>,
        calls: Cell<u32>,
    }

    impl CountingProbe {
        fn new(fires_on: Option<u32>) -> Self {
            Self {
                fires_on,
                calls: Cell::new(0),
            }
        }
    }

    impl Probe for CountingProbe {
        fn observe(&self) -> bool {
            let calls = self.calls.get() + 1;
            self.calls.set(calls);
            self.fires_on.is_some_and(|n| calls >= n)
        }

        fn describe(&self) -> String {
            "counting probe".to_string()
        }
    }

    fn timing(poll_ms: u64, timeout_ms: u64) -> WatchTiming {
        WatchTiming {
            poll_interval: Duration::from_millis(poll_ms),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[test]
    fn ready_resolves_when_sentinel_appears() {
        let dir = tempdir().unwrap();
        let sentinel = dir.path().join("pipeline-enforcer.start");
        let writer_path = sentinel.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            fs::write(writer_path, "").unwrap();
        });

        let started = Instant::now();
        await_ready(&SentinelFile::new(&sentinel), timing(20, 5_000)).unwrap();
        let elapsed = started.elapsed();
        writer.join().unwrap();

        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn ready_times_out_when_sentinel_never_appears() {
        let dir = tempdir().unwrap();
        let probe = SentinelFile::new(dir.path().join("never"));
        let started = Instant::now();
        let err = await_ready(&probe, timing(20, 200)).expect_err("timeout");
        let elapsed = started.elapsed();
        assert!(matches!(err, ActionError::Timeout(_)));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn error_window_passes_when_sentinel_stays_absent() {
        let dir = tempdir().unwrap();
        let probe = SentinelFile::new(dir.path().join("pipeline-enforcer.error"));
        let started = Instant::now();
        await_no_error(&probe, timing(20, 200)).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn error_sentinel_fails_early() {
        let dir = tempdir().unwrap();
        let sentinel = dir.path().join("pipeline-enforcer.error");
        fs::write(&sentinel, "").unwrap();
        let started = Instant::now();
        let err = await_no_error(&SentinelFile::new(&sentinel), timing(20, 5_000))
            .expect_err("error sentinel");
        assert!(matches!(err, ActionError::Scan(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn error_sentinel_written_mid_window_fails_promptly() {
        let dir = tempdir().unwrap();
        let sentinel = dir.path().join("pipeline-enforcer.error");
        let writer_path = sentinel.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            fs::write(writer_path, "").unwrap();
        });

        let started = Instant::now();
        let err = await_no_error(&SentinelFile::new(&sentinel), timing(20, 5_000))
            .expect_err("error sentinel");
        let elapsed = started.elapsed();
        writer.join().unwrap();

        assert!(matches!(err, ActionError::Scan(_)));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn sentinel_in_last_interval_is_seen_on_deadline_tick() {
        let dir = tempdir().unwrap();
        let sentinel = dir.path().join("pipeline-enforcer.start");
        let writer_path = sentinel.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(750));
            fs::write(writer_path, "").unwrap();
        });

        let result = await_ready(&SentinelFile::new(&sentinel), timing(500, 1_000));
        writer.join().unwrap();

        assert!(result.is_ok());
    }

    #[test]
    fn timeout_equal_to_poll_interval_observes_once() {
        let dir = tempdir().unwrap();
        let start = dir.path().join("pipeline-enforcer.start");
        let error = dir.path().join("pipeline-enforcer.error");
        fs::write(&start, "").unwrap();
        fs::write(&error, "").unwrap();

        await_ready(&SentinelFile::new(&start), timing(100, 100)).unwrap();
        let err = await_no_error(&SentinelFile::new(&error), timing(100, 100))
            .expect_err("error sentinel");
        assert!(matches!(err, ActionError::Scan(_)));

        let probe = CountingProbe::new(None);
        assert_eq!(watch(&probe, timing(50, 50)), WatchOutcome::TimedOut);
        assert_eq!(probe.calls.get(), 1);
    }

    #[test]
    fn polling_stops_after_resolution() {
        let probe = CountingProbe::new(Some(3));
        assert_eq!(watch(&probe, timing(5, 5_000)), WatchOutcome::Found);
        assert_eq!(probe.calls.get(), 3);
    }

    #[test]
    fn deadline_tick_is_the_last_observation() {
        let probe = CountingProbe::new(None);
        assert_eq!(watch(&probe, timing(50, 120)), WatchOutcome::TimedOut);
        let calls = probe.calls.get();
        assert!((1..=3).contains(&calls));
    }
}
