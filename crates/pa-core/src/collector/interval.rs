//! Polling collector over a native probe.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::MissedTickBehavior;

use super::task::CaptureTask;
use super::{Callback, CollectedData, Collector, CollectorError, CollectorKind};
use crate::event::Clock;

/// A native probe failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ProbeError(pub String);

/// Native hook sampled by an [`IntervalCollector`].
///
/// Implementations wrap the platform API (foreground window, input counters).
/// The collector never interprets what a probe returns.
pub trait Probe: Send + Sync + 'static {
    /// Acquires the native hook. Called on every start and resume.
    fn open(&self) -> Result<(), ProbeError> {
        Ok(())
    }

    /// Takes one sample. `Ok(None)` means nothing to report this tick.
    fn sample(&self) -> Result<Option<serde_json::Value>, ProbeError>;
}

/// Samples a probe every `interval` and forwards each sample to the callback.
pub struct IntervalCollector {
    kind: CollectorKind,
    interval: Duration,
    probe: Arc<dyn Probe>,
    callback: Callback,
    clock: Arc<dyn Clock>,
    redacted_keys: Vec<&'static str>,
    task: CaptureTask,
}

impl IntervalCollector {
    pub fn new(
        kind: CollectorKind,
        interval: Duration,
        probe: Arc<dyn Probe>,
        callback: Callback,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            kind,
            interval,
            probe,
            callback,
            clock,
            redacted_keys: Vec::new(),
            task: CaptureTask::default(),
        }
    }

    /// Removes these top-level keys from every object sample before delivery.
    #[must_use]
    pub fn with_redacted_keys(mut self, keys: &[&'static str]) -> Self {
        self.redacted_keys = keys.to_vec();
        self
    }
}

#[async_trait]
impl Collector for IntervalCollector {
    fn kind(&self) -> CollectorKind {
        self.kind
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn is_running(&self) -> bool {
        self.task.is_running()
    }

    async fn start(&mut self) -> Result<(), CollectorError> {
        if self.is_running() {
            return Ok(());
        }
        let kind = self.kind;
        self.probe
            .open()
            .map_err(|err| CollectorError::StartFailed {
                kind,
                reason: err.to_string(),
            })?;

        let probe = Arc::clone(&self.probe);
        let callback = Arc::clone(&self.callback);
        let clock = Arc::clone(&self.clock);
        let redacted_keys = self.redacted_keys.clone();
        let period = self.interval;
        self.task.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match probe.sample() {
                    Ok(Some(mut data)) => {
                        if let Some(object) = data.as_object_mut() {
                            for key in &redacted_keys {
                                object.remove(*key);
                            }
                        }
                        callback(CollectedData::Sample {
                            kind,
                            captured_at: clock.now(),
                            data,
                        });
                    }
                    Ok(None) => {}
                    Err(err) => tracing::warn!(%kind, error = %err, "probe sample failed"),
                }
            }
        });
        tracing::debug!(%kind, interval = ?period, "collector started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CollectorError> {
        self.task.stop(self.kind).await?;
        tracing::debug!(kind = %self.kind, "collector stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        samples: AtomicUsize,
        fail_open: bool,
    }

    impl Probe for CountingProbe {
        fn open(&self) -> Result<(), ProbeError> {
            if self.fail_open {
                return Err(ProbeError("screen recording permission missing".into()));
            }
            Ok(())
        }

        fn sample(&self) -> Result<Option<serde_json::Value>, ProbeError> {
            let n = self.samples.fetch_add(1, Ordering::SeqCst);
            Ok(Some(serde_json::json!({
                "n": n,
                "title": "secret.txt",
                "url": "https://example.com",
            })))
        }
    }

    fn collector(fail_open: bool) -> (IntervalCollector, Arc<Mutex<Vec<CollectedData>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let callback: Callback = Arc::new(move |data: CollectedData| sink.lock().unwrap().push(data));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
        ));
        let probe = Arc::new(CountingProbe {
            samples: AtomicUsize::new(0),
            fail_open,
        });
        let collector = IntervalCollector::new(
            CollectorKind::WindowActivity,
            Duration::from_secs(1),
            probe,
            callback,
            clock,
        );
        (collector, received)
    }

    #[tokio::test(start_paused = true)]
    async fn samples_every_interval_until_stopped() {
        let (mut collector, received) = collector(false);
        collector.start().await.unwrap();
        assert!(collector.is_running());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        collector.stop().await.unwrap();
        assert!(!collector.is_running());
        let delivered = received.lock().unwrap().len();
        assert_eq!(delivered, 3);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(received.lock().unwrap().len(), delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let (mut collector, _received) = collector(false);
        collector.stop().await.unwrap();
        collector.start().await.unwrap();
        collector.stop().await.unwrap();
        collector.stop().await.unwrap();
        assert!(!collector.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_open_reports_start_failure() {
        let (mut collector, received) = collector(true);
        let err = collector.start().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "window_activity failed to start: screen recording permission missing"
        );
        assert!(!collector.is_running());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(received.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn redacted_keys_are_removed() {
        let (collector, received) = collector(false);
        let mut collector = collector.with_redacted_keys(&["title", "url"]);
        collector.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        collector.stop().await.unwrap();

        let received = received.lock().unwrap();
        let CollectedData::Sample { kind, data, .. } = &received[0] else {
            panic!("expected a sample, got {:?}", received[0]);
        };
        assert_eq!(*kind, CollectorKind::WindowActivity);
        assert_eq!(data, &serde_json::json!({"n": 0}));
    }
}
