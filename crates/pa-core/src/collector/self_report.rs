//! Periodic self-report prompts.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::task::CaptureTask;
use super::{Callback, CollectedData, Collector, CollectorError, CollectorKind};
use crate::config::SelfReportConfig;
use crate::event::Clock;

/// A self-report prompt that is due to be shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfReportPrompt {
    pub prompted_at: DateTime<Utc>,
    pub question: String,
    pub scale: u8,
    #[serde(default)]
    pub response_options: Vec<String>,
}

/// Stretches or shrinks `base` by up to `randomization`.
///
/// `unit` is a uniform sample in `[0, 1)`: 0 gives `base * (1 - randomization)`,
/// 0.5 gives `base`. Saturates at [`Duration::MAX`] instead of overflowing.
pub fn jittered_interval(base: Duration, randomization: f64, unit: f64) -> Duration {
    let factor = randomization.mul_add(2.0f64.mul_add(unit, -1.0), 1.0);
    Duration::try_from_secs_f64(base.as_secs_f64() * factor.max(0.0)).unwrap_or(Duration::MAX)
}

/// Fires a prompt after each randomized interval, cycling through the configured questions.
pub struct SelfReportCollector {
    config: SelfReportConfig,
    callback: Callback,
    clock: Arc<dyn Clock>,
    next_question: Arc<AtomicUsize>,
    task: CaptureTask,
}

impl SelfReportCollector {
    pub fn new(config: SelfReportConfig, callback: Callback, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            callback,
            clock,
            next_question: Arc::new(AtomicUsize::new(0)),
            task: CaptureTask::default(),
        }
    }
}

fn build_prompt(
    config: &SelfReportConfig,
    index: usize,
    prompted_at: DateTime<Utc>,
) -> Option<SelfReportPrompt> {
    let count = config.questions.len();
    if count == 0 {
        return None;
    }
    let index = index % count;
    Some(SelfReportPrompt {
        prompted_at,
        question: config.questions[index].clone(),
        scale: config.scale,
        response_options: config.response_options.get(index).cloned().unwrap_or_default(),
    })
}

#[async_trait]
impl Collector for SelfReportCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::SelfReport
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(self.config.interval_ms)
    }

    fn is_running(&self) -> bool {
        self.task.is_running()
    }

    async fn start(&mut self) -> Result<(), CollectorError> {
        if self.is_running() {
            return Ok(());
        }
        if self.config.questions.is_empty() {
            return Err(CollectorError::StartFailed {
                kind: CollectorKind::SelfReport,
                reason: "no questions configured".to_string(),
            });
        }

        let config = self.config.clone();
        let callback = Arc::clone(&self.callback);
        let clock = Arc::clone(&self.clock);
        let next_question = Arc::clone(&self.next_question);
        let base = self.interval();
        self.task.spawn(async move {
            let mut rng = StdRng::from_entropy();
            loop {
                let unit: f64 = rng.gen_range(0.0..1.0);
                let wait = jittered_interval(base, config.sampling_randomization, unit);
                tokio::time::sleep(wait).await;

                let index = next_question.fetch_add(1, Ordering::Relaxed);
                if let Some(prompt) = build_prompt(&config, index, clock.now()) {
                    tracing::debug!(prompted_at = %prompt.prompted_at, "self-report prompt due");
                    callback(CollectedData::Prompt(prompt));
                }
            }
        });
        tracing::debug!(interval = ?base, "self-report sampling started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CollectorError> {
        self.task.stop(CollectorKind::SelfReport).await
    }
}
