//! Participation day counter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use tokio::time::MissedTickBehavior;

use super::task::CaptureTask;
use super::{Callback, CollectedData, Collector, CollectorError, CollectorKind};
use crate::event::Clock;

/// Reports each local calendar day on which the tracker runs, once per day.
pub struct ParticipationCounter {
    interval: Duration,
    callback: Callback,
    clock: Arc<dyn Clock>,
    task: CaptureTask,
}

impl ParticipationCounter {
    pub fn new(interval: Duration, callback: Callback, clock: Arc<dyn Clock>) -> Self {
        Self {
            interval,
            callback,
            clock,
            task: CaptureTask::default(),
        }
    }
}

#[async_trait]
impl Collector for ParticipationCounter {
    fn kind(&self) -> CollectorKind {
        CollectorKind::ParticipationCounter
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn is_running(&self) -> bool {
        self.task.is_running()
    }

    async fn start(&mut self) -> Result<(), CollectorError> {
        let callback = Arc::clone(&self.callback);
        let clock = Arc::clone(&self.clock);
        let period = self.interval;
        self.task.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last_day: Option<NaiveDate> = None;
            loop {
                ticker.tick().await;
                let today = clock.now().with_timezone(&Local).date_naive();
                if last_day != Some(today) {
                    last_day = Some(today);
                    callback(CollectedData::ParticipationDay(today));
                }
            }
        });
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CollectorError> {
        self.task.stop(CollectorKind::ParticipationCounter).await
    }
}
