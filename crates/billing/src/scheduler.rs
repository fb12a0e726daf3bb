//! Background billing runs
//!
//! Two independent tasks: the monthly charge run, anchored on the first day of
//! the current month, and the retry run, which starts immediately. They share
//! nothing but the orchestrator, so a slow run of one never delays the other.
//! Missed ticks are skipped, not replayed.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ScheduleConfig;
use crate::error::{BillingError, BillingResult};
use crate::orchestrator::{BatchReport, BillingOrchestrator};
use crate::proration::start_of_month;

/// Delay until `first_fire`, or zero when that instant has already passed
pub fn first_run_delay(first_fire: OffsetDateTime, now: OffsetDateTime) -> Duration {
    Duration::try_from(first_fire - now).unwrap_or(Duration::ZERO)
}

#[derive(Clone)]
pub struct BillingScheduler {
    orchestrator: Arc<BillingOrchestrator>,
    schedule: ScheduleConfig,
}

impl BillingScheduler {
    pub fn new(orchestrator: Arc<BillingOrchestrator>, schedule: ScheduleConfig) -> Self {
        Self {
            orchestrator,
            schedule,
        }
    }

    /// Spawn both runs on the current tokio runtime. Zero periods are rejected.
    pub fn start(&self) -> BillingResult<SchedulerHandle> {
        if self.schedule.monthly_period.is_zero() || self.schedule.retry_period.is_zero() {
            return Err(BillingError::Config(
                "Scheduler periods must be greater than zero".to_string(),
            ));
        }

        let now = OffsetDateTime::now_utc();
        let monthly_delay = first_run_delay(start_of_month(now)?, now);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let monthly = {
            let scheduler = self.clone();
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                let period = scheduler.schedule.monthly_period;
                scheduler
                    .run_every(RunKind::Monthly, monthly_delay, period, shutdown)
                    .await;
            })
        };

        let retry = {
            let scheduler = self.clone();
            tokio::spawn(async move {
                let period = scheduler.schedule.retry_period;
                scheduler
                    .run_every(RunKind::Retry, Duration::ZERO, period, shutdown_rx)
                    .await;
            })
        };

        tracing::info!(
            monthly_first_run_in_ms = monthly_delay.as_millis() as u64,
            monthly_period_ms = self.schedule.monthly_period.as_millis() as u64,
            retry_period_ms = self.schedule.retry_period.as_millis() as u64,
            "Billing scheduler started"
        );

        Ok(SchedulerHandle {
            shutdown: shutdown_tx,
            tasks: vec![monthly, retry],
        })
    }

    /// One monthly charge run
    pub async fn run_monthly_charge(&self) -> BillingResult<BatchReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("billing_run", kind = "monthly", run_id = %run_id);
        async {
            tracing::info!("Monthly charge run starting");
            self.orchestrator.charge_all_active_invoices().await
        }
        .instrument(span)
        .await
    }

    /// One retry run
    pub async fn run_retry(&self) -> BillingResult<BatchReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("billing_run", kind = "retry", run_id = %run_id);
        async {
            tracing::info!("Retry run starting");
            self.orchestrator.retry_failed_invoices().await
        }
        .instrument(span)
        .await
    }

    async fn run_every(
        &self,
        kind: RunKind,
        first_delay: Duration,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval_at(Instant::now() + first_delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let result = match kind {
                        RunKind::Monthly => self.run_monthly_charge().await,
                        RunKind::Retry => self.run_retry().await,
                    };
                    if let Err(e) = result {
                        tracing::error!(run = ?kind, error = %e, "Billing run failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RunKind {
    Monthly,
    Retry,
}

/// Running scheduler. Dropping the handle also ends both tasks, without waiting.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal both tasks and wait for them. An in-flight run is allowed to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Billing scheduler task ended abnormally");
            }
        }
        tracing::info!("Billing scheduler stopped");
    }
}
