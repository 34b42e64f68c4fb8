//! Background service: fetch unlabeled mail, run a batch, sleep, repeat.
//!
//! Each cycle:
//! 1. `MailboxSource::fetch_unlabeled()` for the lookback window
//! 2. `BatchRunner::run()` over the candidates
//! 3. log the cycle summary and sleep `check_interval`
//!
//! Shutdown is observed before each cycle, between messages (via the
//! runner) and while sleeping.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::MailboxError;
use crate::pipeline::runner::BatchRunner;
use crate::pipeline::types::{Category, MailboxSource, Outcome, RunSummary};

/// One-way stop flag that async code can also wait on.
#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `trigger` has been called (immediately if it already was).
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Totals across all cycles of a service run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub cycles: u64,
    pub processed: u64,
    pub labeled: u64,
    pub fetch_failures: u64,
}

pub struct BatchService {
    source: Arc<dyn MailboxSource>,
    runner: BatchRunner,
    config: ServiceConfig,
}

impl BatchService {
    pub fn new(source: Arc<dyn MailboxSource>, runner: BatchRunner, config: ServiceConfig) -> Self {
        Self {
            source,
            runner,
            config,
        }
    }

    /// Fetch candidates and run one batch over them.
    pub async fn run_cycle(&self) -> Result<Vec<Outcome>, MailboxError> {
        let messages = self
            .source
            .fetch_unlabeled(self.config.lookback_days, self.config.max_messages)
            .await?;

        if messages.is_empty() {
            info!("No unlabeled emails found");
            return Ok(Vec::new());
        }

        info!(count = messages.len(), "Found emails to process");
        Ok(self.runner.run(messages).await)
    }

    /// Run cycles until `shutdown` fires (or once, if configured).
    pub async fn run(&self, shutdown: &ShutdownSignal) -> ServiceStats {
        let mut stats = ServiceStats::default();

        loop {
            if shutdown.is_triggered() {
                break;
            }

            let started = Instant::now();
            let cycle_id = Uuid::new_v4();
            info!(
                cycle = %cycle_id,
                lookback_days = self.config.lookback_days,
                max_messages = self.config.max_messages,
                "Starting check"
            );

            stats.cycles += 1;
            match self.run_cycle().await {
                Ok(outcomes) => {
                    let summary = RunSummary::from_outcomes(&outcomes);
                    stats.processed += summary.total as u64;
                    stats.labeled += summary.labeled as u64;
                    info!(
                        cycle = %cycle_id,
                        labeled = summary.labeled,
                        application_submitted = summary.count(Category::ApplicationSubmitted),
                        followup_required = summary.count(Category::FollowupRequired),
                        other = summary.count(Category::Other),
                        "Processed {} emails in {:.1}s (total: {})",
                        summary.labeled,
                        started.elapsed().as_secs_f64(),
                        stats.labeled
                    );
                }
                Err(e) => {
                    stats.fetch_failures += 1;
                    error!(cycle = %cycle_id, error = %e, "Failed to fetch unlabeled emails");
                }
            }

            let usage = self.runner.classifier().usage();
            info!(
                model = self.runner.classifier().model_name(),
                calls = usage.calls,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Token usage so far"
            );

            if self.config.run_once {
                break;
            }

            info!(
                minutes = self.config.check_interval.as_secs() / 60,
                "Sleeping until next check"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.config.check_interval) => {}
                _ = shutdown.wait() => break,
            }
        }

        info!(
            cycles = stats.cycles,
            labeled = stats.labeled,
            "Service stopped"
        );
        stats
    }
}

/// Spawn the service loop on the runtime.
///
/// Trigger `shutdown` and await the handle to stop cleanly.
pub fn spawn_service(
    service: BatchService,
    shutdown: Arc<ShutdownSignal>,
) -> JoinHandle<ServiceStats> {
    tokio::spawn(async move { service.run(&shutdown).await })
}
