//! Collection cycle: fetch → dedup → ordered publish → checkpoint
//!
//! The watermark only moves after every trade of a batch is acknowledged by
//! the broker. A failed publish leaves it where it was, so the next cycle
//! fetches the same trades again: duplicates are possible, losses are not.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::CycleError;
use crate::fetcher::TradeSource;
use crate::metrics::CollectorMetrics;
use crate::publisher::TradePublisher;
use crate::watermark::{Watermark, WatermarkStore};

/// What the poller is collecting and how often
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub engine: String,
    pub market: String,
    pub poll_interval: Duration,
}

/// Where the collector is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Publishing,
    Checkpointing,
}

/// Result of a cycle that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Nothing newer than the watermark
    NoNewTrades,
    /// Every trade acknowledged and the watermark advanced
    Published {
        count: usize,
        watermark: Watermark,
        /// False when the watermark could not be persisted; a restart before
        /// the next successful checkpoint re-publishes this batch
        checkpointed: bool,
    },
}

pub struct Collector<S> {
    settings: CollectorSettings,
    source: S,
    publisher: TradePublisher,
    store: Arc<dyn WatermarkStore>,
    watermark: Watermark,
    phase: CyclePhase,
    metrics: CollectorMetrics,
}

impl<S: TradeSource> Collector<S> {
    /// Build a collector, resuming from the persisted watermark. A load
    /// failure is logged and collection starts from the empty watermark.
    pub async fn new(
        settings: CollectorSettings,
        source: S,
        publisher: TradePublisher,
        store: Arc<dyn WatermarkStore>,
    ) -> Self {
        let watermark = match store.load().await {
            Ok(watermark) => watermark,
            Err(e) => {
                warn!(error = %e, "could not load watermark, starting from scratch");
                Watermark::empty()
            }
        };

        info!(
            engine = %settings.engine,
            market = %settings.market,
            watermark = %watermark,
            "collector initialised"
        );

        Self {
            settings,
            source,
            publisher,
            store,
            watermark,
            phase: CyclePhase::Idle,
            metrics: CollectorMetrics::new(),
        }
    }

    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    fn enter(&mut self, phase: CyclePhase) {
        debug!(from = ?self.phase, to = ?phase, "cycle phase");
        self.phase = phase;
    }

    /// Run one cycle. The phase is back to `Idle` on return, whatever the
    /// outcome.
    pub async fn run_cycle(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, CycleError> {
        let result = self.cycle(cancel).await;
        self.enter(CyclePhase::Idle);
        result
    }

    async fn cycle(&mut self, cancel: &CancellationToken) -> Result<CycleOutcome, CycleError> {
        self.enter(CyclePhase::Fetching);
        let fetched = self
            .source
            .fetch(
                &self.settings.engine,
                &self.settings.market,
                &self.watermark,
                cancel,
            )
            .await?;

        if fetched.skipped > 0 {
            self.metrics.add_skipped_rows(fetched.skipped);
        }

        if fetched.trades.is_empty() {
            debug!(watermark = %self.watermark, stale = fetched.stale, "no new trades");
            return Ok(CycleOutcome::NoNewTrades);
        }

        let total = fetched.trades.len();
        info!(
            count = total,
            skipped = fetched.skipped,
            stale = fetched.stale,
            "fetched new trades"
        );

        // One ack at a time, in trade id order. The batch always runs to the
        // end or to the first failure; shutdown does not interrupt it.
        self.enter(CyclePhase::Publishing);
        for (published, trade) in fetched.trades.iter().enumerate() {
            if let Err(source) = self.publisher.publish(trade).await {
                self.metrics.inc_publish_failures();
                self.metrics.add_published(published);
                return Err(CycleError::Publish {
                    trade_id: trade.trade_id.clone(),
                    published,
                    total,
                    source,
                });
            }
        }
        self.metrics.add_published(total);

        self.enter(CyclePhase::Checkpointing);
        self.watermark = fetched.watermark;
        let checkpointed = match self.store.save(&self.watermark).await {
            Ok(()) => true,
            Err(e) => {
                self.metrics.inc_checkpoint_failures();
                error!(
                    error = %e,
                    watermark = %self.watermark,
                    "failed to persist watermark; trades are on the broker but will be re-published after a restart"
                );
                false
            }
        };

        info!(count = total, watermark = %self.watermark, "batch published");
        Ok(CycleOutcome::Published {
            count: total,
            watermark: self.watermark.clone(),
            checkpointed,
        })
    }

    /// Poll until `cancel` fires. Cycles never overlap: a tick that arrives
    /// while a cycle is still running is skipped, not queued. The first cycle
    /// runs immediately.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(poll_interval = ?self.settings.poll_interval, "collector started");

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_cycle(&cancel).await {
                Ok(CycleOutcome::NoNewTrades) => {
                    self.metrics.record_cycle("idle");
                    self.metrics.record_success();
                }
                Ok(CycleOutcome::Published { .. }) => {
                    self.metrics.record_cycle("published");
                    self.metrics.record_success();
                }
                Err(e) => {
                    self.metrics.record_cycle(e.kind());
                    if e.kind() == "cancelled" {
                        debug!(error = %e, "cycle cancelled");
                    } else {
                        warn!(error = %e, watermark = %self.watermark, "collection cycle failed, retrying next tick");
                    }
                }
            }
        }

        info!(watermark = %self.watermark, "collector stopped");
    }
}
