//! Pipeline Orchestrator
//!
//! Drives the unbounded Collect -> Extract cycle with the configured pacing
//! between stages and between cycles. Each stage runs inside its own task so
//! a stage panic is contained to the cycle; a failed cycle takes the shorter
//! recovery pause and the loop resumes at collection. There is no terminal
//! state short of process shutdown.

use crate::collector::{CollectorReport, FeedCollector};
use crate::config::PacingConfig;
use crate::extraction::{ExtractionReport, ExtractionStage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage {stage} failed: {reason}")]
    StageFailed { stage: &'static str, reason: String },
}

/// Outcome of one full cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub collection: CollectorReport,
    pub extraction: ExtractionReport,
}

pub struct Orchestrator {
    collector: Arc<FeedCollector>,
    extraction: Arc<ExtractionStage>,
    pacing: PacingConfig,
    cycles_total: AtomicU64,
    cycles_failed: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        collector: Arc<FeedCollector>,
        extraction: Arc<ExtractionStage>,
        pacing: PacingConfig,
    ) -> Self {
        Self {
            collector,
            extraction,
            pacing,
            cycles_total: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
        }
    }

    /// One cycle: collect, pause, extract. Callable directly so tests drive
    /// the pipeline with `PacingConfig::immediate()` and no wall-clock
    /// delays.
    pub async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);

        let collector = self.collector.clone();
        let collection = tokio::spawn(async move { collector.sweep().await })
            .await
            .map_err(|e| PipelineError::StageFailed {
                stage: "collect",
                reason: e.to_string(),
            })?;

        tokio::time::sleep(self.pacing.collect_to_extract()).await;

        let extraction_stage = self.extraction.clone();
        let extraction = tokio::spawn(async move { extraction_stage.run_batch().await })
            .await
            .map_err(|e| PipelineError::StageFailed {
                stage: "extract",
                reason: e.to_string(),
            })?;

        Ok(CycleReport {
            collection,
            extraction,
        })
    }

    /// The forever loop. Stops only when the host process stops.
    pub async fn run(&self) {
        info!("pipeline orchestrator started");
        loop {
            match self.run_cycle().await {
                Ok(report) => {
                    info!(
                        new_articles = report.collection.articles_new,
                        attacks = report.extraction.attacks_extracted,
                        "cycle complete"
                    );
                    tokio::time::sleep(self.pacing.cycle()).await;
                }
                Err(e) => {
                    self.cycles_failed.fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "cycle failed, taking recovery pause");
                    tokio::time::sleep(self.pacing.recovery()).await;
                }
            }
        }
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorStats {
    pub cycles_total: u64,
    pub cycles_failed: u64,
}
