use crate::errors::SweepError;
use crate::locator::{Locator, LocatorConfig};
use crate::selection::SelectionSet;
use crate::surface::HostSurface;
use crate::sync::SurfaceSync;
use crate::workflow::{DeleteWorkflow, Stage, StageBudgets};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Error,
}

/// The confirmation/notification surface. Presentation is entirely up to the
/// implementor; the orchestrator only awaits acknowledgement.
#[async_trait]
pub trait PromptSurface: Send + Sync {
    async fn confirm(&self, title: &str, message: &str) -> bool;
    async fn notify(&self, title: &str, message: &str, severity: Severity);
}

/// Per-item result of one batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeletionOutcome {
    Deleted { verified: bool },
    Skipped { reason: String },
    Failed { stage: Stage, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub id: String,
    #[serde(flatten)]
    pub outcome: DeletionOutcome,
}

/// Aggregate outcome of one batch. `deleted + failed + skipped` always equals
/// the size of the selection snapshot the batch started from; `unverified`
/// counts the subset of `deleted` whose removal was not observed in time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub deleted: usize,
    pub unverified: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    fn push(&mut self, id: &str, outcome: DeletionOutcome) {
        match &outcome {
            DeletionOutcome::Deleted { verified } => {
                self.deleted += 1;
                if !verified {
                    self.unverified += 1;
                }
            }
            DeletionOutcome::Skipped { .. } => self.skipped += 1,
            DeletionOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(ItemOutcome {
            id: id.to_string(),
            outcome,
        });
    }

    pub fn total(&self) -> usize {
        self.deleted + self.failed + self.skipped
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Deleted {}, failed {}, skipped {}.",
            self.deleted, self.failed, self.skipped
        );
        if self.unverified > 0 {
            summary.push_str(&format!(" {} deletion(s) unverified.", self.unverified));
        }
        summary
    }
}

/// Releases the in-flight flag on every exit path.
struct Gate<'a> {
    flag: &'a AtomicBool,
}

impl<'a> Gate<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SweepError> {
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SweepError::BatchInFlight);
        }
        Ok(Self { flag })
    }
}

impl Drop for Gate<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Sequences per-item deletions over a selection snapshot.
///
/// At most one batch is in flight at a time; items are processed strictly
/// sequentially, bottom-to-top by current list position, with total isolation
/// between items — one item's failure never aborts the batch.
pub struct Orchestrator {
    surface: Arc<dyn HostSurface>,
    prompts: Arc<dyn PromptSurface>,
    selection: Arc<Mutex<SelectionSet>>,
    sync: Arc<SurfaceSync>,
    budgets: StageBudgets,
    locator: Locator,
    settle_delay: Duration,
    in_flight: AtomicBool,
    current_cancel: Mutex<CancellationToken>,
}

impl Orchestrator {
    pub fn new(
        surface: Arc<dyn HostSurface>,
        prompts: Arc<dyn PromptSurface>,
        selection: Arc<Mutex<SelectionSet>>,
        sync: Arc<SurfaceSync>,
        budgets: StageBudgets,
        locator_config: LocatorConfig,
    ) -> Self {
        let locator = Locator::new(surface.clone(), locator_config);
        Self {
            surface,
            prompts,
            selection,
            sync,
            budgets,
            locator,
            settle_delay: DEFAULT_SETTLE_DELAY,
            in_flight: AtomicBool::new(false),
            current_cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Override the settling delay observed between items.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Token governing the current (or next) batch. Cancelling it marks the
    /// in-flight item failed and skips the rest; the post-batch notify and
    /// affordance resync still run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.current_cancel.lock().unwrap().clone()
    }

    pub fn cancel_current(&self) {
        self.current_cancel.lock().unwrap().cancel();
    }

    /// Execute deletion for the current selection and report the aggregate
    /// outcome.
    ///
    /// Returns an all-zero report when the operator declines the pre-batch
    /// confirmation; the selection is left untouched in that case.
    #[instrument(level = "info", skip(self))]
    pub async fn delete_selected(&self) -> Result<BatchReport, SweepError> {
        let _gate = Gate::acquire(&self.in_flight)?;
        let cancel = {
            let mut slot = self.current_cancel.lock().unwrap();
            if slot.is_cancelled() {
                *slot = CancellationToken::new();
            }
            slot.clone()
        };

        self.surface
            .list_container()
            .map_err(|e| SweepError::SurfaceUnavailable(e.to_string()))?;
        let snapshot = {
            let selection = self.selection.lock().unwrap();
            selection.snapshot()
        };
        if snapshot.is_empty() {
            return Err(SweepError::NothingSelected);
        }

        let noun = if snapshot.len() == 1 { "item" } else { "items" };
        let message = format!(
            "Delete {} selected {noun}? This cannot be undone.",
            snapshot.len()
        );
        if !self.prompts.confirm("Delete items?", &message).await {
            info!("batch declined at the confirmation prompt");
            return Ok(BatchReport::default());
        }

        let mut report = BatchReport::default();
        let items = self.surface.query_items()?;
        let position: HashMap<&str, usize> = items
            .iter()
            .enumerate()
            .map(|(index, item)| (item.id.as_str(), index))
            .collect();

        let mut queue: Vec<(String, usize)> = Vec::with_capacity(snapshot.len());
        for id in &snapshot {
            match position.get(id.as_str()) {
                Some(&index) => queue.push((id.clone(), index)),
                None => {
                    debug!(item = %id, "selected id no longer resolves; skipping");
                    report.push(
                        id,
                        DeletionOutcome::Skipped {
                            reason: "no longer present in the list".into(),
                        },
                    );
                    self.unselect(id);
                }
            }
        }
        // Bottom-to-top: removing a higher row can shift everything below it,
        // removing the lowest pending row leaves the rest in place.
        queue.sort_by(|a, b| b.1.cmp(&a.1));
        info!(count = queue.len(), "starting deletion batch");

        let workflow = DeleteWorkflow::new(
            self.surface.clone(),
            self.locator.clone(),
            self.budgets.clone(),
            cancel.clone(),
        );
        let total = queue.len();
        for (processed, (id, index)) in queue.into_iter().enumerate() {
            if cancel.is_cancelled() {
                report.push(
                    &id,
                    DeletionOutcome::Skipped {
                        reason: "batch cancelled".into(),
                    },
                );
                self.unselect(&id);
                continue;
            }
            debug!(item = %id, index, "processing item");
            match workflow.run(&id).await {
                Ok(deletion) => {
                    report.push(
                        &id,
                        DeletionOutcome::Deleted {
                            verified: deletion.verified,
                        },
                    );
                }
                Err(failure) => {
                    warn!(
                        item = %id,
                        detail = %serde_json::to_string(&failure).unwrap_or_default(),
                        "item failed"
                    );
                    report.push(
                        &id,
                        DeletionOutcome::Failed {
                            stage: failure.stage,
                            reason: failure.reason,
                        },
                    );
                }
            }
            self.unselect(&id);
            if processed + 1 < total {
                sleep(self.settle_delay).await;
            }
        }

        let severity = if report.failed == 0 {
            Severity::Success
        } else {
            Severity::Error
        };
        self.prompts
            .notify("Deletion complete", &report.summary(), severity)
            .await;

        {
            self.selection.lock().unwrap().clear();
        }
        if let Err(e) = self.sync.reconcile() {
            warn!(error = %e, "post-batch affordance resync failed");
        }
        info!(
            deleted = report.deleted,
            failed = report.failed,
            skipped = report.skipped,
            unverified = report.unverified,
            "batch finished"
        );
        Ok(report)
    }

    fn unselect(&self, id: &str) {
        self.selection.lock().unwrap().remove(id);
    }
}
