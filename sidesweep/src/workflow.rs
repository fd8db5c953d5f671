use crate::element::{horizontal_gap, vertical_overlap, UiElement};
use crate::errors::SweepError;
use crate::locator::{row_container, Intent, Locator, LocatorReport};
use crate::selector::Selector;
use crate::surface::HostSurface;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// One step of the single-item deletion workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Reveal,
    OpenMenu,
    FindDeleteAction,
    ConfirmDialog,
    VerifyRemoved,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Reveal => "reveal",
            Stage::OpenMenu => "open_menu",
            Stage::FindDeleteAction => "find_delete_action",
            Stage::ConfirmDialog => "confirm_dialog",
            Stage::VerifyRemoved => "verify_removed",
        };
        write!(f, "{name}")
    }
}

/// What to do when the removal of a row cannot be observed in time. The
/// destructive action has already been triggered by then, so the optimistic
/// reading records an unverified success instead of risking a second attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyPolicy {
    Optimistic,
    Pessimistic,
}

/// Per-stage timeout budgets and attempt ceilings.
///
/// Every budget is independent; no stage shares a timer with another item or
/// stage, and every internal loop carries a fixed attempt ceiling so the
/// workflow always terminates.
#[derive(Debug, Clone)]
pub struct StageBudgets {
    pub reveal: Duration,
    pub open_menu: Duration,
    pub find_action: Duration,
    pub confirm: Duration,
    pub verify: Duration,
    /// How long to watch for an open signal after each interaction attempt.
    pub open_signal_window: Duration,
    /// Budget for re-discovery after the one-shot context-menu fallback.
    pub context_menu_retry: Duration,
    /// Ceiling on trigger discovery/interaction rounds.
    pub trigger_attempts: u32,
    /// How many ancestors receive hover entry signals during reveal.
    pub hover_ancestor_depth: usize,
    pub hover_step_delay: Duration,
    pub reveal_settle: Duration,
    pub pre_activate_delay: Duration,
    pub verify_policy: VerifyPolicy,
}

impl Default for StageBudgets {
    fn default() -> Self {
        Self {
            reveal: Duration::from_secs(2),
            open_menu: Duration::from_secs(6),
            find_action: Duration::from_secs(6),
            confirm: Duration::from_secs(4),
            verify: Duration::from_secs(4),
            open_signal_window: Duration::from_millis(300),
            context_menu_retry: Duration::from_millis(1500),
            trigger_attempts: 10,
            hover_ancestor_depth: 4,
            hover_step_delay: Duration::from_millis(50),
            reveal_settle: Duration::from_millis(300),
            pre_activate_delay: Duration::from_millis(100),
            verify_policy: VerifyPolicy::Optimistic,
        }
    }
}

/// Terminal failure of one workflow stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<LocatorReport>,
}

impl StageFailure {
    pub fn new(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(
        stage: Stage,
        reason: impl Into<String>,
        diagnostics: LocatorReport,
    ) -> Self {
        Self {
            stage,
            reason: reason.into(),
            diagnostics: Some(diagnostics),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} failed: {}", self.stage, self.reason)
    }
}

impl std::error::Error for StageFailure {}

/// Successful workflow outcome. `verified: false` records that removal could
/// not be observed before the verify budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Deletion {
    pub verified: bool,
}

/// Tagged outcome of one discovery step, used to drive stage transitions.
#[derive(Debug)]
enum StageResult {
    Found(UiElement),
    NotFound,
    TimedOut,
}

/// Interaction primitives tried, in order, to open a row's action menu.
/// Escalation stops at the first open signal; exhausting the list is a stage
/// failure, never a reach into host-framework internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum OpenStrategy {
    Activate,
    PointerSequence,
    KeySpace,
    KeyEnter,
}

const OPEN_STRATEGIES: [OpenStrategy; 4] = [
    OpenStrategy::Activate,
    OpenStrategy::PointerSequence,
    OpenStrategy::KeySpace,
    OpenStrategy::KeyEnter,
];

fn menu_role_criteria() -> Selector {
    Selector::Any(vec![
        Selector::Role {
            role: "menu".into(),
            name: None,
        },
        Selector::Role {
            role: "listbox".into(),
            name: None,
        },
    ])
}

/// Drives one item through reveal, menu open, action selection, confirmation
/// and removal verification. One instance handles one item at a time; the
/// first unrecoverable failure is terminal for that item.
pub struct DeleteWorkflow {
    surface: Arc<dyn HostSurface>,
    locator: Locator,
    budgets: StageBudgets,
    cancel: CancellationToken,
}

impl DeleteWorkflow {
    pub fn new(
        surface: Arc<dyn HostSurface>,
        locator: Locator,
        budgets: StageBudgets,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            surface,
            locator,
            budgets,
            cancel,
        }
    }

    #[instrument(level = "info", skip(self))]
    pub async fn run(&self, id: &str) -> Result<Deletion, StageFailure> {
        let row = self.reveal(id).await?;
        self.open_menu(&row).await?;
        let action = self.find_delete_action(&row).await?;
        self.confirm_dialog(&action).await?;
        self.verify_removed(id, &row).await
    }

    async fn resolve(
        &self,
        intent: &Intent,
        context: Option<&UiElement>,
        budget: Duration,
    ) -> (StageResult, LocatorReport) {
        let (result, report) = self
            .locator
            .wait_for_with_report(intent, context, budget)
            .await;
        let result = match result {
            Ok(element) => StageResult::Found(element),
            Err(SweepError::Timeout(_)) => StageResult::TimedOut,
            Err(e) => {
                debug!(error = %e, "discovery errored");
                StageResult::NotFound
            }
        };
        (result, report)
    }

    /// `Idle -> Revealed`: re-resolve the row by id from the live list, bring
    /// it on screen and fan hover/focus entry signals across the row and its
    /// ancestors so affordances hidden until hover get a chance to appear.
    async fn reveal(&self, id: &str) -> Result<UiElement, StageFailure> {
        self.check_cancelled(Stage::Reveal)?;
        let intent = Intent::ItemRow { id: id.to_string() };
        let (result, _) = self.resolve(&intent, None, self.budgets.reveal).await;
        let row = match result {
            StageResult::Found(row) => row,
            StageResult::NotFound | StageResult::TimedOut => {
                return Err(StageFailure::new(Stage::Reveal, "item not found"))
            }
        };

        row.scroll_into_view()
            .map_err(|e| StageFailure::new(Stage::Reveal, e.to_string()))?;
        row.hover()
            .map_err(|e| StageFailure::new(Stage::Reveal, e.to_string()))?;
        let _ = row.focus();

        let mut ancestor = row.parent().ok().flatten();
        for _ in 0..self.budgets.hover_ancestor_depth {
            match ancestor {
                Some(node) => {
                    let _ = node.hover();
                    ancestor = node.parent().ok().flatten();
                    sleep(self.budgets.hover_step_delay).await;
                }
                None => break,
            }
        }
        sleep(self.budgets.reveal_settle).await;
        Ok(row)
    }

    /// `Revealed -> MenuOpen`: locate the row's trigger, check it actually
    /// belongs to this row, then escalate through the interaction strategies
    /// until an open signal appears.
    async fn open_menu(&self, row: &UiElement) -> Result<(), StageFailure> {
        let deadline = Instant::now() + self.budgets.open_menu;
        let poll = self.locator.config().poll_interval;

        for attempt in 0..self.budgets.trigger_attempts {
            self.check_cancelled(Stage::OpenMenu)?;
            let trigger = self
                .locator
                .find_once(&Intent::MenuTrigger, Some(row))
                .map_err(|e| StageFailure::new(Stage::OpenMenu, e.to_string()))?;

            if let Some(trigger) = trigger {
                if self.associated(row, &trigger).unwrap_or(false) {
                    let _ = trigger.scroll_into_view();
                    for strategy in OPEN_STRATEGIES {
                        self.check_cancelled(Stage::OpenMenu)?;
                        // Keep the row hovered so hover-gated affordances stay up
                        // while we poke at the trigger.
                        let _ = row.hover();
                        if let Err(e) = self.apply_open_strategy(&trigger, strategy) {
                            debug!(?strategy, error = %e, "interaction attempt errored");
                            continue;
                        }
                        if self
                            .await_open_signal(&trigger)
                            .await
                            .map_err(|e| StageFailure::new(Stage::OpenMenu, e.to_string()))?
                        {
                            info!(attempt, ?strategy, "menu opened");
                            return Ok(());
                        }
                        if Instant::now() >= deadline {
                            break;
                        }
                    }
                } else {
                    debug!("trigger candidate rejected: not associated with this row");
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(poll).await;
        }
        Err(StageFailure::new(
            Stage::OpenMenu,
            "no menu-open signal within budget",
        ))
    }

    fn apply_open_strategy(
        &self,
        trigger: &UiElement,
        strategy: OpenStrategy,
    ) -> Result<(), SweepError> {
        match strategy {
            OpenStrategy::Activate => trigger.activate(),
            OpenStrategy::PointerSequence => trigger.pointer_sequence(),
            OpenStrategy::KeySpace => {
                trigger.focus()?;
                trigger.press_key(" ")
            }
            OpenStrategy::KeyEnter => {
                trigger.focus()?;
                trigger.press_key("Enter")
            }
        }
    }

    /// Watch for an open signal within the per-attempt window: a state flip on
    /// the trigger itself, or a menu surface becoming visible anywhere.
    async fn await_open_signal(&self, trigger: &UiElement) -> Result<bool, SweepError> {
        let poll = self.locator.config().poll_interval;
        let window = Instant::now() + self.budgets.open_signal_window;
        let ceiling = (self.budgets.open_signal_window.as_millis() / poll.as_millis().max(1))
            .max(1) as u32
            + 1;
        for _ in 0..ceiling {
            if self.menu_open_signal(trigger)? {
                return Ok(true);
            }
            if Instant::now() >= window {
                break;
            }
            sleep(poll).await;
        }
        Ok(self.menu_open_signal(trigger)?)
    }

    fn menu_open_signal(&self, trigger: &UiElement) -> Result<bool, SweepError> {
        if trigger.attribute("aria-expanded").as_deref() == Some("true")
            || trigger.attribute("data-state").as_deref() == Some("open")
        {
            return Ok(true);
        }
        let surfaces = self.surface.find_elements(&menu_role_criteria(), None)?;
        Ok(surfaces.iter().any(|s| s.is_visible().unwrap_or(false)))
    }

    /// The trigger must be geometrically or structurally tied to *this* row;
    /// a hit from a broad strategy may belong to a neighbour.
    fn associated(&self, row: &UiElement, trigger: &UiElement) -> Result<bool, SweepError> {
        if row.contains(trigger) {
            return Ok(true);
        }
        let row_scope = row_container(row)?;
        let trigger_scope = row_container(trigger)?;
        if let (Some(a), Some(b)) = (&row_scope, &trigger_scope) {
            if a == b {
                return Ok(true);
            }
        }
        if let Some(scope) = &row_scope {
            if scope.contains(trigger) {
                return Ok(true);
            }
        }
        if let (Ok(rb), Ok(tb)) = (row.bounds(), trigger.bounds()) {
            return Ok(vertical_overlap(&rb, &tb)
                && horizontal_gap(&rb, &tb) < self.locator.config().max_horizontal_gap);
        }
        Ok(false)
    }

    /// `MenuOpen -> ActionSelected`: poll for a delete-labeled action; if the
    /// open menu never yields one, fall back once to a context-menu signal on
    /// the row and retry discovery.
    async fn find_delete_action(&self, row: &UiElement) -> Result<UiElement, StageFailure> {
        self.check_cancelled(Stage::FindDeleteAction)?;
        let (result, report) = self
            .resolve(&Intent::DeleteAction, Some(row), self.budgets.find_action)
            .await;
        match result {
            StageResult::Found(action) => return Ok(action),
            StageResult::NotFound => {
                return Err(StageFailure::with_diagnostics(
                    Stage::FindDeleteAction,
                    "discovery errored before any strategy matched",
                    report,
                ))
            }
            StageResult::TimedOut => {}
        }

        debug!("no delete action appeared; dispatching a context-menu signal on the row");
        row.context_menu()
            .map_err(|e| StageFailure::with_diagnostics(
                Stage::FindDeleteAction,
                e.to_string(),
                report.clone(),
            ))?;
        let (retry, retry_report) = self
            .resolve(
                &Intent::DeleteAction,
                Some(row),
                self.budgets.context_menu_retry,
            )
            .await;
        match retry {
            StageResult::Found(action) => Ok(action),
            StageResult::NotFound | StageResult::TimedOut => Err(StageFailure::with_diagnostics(
                Stage::FindDeleteAction,
                "no delete-labeled action appeared",
                retry_report,
            )),
        }
    }

    /// `ActionSelected -> Confirmed`: activate the delete action, wait for the
    /// confirmation surface and activate its affirmative control.
    async fn confirm_dialog(&self, action: &UiElement) -> Result<(), StageFailure> {
        self.check_cancelled(Stage::ConfirmDialog)?;
        let _ = action.scroll_into_view();
        sleep(self.budgets.pre_activate_delay).await;
        action
            .activate()
            .map_err(|e| StageFailure::new(Stage::ConfirmDialog, e.to_string()))?;

        let (result, report) = self
            .resolve(&Intent::ConfirmControl, None, self.budgets.confirm)
            .await;
        let control = match result {
            StageResult::Found(control) => control,
            StageResult::NotFound | StageResult::TimedOut => {
                return Err(StageFailure::with_diagnostics(
                    Stage::ConfirmDialog,
                    "no confirmation surface appeared within budget",
                    report,
                ))
            }
        };
        let _ = control.scroll_into_view();
        sleep(self.budgets.pre_activate_delay).await;
        control
            .activate()
            .map_err(|e| StageFailure::new(Stage::ConfirmDialog, e.to_string()))
    }

    /// `Confirmed -> Verified`: wait for the row handle to detach or the id to
    /// stop resolving, whichever comes first.
    async fn verify_removed(&self, id: &str, row: &UiElement) -> Result<Deletion, StageFailure> {
        let poll = self.locator.config().poll_interval;
        let deadline = Instant::now() + self.budgets.verify;
        let ceiling =
            (self.budgets.verify.as_millis() / poll.as_millis().max(1)).max(1) as u32 + 1;

        for _ in 0..ceiling {
            if !row.is_attached() {
                debug!(item = id, "row handle detached");
                return Ok(Deletion { verified: true });
            }
            if let Ok(items) = self.surface.query_items() {
                if !items.iter().any(|item| item.id == id) {
                    debug!(item = id, "id no longer resolves");
                    return Ok(Deletion { verified: true });
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(poll).await;
        }

        match self.budgets.verify_policy {
            VerifyPolicy::Optimistic => {
                warn!(
                    item = id,
                    "removal not observed within budget; recording an unverified success"
                );
                Ok(Deletion { verified: false })
            }
            VerifyPolicy::Pessimistic => Err(StageFailure::new(
                Stage::VerifyRemoved,
                "item still present after confirmation",
            )),
        }
    }

    fn check_cancelled(&self, stage: Stage) -> Result<(), StageFailure> {
        if self.cancel.is_cancelled() {
            Err(StageFailure::new(stage, "cancelled"))
        } else {
            Ok(())
        }
    }
}
