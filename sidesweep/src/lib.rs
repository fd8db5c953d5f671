//! Bulk deletion automation for third-party list UIs
//!
//! This crate drives a multi-step destructive workflow — reveal a row, open
//! its action menu, pick the delete action, confirm the dialog, verify the
//! row is gone — against a host page whose structure, class names and timing
//! are not under our control and may change at any moment. It is inspired by
//! Playwright's locator model: heuristic discovery with bounded waits on top
//! of a pluggable host-surface adapter.

use std::sync::{Arc, Mutex};

pub mod element;
pub mod errors;
pub mod locator;
pub mod orchestrator;
pub mod selection;
pub mod selector;
pub mod surface;
pub mod sync;
pub mod workflow;

#[cfg(test)]
mod tests;

pub use element::{UiElement, UiElementAttributes, UiElementImpl};
pub use errors::SweepError;
pub use locator::{Intent, Locator, LocatorConfig, LocatorReport};
pub use orchestrator::{
    BatchReport, DeletionOutcome, ItemOutcome, Orchestrator, PromptSurface, Severity,
};
pub use selection::SelectionSet;
pub use selector::{Selector, TextMatch};
pub use surface::{ChangeHandler, HostSurface, ListItem, Subscription};
pub use sync::{SurfaceSync, SyncReport};
pub use workflow::{
    DeleteWorkflow, Deletion, Stage, StageBudgets, StageFailure, VerifyPolicy,
};

/// The main entry point for bulk-deletion automation.
///
/// Owns every piece of mutable automation state — the selection set, the
/// in-flight batch gate and the host-change subscription — so integrations
/// create one `Sweeper` on initialization and drop it (after `teardown`) when
/// the host page navigates away. Nothing here is ambient or persisted.
pub struct Sweeper {
    surface: Arc<dyn HostSurface>,
    selection: Arc<Mutex<SelectionSet>>,
    sync: Arc<SurfaceSync>,
    orchestrator: Orchestrator,
    locator_config: LocatorConfig,
}

impl Sweeper {
    pub fn new(surface: Arc<dyn HostSurface>, prompts: Arc<dyn PromptSurface>) -> Self {
        Self::with_config(
            surface,
            prompts,
            StageBudgets::default(),
            LocatorConfig::default(),
        )
    }

    pub fn with_config(
        surface: Arc<dyn HostSurface>,
        prompts: Arc<dyn PromptSurface>,
        budgets: StageBudgets,
        locator_config: LocatorConfig,
    ) -> Self {
        let selection = Arc::new(Mutex::new(SelectionSet::new()));
        let sync = Arc::new(SurfaceSync::new(surface.clone(), selection.clone()));
        let orchestrator = Orchestrator::new(
            surface.clone(),
            prompts,
            selection.clone(),
            sync.clone(),
            budgets,
            locator_config.clone(),
        );
        Self {
            surface,
            selection,
            sync,
            orchestrator,
            locator_config,
        }
    }

    /// Start watching host mutations so the selection tracks the live list.
    pub fn attach(&self) -> Result<(), SweepError> {
        self.sync.attach()
    }

    /// Shared handle to the selection; selection affordances toggle through
    /// this.
    pub fn selection(&self) -> Arc<Mutex<SelectionSet>> {
        self.selection.clone()
    }

    pub fn locator(&self) -> Locator {
        Locator::new(self.surface.clone(), self.locator_config.clone())
    }

    pub fn surface_sync(&self) -> Arc<SurfaceSync> {
        self.sync.clone()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Delete everything currently selected. See
    /// [`Orchestrator::delete_selected`].
    pub async fn delete_selected(&self) -> Result<BatchReport, SweepError> {
        self.orchestrator.delete_selected().await
    }

    /// Cancel the batch currently in flight, if any.
    pub fn cancel_batch(&self) {
        self.orchestrator.cancel_current();
    }

    pub fn is_deleting(&self) -> bool {
        self.orchestrator.is_running()
    }

    /// Release the change subscription and clear the selection. Call before
    /// dropping the sweeper on host-page teardown.
    pub fn teardown(&self) {
        self.sync.detach();
        self.selection.lock().unwrap().clear();
    }
}
