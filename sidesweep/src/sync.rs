use crate::errors::SweepError;
use crate::selection::SelectionSet;
use crate::surface::{ChangeHandler, HostSurface, Subscription};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncReport {
    pub container_present: bool,
    /// Selected ids dropped because they no longer resolve.
    pub dropped: usize,
}

/// Keeps the selection consistent with the live list as the host mutates.
///
/// Thin by design: it owns the change subscription and a reconcile pass, and
/// nothing else. Selection-affordance rendering is the host integration's
/// concern and calls `reconcile` through the same path.
pub struct SurfaceSync {
    surface: Arc<dyn HostSurface>,
    selection: Arc<Mutex<SelectionSet>>,
    subscription: Mutex<Option<Subscription>>,
}

impl SurfaceSync {
    pub fn new(surface: Arc<dyn HostSurface>, selection: Arc<Mutex<SelectionSet>>) -> Self {
        Self {
            surface,
            selection,
            subscription: Mutex::new(None),
        }
    }

    /// Start watching host mutations; each notification runs a reconcile
    /// pass. Replaces any previous subscription.
    pub fn attach(self: &Arc<Self>) -> Result<(), SweepError> {
        let weak: Weak<SurfaceSync> = Arc::downgrade(self);
        let handler: ChangeHandler = Arc::new(move || {
            if let Some(sync) = weak.upgrade() {
                if let Err(e) = sync.reconcile() {
                    debug!(error = %e, "reconcile after host mutation failed");
                }
            }
        });
        let subscription = self.surface.subscribe(handler)?;
        *self.subscription.lock().unwrap() = Some(subscription);
        Ok(())
    }

    /// Stop watching host mutations.
    pub fn detach(&self) {
        self.subscription.lock().unwrap().take();
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.lock().unwrap().is_some()
    }

    /// Drop selected ids that no longer resolve against the live list.
    pub fn reconcile(&self) -> Result<SyncReport, SweepError> {
        match self.surface.query_items() {
            Ok(items) => {
                let dropped = {
                    let mut selection = self.selection.lock().unwrap();
                    selection.retain_known(items.iter().map(|item| item.id.as_str()))
                };
                if dropped > 0 {
                    debug!(dropped, "dropped stale ids from the selection");
                }
                Ok(SyncReport {
                    container_present: true,
                    dropped,
                })
            }
            Err(_) => Ok(SyncReport {
                container_present: false,
                dropped: 0,
            }),
        }
    }
}

impl std::fmt::Debug for SurfaceSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceSync")
            .field("attached", &self.is_attached())
            .finish()
    }
}
