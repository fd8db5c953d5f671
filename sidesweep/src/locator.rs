use crate::element::{horizontal_gap, vertical_overlap, UiElement};
use crate::errors::SweepError;
use crate::selector::{Selector, TextMatch};
use crate::surface::HostSurface;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Exact labels accepted for the destructive action, checked before falling
/// back to substring containment.
const DELETE_LABELS: [&str; 4] = ["delete", "delete chat", "delete conversation", "🗑️"];
const TRASH_GLYPH: &str = "🗑";

/// What the caller is looking for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// The sidebar/list container.
    ListContainer,
    /// One item's row, addressed by its stable id.
    ItemRow { id: String },
    /// The control that opens a row's action menu. Requires a row context.
    MenuTrigger,
    /// The delete action inside an open menu.
    DeleteAction,
    /// The affirmative control inside an open confirmation dialog.
    ConfirmControl,
}

/// Tuning for the discovery heuristics.
#[derive(Debug, Clone)]
pub struct LocatorConfig {
    pub poll_interval: Duration,
    /// How many ancestor levels the structural-proximity strategy climbs.
    pub proximity_depth: usize,
    /// Maximum horizontal gap for the global geometric fallback.
    pub max_horizontal_gap: f64,
    /// Class-name marker identifying the automation's own injected controls,
    /// which are always excluded from matching.
    pub own_ui_marker: String,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            proximity_depth: 4,
            max_horizontal_gap: 150.0,
            own_ui_marker: "sidesweep-".to_string(),
        }
    }
}

/// Which strategies a search ran and what each saw. Serialized into the
/// operator-facing log when a search exhausts its budget.
#[derive(Debug, Clone, Serialize)]
pub struct LocatorReport {
    pub intent: String,
    pub attempts: u32,
    pub strategies: Vec<StrategyTrace>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyTrace {
    pub strategy: &'static str,
    pub candidates: usize,
    pub matched: bool,
}

impl LocatorReport {
    fn new(intent: &Intent) -> Self {
        Self {
            intent: format!("{intent:?}"),
            attempts: 0,
            strategies: Vec::new(),
        }
    }

    fn trace(&mut self, strategy: &'static str, candidates: usize, matched: bool) {
        if let Some(existing) = self.strategies.iter_mut().find(|t| t.strategy == strategy) {
            existing.candidates = existing.candidates.max(candidates);
            existing.matched |= matched;
        } else {
            self.strategies.push(StrategyTrace {
                strategy,
                candidates,
                matched,
            });
        }
    }
}

pub(crate) fn trigger_criteria() -> Selector {
    Selector::Any(vec![
        Selector::Attr {
            name: "aria-haspopup".into(),
            contains: "menu".into(),
        },
        Selector::Attr {
            name: "aria-label".into(),
            contains: "option".into(),
        },
        Selector::Attr {
            name: "data-testid".into(),
            contains: "options".into(),
        },
    ])
}

pub(crate) fn menu_surface_criteria() -> Selector {
    Selector::Any(vec![
        Selector::Role {
            role: "menu".into(),
            name: None,
        },
        Selector::Role {
            role: "listbox".into(),
            name: None,
        },
        Selector::ClassSubstring("menu".into()),
        Selector::ClassSubstring("dropdown".into()),
        Selector::ClassSubstring("popover".into()),
    ])
}

pub(crate) fn dialog_criteria() -> Selector {
    Selector::Any(vec![
        Selector::Role {
            role: "dialog".into(),
            name: None,
        },
        Selector::ClassSubstring("dialog".into()),
        Selector::ClassSubstring("modal".into()),
    ])
}

/// Nearest ancestor that reads as the row's structural container.
pub(crate) fn row_container(element: &UiElement) -> Result<Option<UiElement>, SweepError> {
    let criteria = Selector::Any(vec![
        Selector::Role {
            role: "listitem".into(),
            name: None,
        },
        Selector::Attr {
            name: "data-sidebar-item".into(),
            contains: "".into(),
        },
        Selector::ClassSubstring("menu-item".into()),
    ]);
    let mut cursor = element.parent()?;
    for _ in 0..5 {
        match cursor {
            Some(node) => {
                if criteria.matches(&node)? {
                    return Ok(Some(node));
                }
                cursor = node.parent()?;
            }
            None => break,
        }
    }
    Ok(None)
}

/// Match rank for a delete-action label: 0 for an exact label, 1 for
/// substring containment. `None` when the text does not read as delete.
fn delete_rank(element: &UiElement) -> Option<u8> {
    let text = element.label_text()?;
    let normalized = text.trim().to_lowercase();
    if DELETE_LABELS.iter().any(|l| normalized == *l) {
        Some(0)
    } else if normalized.contains("delete") || normalized.contains(TRASH_GLYPH) {
        Some(1)
    } else {
        None
    }
}

/// Heuristic, multi-strategy search over the live host surface.
///
/// Strategies run in a fixed priority order, each more permissive than the
/// last; every candidate passes the visibility predicate, and elements
/// belonging to the automation's own injected UI are always excluded. The
/// locator never mutates the page.
#[derive(Clone)]
pub struct Locator {
    surface: Arc<dyn HostSurface>,
    config: LocatorConfig,
}

impl Locator {
    pub fn new(surface: Arc<dyn HostSurface>, config: LocatorConfig) -> Self {
        Self { surface, config }
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Wait for an element matching the intent to appear, polling until the
    /// budget runs out.
    #[instrument(level = "debug", skip(self, context))]
    pub async fn wait_for(
        &self,
        intent: &Intent,
        context: Option<&UiElement>,
        budget: Duration,
    ) -> Result<UiElement, SweepError> {
        self.wait_for_with_report(intent, context, budget).await.0
    }

    /// As `wait_for`, but also returns the strategy trace for diagnostics.
    pub async fn wait_for_with_report(
        &self,
        intent: &Intent,
        context: Option<&UiElement>,
        budget: Duration,
    ) -> (Result<UiElement, SweepError>, LocatorReport) {
        let deadline = Instant::now() + budget;
        let poll = self.config.poll_interval.max(Duration::from_millis(1));
        // Hard attempt ceiling so the loop terminates even if the clock stalls.
        let max_attempts = (budget.as_millis() / poll.as_millis()).max(1) as u32 + 1;
        let mut report = LocatorReport::new(intent);

        loop {
            report.attempts += 1;
            match self.find_traced(intent, context, &mut report) {
                Ok(Some(element)) => {
                    debug!(intent = %report.intent, attempts = report.attempts, "element located");
                    return (Ok(element), report);
                }
                Ok(None) => {}
                Err(e) => return (Err(e), report),
            }
            if Instant::now() >= deadline || report.attempts >= max_attempts {
                warn!(
                    intent = %report.intent,
                    report = %serde_json::to_string(&report).unwrap_or_default(),
                    "search exhausted its budget"
                );
                let err = SweepError::Timeout(format!(
                    "no match for {:?} within {budget:?} ({} attempts)",
                    intent, report.attempts
                ));
                return (Err(err), report);
            }
            sleep(poll).await;
        }
    }

    /// Run a single pass of the strategy ladder without waiting.
    pub fn find_once(
        &self,
        intent: &Intent,
        context: Option<&UiElement>,
    ) -> Result<Option<UiElement>, SweepError> {
        let mut report = LocatorReport::new(intent);
        self.find_traced(intent, context, &mut report)
    }

    fn find_traced(
        &self,
        intent: &Intent,
        context: Option<&UiElement>,
        report: &mut LocatorReport,
    ) -> Result<Option<UiElement>, SweepError> {
        match intent {
            Intent::ListContainer => self.find_list_container(report),
            Intent::ItemRow { id } => self.find_item_row(id, report),
            Intent::MenuTrigger => {
                let row = context.ok_or_else(|| {
                    SweepError::Internal("menu-trigger search requires a row context".into())
                })?;
                self.find_menu_trigger(row, report)
            }
            Intent::DeleteAction => self.find_delete_action(report),
            Intent::ConfirmControl => self.find_confirm_control(report),
        }
    }

    fn find_list_container(
        &self,
        report: &mut LocatorReport,
    ) -> Result<Option<UiElement>, SweepError> {
        match self.surface.list_container() {
            Ok(container) => {
                let visible = self.usable(&container);
                report.trace("surface_container", 1, visible);
                Ok(visible.then_some(container))
            }
            Err(_) => {
                report.trace("surface_container", 0, false);
                Ok(None)
            }
        }
    }

    fn find_item_row(
        &self,
        id: &str,
        report: &mut LocatorReport,
    ) -> Result<Option<UiElement>, SweepError> {
        let items = self.surface.query_items()?;
        let found = items.iter().find(|item| item.id == id).map(|i| i.handle.clone());
        report.trace("fresh_item_query", items.len(), found.is_some());
        Ok(found)
    }

    fn find_menu_trigger(
        &self,
        row: &UiElement,
        report: &mut LocatorReport,
    ) -> Result<Option<UiElement>, SweepError> {
        let row_bounds = row.bounds().ok();

        // 1. Semantic attributes scoped to the row itself.
        let candidates = self.surface.find_elements(&trigger_criteria(), Some(row))?;
        let hit = candidates.iter().find(|el| self.usable(el)).cloned();
        report.trace("semantic_in_region", candidates.len(), hit.is_some());
        if hit.is_some() {
            return Ok(hit);
        }

        // 2. Any visible button within the row region.
        let button = Selector::Role {
            role: "button".into(),
            name: None,
        };
        let candidates = self.surface.find_elements(&button, Some(row))?;
        let hit = candidates.iter().find(|el| self.usable(el)).cloned();
        report.trace("button_in_region", candidates.len(), hit.is_some());
        if hit.is_some() {
            return Ok(hit);
        }

        // 3. Structural proximity: climb the ancestor chain, preferring
        // candidates on the same visual row as the context.
        let mut seen = 0usize;
        let mut scanned = 0usize;
        let mut ancestor = row.parent()?;
        while let Some(scope) = ancestor {
            if seen >= self.config.proximity_depth {
                break;
            }
            seen += 1;
            let mut best: Option<(f64, UiElement)> = None;
            for el in self.surface.find_elements(&trigger_criteria(), Some(&scope))? {
                if row.contains(&el) {
                    continue;
                }
                scanned += 1;
                if !self.usable(&el) {
                    continue;
                }
                if let (Some(rb), Ok(eb)) = (row_bounds, el.bounds()) {
                    if vertical_overlap(&rb, &eb) {
                        let gap = horizontal_gap(&rb, &eb);
                        if best.as_ref().map(|(g, _)| gap < *g).unwrap_or(true) {
                            best = Some((gap, el));
                        }
                    }
                }
            }
            if let Some((_, el)) = best {
                report.trace("structural_proximity", scanned, true);
                return Ok(Some(el));
            }
            ancestor = scope.parent()?;
        }
        report.trace("structural_proximity", scanned, false);

        // 4. Global fallback: semantic candidates anywhere, nearest same-row
        // element wins.
        let candidates = self.surface.find_elements(&trigger_criteria(), None)?;
        let total = candidates.len();
        let mut best: Option<(f64, UiElement)> = None;
        if let Some(rb) = row_bounds {
            for el in candidates {
                if !self.usable(&el) || row.contains(&el) {
                    continue;
                }
                if let Ok(eb) = el.bounds() {
                    if vertical_overlap(&rb, &eb) {
                        let gap = horizontal_gap(&rb, &eb);
                        if gap < self.config.max_horizontal_gap
                            && best.as_ref().map(|(g, _)| gap < *g).unwrap_or(true)
                        {
                            best = Some((gap, el));
                        }
                    }
                }
            }
        }
        report.trace("global_geometric", total, best.is_some());
        Ok(best.map(|(_, el)| el))
    }

    fn find_delete_action(
        &self,
        report: &mut LocatorReport,
    ) -> Result<Option<UiElement>, SweepError> {
        // 1. Menu items by role anywhere in the document; menus commonly
        // portal to the document root.
        let menuitem = Selector::Role {
            role: "menuitem".into(),
            name: None,
        };
        let candidates = self.surface.find_elements(&menuitem, None)?;
        let hit = self.best_delete_candidate(&candidates);
        report.trace("semantic_menuitem", candidates.len(), hit.is_some());
        if hit.is_some() {
            return Ok(hit);
        }

        // 2. Visible menu-like containers, scanning every visible descendant.
        let containers = self.surface.find_elements(&menu_surface_criteria(), None)?;
        let mut scanned = 0usize;
        let mut best: Option<(u8, UiElement)> = None;
        for container in containers.iter().filter(|c| self.usable(c)) {
            let descendants = self
                .surface
                .find_elements(&Selector::Visible(true), Some(container))?;
            scanned += descendants.len();
            for el in descendants {
                if self.is_own_ui(&el) {
                    continue;
                }
                if let Some(rank) = delete_rank(&el) {
                    if best.as_ref().map(|(r, _)| rank < *r).unwrap_or(true) {
                        best = Some((rank, el));
                    }
                }
            }
        }
        report.trace("menu_container_scan", scanned, best.is_some());
        if let Some((_, el)) = best {
            return Ok(Some(el));
        }

        // 3. Last resort: substring match anywhere, as long as the element
        // sits inside something menu-shaped.
        let mut candidates = self
            .surface
            .find_elements(&Selector::Text(TextMatch::Contains("delete".into())), None)?;
        candidates.extend(self.surface.find_elements(
            &Selector::Text(TextMatch::Contains(TRASH_GLYPH.into())),
            None,
        )?);
        let total = candidates.len();
        for el in candidates {
            if !self.usable(&el) {
                continue;
            }
            if self.has_ancestor_matching(&el, &menu_surface_criteria())? {
                report.trace("substring_in_menu_context", total, true);
                return Ok(Some(el));
            }
        }
        report.trace("substring_in_menu_context", total, false);
        Ok(None)
    }

    fn find_confirm_control(
        &self,
        report: &mut LocatorReport,
    ) -> Result<Option<UiElement>, SweepError> {
        let dialogs = self.surface.find_elements(&dialog_criteria(), None)?;
        let button = Selector::Role {
            role: "button".into(),
            name: None,
        };
        let mut scanned = 0usize;
        let mut generic: Option<UiElement> = None;
        for dialog in dialogs.iter().filter(|d| self.usable(d)) {
            for btn in self.surface.find_elements(&button, Some(dialog))? {
                scanned += 1;
                if !self.usable(&btn) {
                    continue;
                }
                let text = btn
                    .label_text()
                    .map(|t| t.trim().to_lowercase())
                    .unwrap_or_default();
                // Exact destructive label wins over a generic affirmative.
                if text == "delete" {
                    report.trace("dialog_scan", scanned, true);
                    return Ok(Some(btn));
                }
                if (text == "confirm" || text == "ok") && generic.is_none() {
                    generic = Some(btn);
                }
            }
        }
        report.trace("dialog_scan", scanned, generic.is_some());
        Ok(generic)
    }

    fn best_delete_candidate(&self, candidates: &[UiElement]) -> Option<UiElement> {
        let mut best: Option<(u8, UiElement)> = None;
        for el in candidates {
            if !self.usable(el) {
                continue;
            }
            if let Some(rank) = delete_rank(el) {
                if best.as_ref().map(|(r, _)| rank < *r).unwrap_or(true) {
                    best = Some((rank, el.clone()));
                }
            }
        }
        best.map(|(_, el)| el)
    }

    fn has_ancestor_matching(
        &self,
        element: &UiElement,
        criteria: &Selector,
    ) -> Result<bool, SweepError> {
        let mut cursor = element.parent()?;
        while let Some(node) = cursor {
            if criteria.matches(&node)? {
                return Ok(true);
            }
            cursor = node.parent()?;
        }
        Ok(false)
    }

    fn usable(&self, element: &UiElement) -> bool {
        element.is_visible().unwrap_or(false) && !self.is_own_ui(element)
    }

    fn is_own_ui(&self, element: &UiElement) -> bool {
        element
            .class_name()
            .map(|c| c.contains(&self.config.own_ui_marker))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locator").field("config", &self.config).finish()
    }
}
