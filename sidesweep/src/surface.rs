use crate::element::UiElement;
use crate::errors::SweepError;
use crate::selector::Selector;
use serde::Serialize;
use std::sync::Arc;

/// One deletable entry in the host-rendered list.
///
/// `handle` is a transient reference into the live page. It is only as fresh
/// as the `query_items` call that produced it; after any asynchronous wait the
/// caller must re-query rather than trust a held handle.
#[derive(Debug, Clone, Serialize)]
pub struct ListItem {
    /// Stable, unique key for the item (the item's canonical address).
    pub id: String,
    /// Display label, informational only.
    pub label: String,
    #[serde(skip)]
    pub handle: UiElement,
}

/// Callback invoked whenever the host surface mutates.
pub type ChangeHandler = Arc<dyn Fn() + Send + Sync>;

/// A registered change subscription. Dropping it (or calling `cancel`)
/// unregisters the handler.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// The host page adapter every search and interaction goes through.
///
/// Queries must be cheap and repeatable: callers invoke them on every poll
/// tick and never assume an element returned by a prior call is still
/// attached. The trait never exposes a way to mutate the list directly; all
/// mutation happens through element interactions.
pub trait HostSurface: Send + Sync {
    /// The sidebar/list container, if currently present on the page.
    fn list_container(&self) -> Result<UiElement, SweepError>;

    /// All currently rendered items, in display order.
    fn query_items(&self) -> Result<Vec<ListItem>, SweepError>;

    /// All elements matching `selector` under `scope` (document root when
    /// `None`), in document order, excluding the scope element itself.
    fn find_elements(
        &self,
        selector: &Selector,
        scope: Option<&UiElement>,
    ) -> Result<Vec<UiElement>, SweepError>;

    /// Register a structure-change handler. The returned subscription
    /// unregisters on drop.
    fn subscribe(&self, handler: ChangeHandler) -> Result<Subscription, SweepError>;
}

/// Depth-first preorder scan of `scope`'s subtree, collecting elements the
/// selector matches. The scope element itself is excluded. Useful for
/// `HostSurface` implementations that hold a concrete tree.
pub fn scan_subtree(scope: &UiElement, selector: &Selector) -> Result<Vec<UiElement>, SweepError> {
    let mut out = Vec::new();
    let mut stack: Vec<UiElement> = scope.children()?;
    stack.reverse();
    while let Some(element) = stack.pop() {
        if selector.matches(&element)? {
            out.push(element.clone());
        }
        let mut children = element.children()?;
        children.reverse();
        stack.extend(children);
    }
    Ok(out)
}
