//! Scripted in-memory host surface used by the unit tests.
//!
//! Models just enough of a hostile list UI to exercise every stage: rows with
//! hover-gated triggers, menus that only respond to certain interaction
//! primitives, dialogs that may never appear and rows that refuse to go away.

use crate::element::{Bounds, UiElement, UiElementAttributes, UiElementImpl};
use crate::errors::SweepError;
use crate::selector::Selector;
use crate::surface::{scan_subtree, ChangeHandler, HostSurface, ListItem, Subscription};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMethod {
    Activate,
    Pointer,
    KeySpace,
    KeyEnter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPlacement {
    /// Inside the row's trailing container.
    InsideRow,
    /// A sibling of the row within the list item.
    SiblingInContainer,
    /// Attached far from the row, sharing only its vertical band.
    FloatingAligned,
}

/// How one item behaves when poked.
#[derive(Debug, Clone)]
pub struct ItemScript {
    pub reveal_on_hover: bool,
    pub trigger_placement: TriggerPlacement,
    /// Which interaction opens the menu; `None` means it never opens.
    pub open_on: Option<OpenMethod>,
    pub menu_has_delete: bool,
    pub context_menu_has_delete: bool,
    pub dialog_appears: bool,
    pub removes_on_confirm: bool,
    pub delete_label: &'static str,
    pub confirm_label: &'static str,
}

impl Default for ItemScript {
    fn default() -> Self {
        Self {
            reveal_on_hover: true,
            trigger_placement: TriggerPlacement::InsideRow,
            open_on: Some(OpenMethod::Activate),
            menu_has_delete: true,
            context_menu_has_delete: false,
            dialog_appears: true,
            removes_on_confirm: true,
            delete_label: "Delete",
            confirm_label: "Delete",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    role: String,
    label: Option<String>,
    text: Option<String>,
    class_name: Option<String>,
    attrs: Vec<(String, String)>,
    bounds: Bounds,
    visible: bool,
}

impl NodeSpec {
    pub fn new(role: &str) -> Self {
        Self {
            role: role.to_string(),
            visible: true,
            bounds: (0.0, 0.0, 100.0, 20.0),
            ..Default::default()
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn class(mut self, class_name: &str) -> Self {
        self.class_name = Some(class_name.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

#[derive(Debug, Clone, Default)]
struct Node {
    role: String,
    label: Option<String>,
    text: Option<String>,
    class_name: Option<String>,
    attrs: HashMap<String, String>,
    bounds: Bounds,
    visible: bool,
    attached: bool,
    parent: Option<usize>,
    children: Vec<usize>,
    item_id: Option<String>,
    trigger_for: Option<String>,
    delete_action_for: Option<String>,
    confirm_for: Option<String>,
    dismiss_button: bool,
}

struct DomState {
    nodes: Vec<Node>,
    root: usize,
    container: usize,
    container_present: bool,
    rows: Vec<(String, usize)>,
    triggers: HashMap<String, usize>,
    scripts: HashMap<String, ItemScript>,
    handlers: HashMap<usize, ChangeHandler>,
    next_handler: usize,
    deletion_log: Vec<String>,
    open_menu: Option<usize>,
    open_dialog: Option<usize>,
}

impl DomState {
    fn add(&mut self, parent: Option<usize>, spec: NodeSpec) -> usize {
        let id = self.nodes.len();
        let mut attrs: HashMap<String, String> = spec.attrs.into_iter().collect();
        if let Some(label) = &spec.label {
            attrs.entry("aria-label".to_string()).or_insert_with(|| label.clone());
        }
        self.nodes.push(Node {
            role: spec.role,
            label: spec.label,
            text: spec.text,
            class_name: spec.class_name,
            attrs,
            bounds: spec.bounds,
            visible: spec.visible,
            attached: true,
            parent,
            children: Vec::new(),
            ..Default::default()
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(id);
        }
        id
    }

    fn detach(&mut self, node: usize) {
        if let Some(parent) = self.nodes[node].parent {
            self.nodes[parent].children.retain(|&c| c != node);
        }
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            self.nodes[current].attached = false;
            self.nodes[current].visible = false;
            stack.extend(self.nodes[current].children.clone());
        }
    }

    fn close_menu(&mut self) {
        if let Some(menu) = self.open_menu.take() {
            self.detach(menu);
        }
    }

    fn close_dialog(&mut self) {
        if let Some(dialog) = self.open_dialog.take() {
            self.detach(dialog);
        }
    }

    fn spawn_menu(&mut self, item: &str, with_delete: bool, delete_label: &str) {
        self.close_menu();
        let row_y = self
            .rows
            .iter()
            .find(|(id, _)| id.as_str() == item)
            .map(|(_, node)| self.nodes[*node].bounds.1)
            .unwrap_or(0.0);
        let menu = self.add(
            Some(self.root),
            NodeSpec::new("menu")
                .class("dropdown-menu")
                .bounds((320.0, row_y, 160.0, 120.0)),
        );
        self.add(
            Some(menu),
            NodeSpec::new("menuitem")
                .text("Rename")
                .bounds((324.0, row_y + 4.0, 152.0, 28.0)),
        );
        self.add(
            Some(menu),
            NodeSpec::new("menuitem")
                .text("Archive")
                .bounds((324.0, row_y + 36.0, 152.0, 28.0)),
        );
        if with_delete {
            let action = self.add(
                Some(menu),
                NodeSpec::new("menuitem")
                    .text(delete_label)
                    .bounds((324.0, row_y + 68.0, 152.0, 28.0)),
            );
            self.nodes[action].delete_action_for = Some(item.to_string());
        }
        if let Some(&trigger) = self.triggers.get(item) {
            self.nodes[trigger]
                .attrs
                .insert("aria-expanded".into(), "true".into());
            self.nodes[trigger]
                .attrs
                .insert("data-state".into(), "open".into());
        }
        self.open_menu = Some(menu);
    }

    fn spawn_dialog(&mut self, item: &str, confirm_label: &str) {
        self.close_dialog();
        let dialog = self.add(
            Some(self.root),
            NodeSpec::new("dialog")
                .class("modal")
                .label("Delete chat?")
                .bounds((200.0, 200.0, 320.0, 160.0)),
        );
        let cancel = self.add(
            Some(dialog),
            NodeSpec::new("button")
                .text("Cancel")
                .bounds((220.0, 310.0, 80.0, 32.0)),
        );
        self.nodes[cancel].dismiss_button = true;
        let confirm = self.add(
            Some(dialog),
            NodeSpec::new("button")
                .text(confirm_label)
                .bounds((320.0, 310.0, 80.0, 32.0)),
        );
        self.nodes[confirm].confirm_for = Some(item.to_string());
        self.open_dialog = Some(dialog);
    }

    fn remove_item(&mut self, item: &str) {
        if let Some(position) = self.rows.iter().position(|(id, _)| id.as_str() == item) {
            let (_, row) = self.rows.remove(position);
            // Detach the structural container, not just the row element.
            let target = self.nodes[row].parent.unwrap_or(row);
            self.detach(target);
            self.deletion_log.push(item.to_string());
        }
        self.triggers.remove(item);
    }

    fn collect_handlers(&self) -> Vec<ChangeHandler> {
        self.handlers.values().cloned().collect()
    }
}

/// Scripted host surface. Construction lays out a page deep enough that the
/// document root sits beyond the locator's proximity depth:
/// root > shell > main > nav > listitem > row.
pub struct FakeSurface {
    state: Arc<Mutex<DomState>>,
}

impl FakeSurface {
    pub fn new(items: &[(&str, &str)]) -> Arc<Self> {
        Self::with_scripts(
            items
                .iter()
                .map(|(id, label)| (id.to_string(), label.to_string(), ItemScript::default()))
                .collect(),
        )
    }

    pub fn with_scripts(items: Vec<(String, String, ItemScript)>) -> Arc<Self> {
        let mut state = DomState {
            nodes: Vec::new(),
            root: 0,
            container: 0,
            container_present: true,
            rows: Vec::new(),
            triggers: HashMap::new(),
            scripts: HashMap::new(),
            handlers: HashMap::new(),
            next_handler: 0,
            deletion_log: Vec::new(),
            open_menu: None,
            open_dialog: None,
        };
        let root = state.add(None, NodeSpec::new("document").bounds((0.0, 0.0, 1280.0, 720.0)));
        state.root = root;
        let shell = state.add(
            Some(root),
            NodeSpec::new("generic").class("app-shell").bounds((0.0, 0.0, 1280.0, 720.0)),
        );
        let main = state.add(
            Some(shell),
            NodeSpec::new("generic").class("layout-main").bounds((0.0, 0.0, 1280.0, 720.0)),
        );
        let container = state.add(
            Some(main),
            NodeSpec::new("nav")
                .label("Chat history")
                .class("sidebar")
                .bounds((0.0, 0.0, 280.0, 720.0)),
        );
        state.container = container;

        for (index, (id, label, script)) in items.into_iter().enumerate() {
            let y = 10.0 + 40.0 * index as f64;
            let listitem = state.add(
                Some(container),
                NodeSpec::new("listitem").class("relative").bounds((8.0, y, 264.0, 36.0)),
            );
            let row = state.add(
                Some(listitem),
                NodeSpec::new("link").label(&label).bounds((8.0, y, 230.0, 36.0)),
            );
            state.nodes[row].item_id = Some(id.clone());

            let trigger_spec = NodeSpec::new("button")
                .label("Open conversation options")
                .attr("aria-haspopup", "menu")
                .attr("data-testid", "conversation-options");
            let trigger = match script.trigger_placement {
                TriggerPlacement::InsideRow => {
                    let trailing = state.add(
                        Some(row),
                        NodeSpec::new("generic")
                            .class("trailing-pair")
                            .bounds((210.0, y + 6.0, 28.0, 24.0)),
                    );
                    state.add(Some(trailing), trigger_spec.bounds((212.0, y + 6.0, 24.0, 24.0)))
                }
                TriggerPlacement::SiblingInContainer => {
                    state.add(Some(listitem), trigger_spec.bounds((244.0, y + 6.0, 24.0, 24.0)))
                }
                TriggerPlacement::FloatingAligned => {
                    state.add(Some(state.root), trigger_spec.bounds((300.0, y + 6.0, 24.0, 24.0)))
                }
            };
            state.nodes[trigger].trigger_for = Some(id.clone());
            state.nodes[trigger].visible = !script.reveal_on_hover;
            state.triggers.insert(id.clone(), trigger);
            state.rows.push((id.clone(), row));
            state.scripts.insert(id, script);
        }

        Arc::new(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    pub fn element(&self, node: usize) -> UiElement {
        UiElement::new(FakeElement {
            state: self.state.clone(),
            node,
        })
    }

    pub fn root_element(&self) -> UiElement {
        let root = self.state.lock().unwrap().root;
        self.element(root)
    }

    pub fn add_node(&self, parent: Option<usize>, spec: NodeSpec) -> usize {
        let mut state = self.state.lock().unwrap();
        let parent = parent.unwrap_or(state.root);
        state.add(Some(parent), spec)
    }

    pub fn row_handle(&self, id: &str) -> Option<UiElement> {
        let node = {
            let state = self.state.lock().unwrap();
            state.rows.iter().find(|(rid, _)| rid.as_str() == id).map(|(_, n)| *n)
        };
        node.map(|n| self.element(n))
    }

    pub fn deletion_log(&self) -> Vec<String> {
        self.state.lock().unwrap().deletion_log.clone()
    }

    pub fn handler_count(&self) -> usize {
        self.state.lock().unwrap().handlers.len()
    }

    pub fn set_container_present(&self, present: bool) {
        self.state.lock().unwrap().container_present = present;
    }

    /// Simulate the host itself removing an item (e.g. deletion from another
    /// tab), firing change notifications.
    pub fn host_remove(&self, id: &str) {
        let handlers = {
            let mut state = self.state.lock().unwrap();
            state.remove_item(id);
            state.collect_handlers()
        };
        for handler in handlers {
            handler();
        }
    }
}

impl HostSurface for FakeSurface {
    fn list_container(&self) -> Result<UiElement, SweepError> {
        let state = self.state.lock().unwrap();
        if !state.container_present || !state.nodes[state.container].attached {
            return Err(SweepError::SurfaceUnavailable("list container missing".into()));
        }
        let container = state.container;
        drop(state);
        Ok(self.element(container))
    }

    fn query_items(&self) -> Result<Vec<ListItem>, SweepError> {
        let state = self.state.lock().unwrap();
        if !state.container_present {
            return Err(SweepError::SurfaceUnavailable("list container missing".into()));
        }
        let rows: Vec<(String, String, usize)> = state
            .rows
            .iter()
            .filter(|(_, node)| state.nodes[*node].attached)
            .map(|(id, node)| {
                let label = state.nodes[*node].label.clone().unwrap_or_default();
                (id.clone(), label, *node)
            })
            .collect();
        drop(state);
        Ok(rows
            .into_iter()
            .map(|(id, label, node)| ListItem {
                id,
                label,
                handle: self.element(node),
            })
            .collect())
    }

    fn find_elements(
        &self,
        selector: &Selector,
        scope: Option<&UiElement>,
    ) -> Result<Vec<UiElement>, SweepError> {
        let scope = match scope {
            Some(scope) => scope.clone(),
            None => self.root_element(),
        };
        scan_subtree(&scope, selector)
    }

    fn subscribe(&self, handler: ChangeHandler) -> Result<Subscription, SweepError> {
        let id = {
            let mut state = self.state.lock().unwrap();
            let id = state.next_handler;
            state.next_handler += 1;
            state.handlers.insert(id, handler);
            id
        };
        let state = self.state.clone();
        Ok(Subscription::new(move || {
            state.lock().unwrap().handlers.remove(&id);
        }))
    }
}

#[derive(Clone)]
struct FakeElement {
    state: Arc<Mutex<DomState>>,
    node: usize,
}

impl FakeElement {
    fn with_state<T>(&self, f: impl FnOnce(&mut DomState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Runs the scripted reaction for an interaction and fires change
    /// handlers outside the lock.
    fn interact(&self, method: Option<OpenMethod>) -> Result<(), SweepError> {
        let handlers = {
            let mut state = self.state.lock().unwrap();
            let node = state.nodes[self.node].clone();
            if !node.attached {
                return Err(SweepError::ElementDetached(format!("node {}", self.node)));
            }

            if let Some(item) = node.trigger_for.clone() {
                let script = state.scripts.get(&item).cloned().unwrap_or_default();
                if method.is_some() && script.open_on == method {
                    let with_delete = script.menu_has_delete;
                    state.spawn_menu(&item, with_delete, script.delete_label);
                }
                Vec::new()
            } else if let Some(item) = node.delete_action_for.clone() {
                let script = state.scripts.get(&item).cloned().unwrap_or_default();
                state.close_menu();
                if script.dialog_appears {
                    state.spawn_dialog(&item, script.confirm_label);
                }
                Vec::new()
            } else if let Some(item) = node.confirm_for.clone() {
                let script = state.scripts.get(&item).cloned().unwrap_or_default();
                state.close_dialog();
                if script.removes_on_confirm {
                    state.remove_item(&item);
                    state.collect_handlers()
                } else {
                    Vec::new()
                }
            } else if node.dismiss_button {
                state.close_dialog();
                Vec::new()
            } else {
                Vec::new()
            }
        };
        for handler in handlers {
            handler();
        }
        Ok(())
    }
}

impl std::fmt::Debug for FakeElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeElement").field("node", &self.node).finish()
    }
}

impl UiElementImpl for FakeElement {
    fn object_id(&self) -> usize {
        self.node
    }

    fn role(&self) -> String {
        self.with_state(|s| s.nodes[self.node].role.clone())
    }

    fn attributes(&self) -> UiElementAttributes {
        self.with_state(|s| {
            let node = &s.nodes[self.node];
            UiElementAttributes {
                role: node.role.clone(),
                label: node.label.clone(),
                text: node.text.clone(),
                class_name: node.class_name.clone(),
                properties: node.attrs.clone(),
                bounds: Some(node.bounds),
            }
        })
    }

    fn parent(&self) -> Result<Option<UiElement>, SweepError> {
        let parent = self.with_state(|s| s.nodes[self.node].parent);
        Ok(parent.map(|node| {
            UiElement::new(FakeElement {
                state: self.state.clone(),
                node,
            })
        }))
    }

    fn children(&self) -> Result<Vec<UiElement>, SweepError> {
        let children = self.with_state(|s| s.nodes[self.node].children.clone());
        Ok(children
            .into_iter()
            .map(|node| {
                UiElement::new(FakeElement {
                    state: self.state.clone(),
                    node,
                })
            })
            .collect())
    }

    fn bounds(&self) -> Result<crate::element::Bounds, SweepError> {
        self.with_state(|s| {
            let node = &s.nodes[self.node];
            if node.attached {
                Ok(node.bounds)
            } else {
                Err(SweepError::ElementDetached(format!("node {}", self.node)))
            }
        })
    }

    fn is_visible(&self) -> Result<bool, SweepError> {
        self.with_state(|s| {
            let node = &s.nodes[self.node];
            Ok(node.attached && node.visible)
        })
    }

    fn is_attached(&self) -> bool {
        self.with_state(|s| s.nodes[self.node].attached)
    }

    fn contains(&self, other: &UiElement) -> bool {
        self.with_state(|s| {
            let mut cursor = Some(other.object_id());
            while let Some(node) = cursor {
                if node == self.node {
                    return true;
                }
                cursor = s.nodes.get(node).and_then(|n| n.parent);
            }
            false
        })
    }

    fn activate(&self) -> Result<(), SweepError> {
        self.interact(Some(OpenMethod::Activate))
    }

    fn pointer_sequence(&self) -> Result<(), SweepError> {
        self.interact(Some(OpenMethod::Pointer))
    }

    fn press_key(&self, key: &str) -> Result<(), SweepError> {
        let method = match key {
            " " => Some(OpenMethod::KeySpace),
            "Enter" => Some(OpenMethod::KeyEnter),
            _ => None,
        };
        self.interact(method)
    }

    fn hover(&self) -> Result<(), SweepError> {
        self.with_state(|s| {
            let item = s.nodes[self.node].item_id.clone();
            if let Some(item) = item {
                let script = s.scripts.get(&item).cloned().unwrap_or_default();
                if script.reveal_on_hover {
                    if let Some(&trigger) = s.triggers.get(&item) {
                        if s.nodes[trigger].attached {
                            s.nodes[trigger].visible = true;
                        }
                    }
                }
            }
        });
        Ok(())
    }

    fn focus(&self) -> Result<(), SweepError> {
        Ok(())
    }

    fn context_menu(&self) -> Result<(), SweepError> {
        let item = self.with_state(|s| s.nodes[self.node].item_id.clone());
        if let Some(item) = item {
            self.with_state(|s| {
                let script = s.scripts.get(&item).cloned().unwrap_or_default();
                if script.context_menu_has_delete {
                    s.spawn_menu(&item, true, script.delete_label);
                }
            });
        }
        Ok(())
    }

    fn scroll_into_view(&self) -> Result<(), SweepError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn clone_box(&self) -> Box<dyn UiElementImpl> {
        Box::new(self.clone())
    }
}
