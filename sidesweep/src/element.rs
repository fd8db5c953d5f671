use crate::errors::SweepError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;

/// Element bounding box as (x, y, width, height) in page coordinates.
pub type Bounds = (f64, f64, f64, f64);

/// Two boxes overlap vertically when they share at least one horizontal band,
/// i.e. they sit on the same visual row.
pub fn vertical_overlap(a: &Bounds, b: &Bounds) -> bool {
    let (_, a_top, _, a_height) = *a;
    let (_, b_top, _, b_height) = *b;
    !(b_top + b_height < a_top || b_top > a_top + a_height)
}

/// Horizontal gap between the right edge of `a` and the left edge of `b`.
pub fn horizontal_gap(a: &Bounds, b: &Bounds) -> f64 {
    let (a_left, _, a_width, _) = *a;
    let (b_left, _, _, _) = *b;
    (b_left - (a_left + a_width)).abs()
}

fn is_empty_string(opt: &Option<String>) -> bool {
    match opt {
        Some(s) => s.is_empty(),
        None => true,
    }
}

fn is_empty_properties(props: &HashMap<String, String>) -> bool {
    props.is_empty()
}

/// Attributes associated with an element on the host surface.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct UiElementAttributes {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    /// Accessible label (e.g. an aria-label).
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub label: Option<String>,
    /// Rendered text content.
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub class_name: Option<String>,
    /// Raw attribute map (aria-* and data-* state flags live here).
    #[serde(default, skip_serializing_if = "is_empty_properties")]
    pub properties: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
}

impl fmt::Debug for UiElementAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug_struct = f.debug_struct("UiElementAttributes");
        if !self.role.is_empty() {
            debug_struct.field("role", &self.role);
        }
        if let Some(ref label) = self.label {
            if !label.is_empty() {
                debug_struct.field("label", label);
            }
        }
        if let Some(ref text) = self.text {
            if !text.is_empty() {
                debug_struct.field("text", text);
            }
        }
        if let Some(ref class_name) = self.class_name {
            if !class_name.is_empty() {
                debug_struct.field("class_name", class_name);
            }
        }
        if !self.properties.is_empty() {
            debug_struct.field("properties", &self.properties);
        }
        if let Some(ref bounds) = self.bounds {
            debug_struct.field("bounds", bounds);
        }
        debug_struct.finish()
    }
}

/// Interface for host-specific element implementations.
///
/// Implementations hold a transient reference into the live page. Any handle
/// may go stale after the host re-renders; `is_attached` answers whether it
/// still points at a node in the document.
pub trait UiElementImpl: Send + Sync + Debug {
    fn object_id(&self) -> usize;
    fn role(&self) -> String;
    fn attributes(&self) -> UiElementAttributes;
    fn parent(&self) -> Result<Option<UiElement>, SweepError>;
    fn children(&self) -> Result<Vec<UiElement>, SweepError>;
    fn bounds(&self) -> Result<Bounds, SweepError>;
    fn is_visible(&self) -> Result<bool, SweepError>;
    fn is_attached(&self) -> bool;
    fn contains(&self, other: &UiElement) -> bool;

    /// Semantic activation (a plain click on the host surface).
    fn activate(&self) -> Result<(), SweepError>;
    /// Low-level pointer-down/pointer-up/click event sequence.
    fn pointer_sequence(&self) -> Result<(), SweepError>;
    fn press_key(&self, key: &str) -> Result<(), SweepError>;
    fn hover(&self) -> Result<(), SweepError>;
    fn focus(&self) -> Result<(), SweepError>;
    fn context_menu(&self) -> Result<(), SweepError>;
    fn scroll_into_view(&self) -> Result<(), SweepError>;

    fn as_any(&self) -> &dyn std::any::Any;
    fn clone_box(&self) -> Box<dyn UiElementImpl>;
}

/// An element on the host surface.
pub struct UiElement {
    inner: Box<dyn UiElementImpl>,
}

impl UiElement {
    pub fn new(impl_: impl UiElementImpl + 'static) -> Self {
        Self {
            inner: Box::new(impl_),
        }
    }

    pub fn object_id(&self) -> usize {
        self.inner.object_id()
    }

    pub fn role(&self) -> String {
        self.inner.role()
    }

    pub fn attributes(&self) -> UiElementAttributes {
        self.inner.attributes()
    }

    /// Accessible label, falling back to text content.
    pub fn label_text(&self) -> Option<String> {
        let attrs = self.inner.attributes();
        attrs.label.filter(|l| !l.is_empty()).or(attrs.text)
    }

    pub fn class_name(&self) -> Option<String> {
        self.inner.attributes().class_name
    }

    /// Raw attribute value, e.g. `aria-expanded` or `data-state`.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.attributes().properties.get(name).cloned()
    }

    pub fn parent(&self) -> Result<Option<UiElement>, SweepError> {
        self.inner.parent()
    }

    pub fn children(&self) -> Result<Vec<UiElement>, SweepError> {
        self.inner.children()
    }

    pub fn bounds(&self) -> Result<Bounds, SweepError> {
        self.inner.bounds()
    }

    pub fn is_visible(&self) -> Result<bool, SweepError> {
        self.inner.is_visible()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.is_attached()
    }

    pub fn contains(&self, other: &UiElement) -> bool {
        self.inner.contains(other)
    }

    pub fn activate(&self) -> Result<(), SweepError> {
        self.inner.activate()
    }

    pub fn pointer_sequence(&self) -> Result<(), SweepError> {
        self.inner.pointer_sequence()
    }

    pub fn press_key(&self, key: &str) -> Result<(), SweepError> {
        self.inner.press_key(key)
    }

    pub fn hover(&self) -> Result<(), SweepError> {
        self.inner.hover()
    }

    pub fn focus(&self) -> Result<(), SweepError> {
        self.inner.focus()
    }

    pub fn context_menu(&self) -> Result<(), SweepError> {
        self.inner.context_menu()
    }

    pub fn scroll_into_view(&self) -> Result<(), SweepError> {
        self.inner.scroll_into_view()
    }

    pub fn as_any(&self) -> &dyn std::any::Any {
        self.inner.as_any()
    }
}

impl Clone for UiElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl PartialEq for UiElement {
    fn eq(&self, other: &Self) -> bool {
        self.inner.object_id() == other.inner.object_id()
    }
}

impl Eq for UiElement {}

impl Debug for UiElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiElement")
            .field("object_id", &self.inner.object_id())
            .field("attributes", &self.inner.attributes())
            .finish()
    }
}
