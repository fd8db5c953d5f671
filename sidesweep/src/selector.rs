use crate::element::UiElement;
use crate::errors::SweepError;

/// Text comparison for labels and menu/dialog actions.
///
/// All variants trim whitespace and compare case-insensitively, so
/// `" Delete Chat "` matches the exact label `"delete chat"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TextMatch {
    /// Exact label match.
    Exact(String),
    /// Exact match against any label in the set.
    AnyOf(Vec<String>),
    /// Substring containment, the most permissive form.
    Contains(String),
}

impl TextMatch {
    pub fn matches(&self, candidate: &str) -> bool {
        let normalized = candidate.trim().to_lowercase();
        match self {
            TextMatch::Exact(expected) => normalized == expected.trim().to_lowercase(),
            TextMatch::AnyOf(labels) => labels
                .iter()
                .any(|label| normalized == label.trim().to_lowercase()),
            TextMatch::Contains(fragment) => normalized.contains(&fragment.trim().to_lowercase()),
        }
    }
}

/// Represents ways to locate an element on the host surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Select by role and optional accessible name
    Role { role: String, name: Option<String> },
    /// Select by attribute whose value contains the given fragment
    Attr { name: String, contains: String },
    /// Select by class-name substring
    ClassSubstring(String),
    /// Select by text content
    Text(TextMatch),
    /// Filter by visibility on screen
    Visible(bool),
    /// Match if any of the inner selectors match
    Any(Vec<Selector>),
    /// Chain of selectors matched against the element and its ancestors
    Chain(Vec<Selector>),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        // Handle chained selectors first
        let parts: Vec<&str> = s.split(">>").map(|p| p.trim()).collect();
        if parts.len() > 1 {
            return Selector::Chain(parts.into_iter().map(Selector::from).collect());
        }

        match s {
            _ if s.starts_with("role:") => Selector::Role {
                role: s[5..].trim().to_string(),
                name: None,
            },
            // Common roles default to Role selectors rather than text matches
            "menu" | "menuitem" | "button" | "dialog" | "listbox" | "listitem" | "nav"
            | "checkbox" | "link" => Selector::Role {
                role: s.to_string(),
                name: None,
            },
            _ if s.to_lowercase().starts_with("class:") => {
                let parts: Vec<&str> = s.splitn(2, ':').collect();
                Selector::ClassSubstring(parts[1].trim().to_string())
            }
            _ if s.to_lowercase().starts_with("attr:") => {
                let body = &s["attr:".len()..];
                match body.split_once('=') {
                    Some((name, fragment)) => Selector::Attr {
                        name: name.trim().to_string(),
                        contains: fragment.trim().to_string(),
                    },
                    None => Selector::Invalid(format!(
                        "attr selector must be attr:name=fragment, got '{s}'"
                    )),
                }
            }
            _ if s.to_lowercase().starts_with("text:") => {
                Selector::Text(TextMatch::Exact(s["text:".len()..].trim().to_string()))
            }
            _ if s.to_lowercase().starts_with("contains:") => {
                Selector::Text(TextMatch::Contains(s["contains:".len()..].trim().to_string()))
            }
            _ if s.to_lowercase().starts_with("visible:") => {
                let value = s["visible:".len()..].trim().to_lowercase();
                Selector::Visible(value == "true")
            }
            _ => Selector::Invalid(format!("unrecognized selector '{s}'")),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

impl Selector {
    /// Evaluate this selector against a single element.
    ///
    /// `Chain` matches when the final link matches the element itself and each
    /// preceding link matches some strictly higher ancestor, in order.
    pub fn matches(&self, element: &UiElement) -> Result<bool, SweepError> {
        match self {
            Selector::Role { role, name } => {
                if !element.role().eq_ignore_ascii_case(role) {
                    return Ok(false);
                }
                match name {
                    Some(expected) => Ok(element
                        .label_text()
                        .map(|t| TextMatch::Exact(expected.clone()).matches(&t))
                        .unwrap_or(false)),
                    None => Ok(true),
                }
            }
            Selector::Attr { name, contains } => Ok(element
                .attribute(name)
                .map(|v| v.to_lowercase().contains(&contains.to_lowercase()))
                .unwrap_or(false)),
            Selector::ClassSubstring(fragment) => Ok(element
                .class_name()
                .map(|c| c.to_lowercase().contains(&fragment.to_lowercase()))
                .unwrap_or(false)),
            Selector::Text(text_match) => Ok(element
                .label_text()
                .map(|t| text_match.matches(&t))
                .unwrap_or(false)),
            Selector::Visible(expected) => Ok(element.is_visible()? == *expected),
            Selector::Any(selectors) => {
                for selector in selectors {
                    if selector.matches(element)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Selector::Chain(links) => {
                let Some((last, prefix)) = links.split_last() else {
                    return Ok(false);
                };
                if !last.matches(element)? {
                    return Ok(false);
                }
                let mut cursor = element.parent()?;
                for selector in prefix.iter().rev() {
                    let mut matched = false;
                    while let Some(node) = cursor {
                        let parent = node.parent()?;
                        if selector.matches(&node)? {
                            matched = true;
                            cursor = parent;
                            break;
                        }
                        cursor = parent;
                    }
                    if !matched {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Selector::Invalid(reason) => Err(SweepError::InvalidSelector(reason.clone())),
        }
    }
}
