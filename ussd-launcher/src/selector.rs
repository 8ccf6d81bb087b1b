use crate::element::{roles, UIElementAttributes};

/// Represents ways to match an element in a tree snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Select by widget class name (exact match)
    Role(String),
    /// Select by view resource id (exact match)
    ViewId(String),
    /// Filter by clickability
    Clickable(bool),
    /// Every inner selector must match
    And(Vec<Selector>),
}

impl Selector {
    pub fn input() -> Self {
        Selector::Role(roles::INPUT.to_string())
    }

    pub fn clickable_button() -> Self {
        Selector::And(vec![
            Selector::Role(roles::BUTTON.to_string()),
            Selector::Clickable(true),
        ])
    }

    pub fn matches(&self, attrs: &UIElementAttributes) -> bool {
        match self {
            Selector::Role(role) => attrs.role == *role,
            Selector::ViewId(id) => attrs.view_id.as_deref() == Some(id.as_str()),
            Selector::Clickable(flag) => attrs.clickable == *flag,
            Selector::And(parts) => parts.iter().all(|s| s.matches(attrs)),
        }
    }
}
