use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;

/// Class names the USSD surface uses for its widgets.
pub mod roles {
    pub const INPUT: &str = "android.widget.EditText";
    pub const BUTTON: &str = "android.widget.Button";
    pub const TEXT: &str = "android.widget.TextView";
    pub const LAYOUT: &str = "android.widget.LinearLayout";
    pub const FRAME: &str = "android.widget.FrameLayout";
}

/// Attributes associated with a UI element
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct UIElementAttributes {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(default)]
    pub clickable: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub focused: bool,
}

fn default_true() -> bool {
    true
}

impl Default for UIElementAttributes {
    fn default() -> Self {
        Self {
            role: String::new(),
            view_id: None,
            text: None,
            package_name: None,
            clickable: false,
            enabled: true,
            visible: true,
            focused: false,
        }
    }
}

impl fmt::Debug for UIElementAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug_struct = f.debug_struct("UIElementAttributes");
        debug_struct.field("role", &self.role);

        if let Some(ref view_id) = self.view_id {
            debug_struct.field("view_id", view_id);
        }
        if let Some(ref text) = self.text {
            if !text.is_empty() {
                debug_struct.field("text", text);
            }
        }
        if self.clickable {
            debug_struct.field("clickable", &true);
        }
        if !self.enabled {
            debug_struct.field("enabled", &false);
        }
        if !self.visible {
            debug_struct.field("visible", &false);
        }
        if self.focused {
            debug_struct.field("focused", &true);
        }

        debug_struct.finish()
    }
}

/// Serializable description of an element tree, used to script surfaces and
/// to dump what the engine currently shows.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UINode {
    pub attributes: UIElementAttributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UINode>,
}

impl UINode {
    pub fn new(role: &str) -> Self {
        Self {
            attributes: UIElementAttributes {
                role: role.to_string(),
                ..Default::default()
            },
            children: Vec::new(),
        }
    }

    pub fn text_view(text: &str) -> Self {
        let mut node = Self::new(roles::TEXT);
        node.attributes.text = Some(text.to_string());
        node
    }

    pub fn input() -> Self {
        let mut node = Self::new(roles::INPUT);
        node.attributes.clickable = true;
        node
    }

    pub fn button(label: &str, view_id: Option<&str>) -> Self {
        let mut node = Self::new(roles::BUTTON);
        node.attributes.text = Some(label.to_string());
        node.attributes.view_id = view_id.map(str::to_string);
        node.attributes.clickable = true;
        node
    }

    pub fn with_children(mut self, children: Vec<UINode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_package(mut self, package_name: &str) -> Self {
        self.attributes.package_name = Some(package_name.to_string());
        self
    }

    pub fn with_view_id(mut self, view_id: &str) -> Self {
        self.attributes.view_id = Some(view_id.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.attributes.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.attributes.enabled = false;
        self
    }
}

/// Interface for platform-specific element implementations
pub trait UIElementImpl: Send + Sync + Debug {
    fn object_id(&self) -> usize;
    fn attributes(&self) -> UIElementAttributes;
    fn role(&self) -> String {
        self.attributes().role
    }
    fn text(&self) -> Option<String> {
        self.attributes().text
    }
    fn children(&self) -> Result<Vec<UIElement>, AutomationError>;
    fn focus(&self) -> Result<bool, AutomationError>;
    fn set_text(&self, text: &str) -> Result<bool, AutomationError>;
    fn click(&self) -> Result<bool, AutomationError>;
    /// Gives the handle back to the platform. Called exactly once per handle.
    fn release(&self);
    fn clone_box(&self) -> Box<dyn UIElementImpl>;
}

/// Handle to one node of a tree snapshot. Dropping the handle releases it.
pub struct UIElement {
    inner: Box<dyn UIElementImpl>,
}

impl UIElement {
    pub fn new(impl_: Box<dyn UIElementImpl>) -> Self {
        Self { inner: impl_ }
    }

    pub fn object_id(&self) -> usize {
        self.inner.object_id()
    }

    pub fn attributes(&self) -> UIElementAttributes {
        self.inner.attributes()
    }

    pub fn role(&self) -> String {
        self.inner.role()
    }

    pub fn view_id(&self) -> Option<String> {
        self.attributes().view_id
    }

    pub fn text(&self) -> Option<String> {
        self.inner.text()
    }

    /// Label with surrounding whitespace removed; empty when the element has no text.
    pub fn label(&self) -> String {
        self.text().map(|t| t.trim().to_string()).unwrap_or_default()
    }

    pub fn is_clickable(&self) -> bool {
        self.attributes().clickable
    }

    pub fn is_visible(&self) -> bool {
        self.attributes().visible
    }

    pub fn is_enabled(&self) -> bool {
        self.attributes().enabled
    }

    pub fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        self.inner.children()
    }

    pub fn focus(&self) -> Result<bool, AutomationError> {
        self.inner.focus()
    }

    pub fn set_text(&self, text: &str) -> Result<bool, AutomationError> {
        self.inner.set_text(text)
    }

    pub fn click(&self) -> Result<bool, AutomationError> {
        self.inner.click()
    }
}

impl Drop for UIElement {
    fn drop(&mut self) {
        self.inner.release();
    }
}

impl Clone for UIElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl PartialEq for UIElement {
    fn eq(&self, other: &Self) -> bool {
        self.inner.object_id() == other.inner.object_id()
    }
}

impl Debug for UIElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UIElement")
            .field("object_id", &self.object_id())
            .field("attributes", &self.attributes())
            .finish()
    }
}
