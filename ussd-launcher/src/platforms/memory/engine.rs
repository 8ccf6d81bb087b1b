//! In-memory accessibility engine driven by scripted screens.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;

use super::element::MemoryElement;
use crate::element::{roles, UIElement, UIElementAttributes, UINode};
use crate::errors::AutomationError;
use crate::platforms::{AccessibilityEngine, Gesture, GlobalAction, SurfaceEvent, SurfaceEventKind};

pub const DEFAULT_PACKAGE: &str = "com.android.phone";

/// What happens when a clickable node is clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickEffect {
    /// Submit the input value and show the next scripted screen.
    Advance,
    /// Close the window.
    Dismiss,
    /// Report the click as not performed.
    Refuse,
    /// Accept the click without any visible change.
    Ignore,
}

/// One scripted dialog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screen {
    pub tree: UINode,
    /// Keyed by view id first, then by label.
    #[serde(default)]
    pub on_click: HashMap<String, ClickEffect>,
    /// The input field accepts `set_text` but keeps its old value.
    #[serde(default)]
    pub rejects_text: bool,
    /// Every `set_text` fails with this platform error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_error: Option<String>,
}

impl Screen {
    pub fn new(tree: UINode) -> Self {
        Self {
            tree,
            on_click: HashMap::new(),
            rejects_text: false,
            input_error: None,
        }
    }

    /// Message, input field, Cancel and Send buttons, as the stock phone app draws them.
    pub fn prompt(message: &str) -> Self {
        let tree = UINode::new(roles::FRAME)
            .with_package(DEFAULT_PACKAGE)
            .with_children(vec![
                UINode::text_view(message),
                UINode::input().with_view_id("com.android.phone:id/input_field"),
                UINode::new(roles::LAYOUT).with_children(vec![
                    UINode::button("Cancel", Some("android:id/button2")),
                    UINode::button("Send", Some("android:id/button1")),
                ]),
            ]);
        Self::new(tree)
            .on_click("android:id/button1", ClickEffect::Advance)
            .on_click("android:id/button2", ClickEffect::Dismiss)
    }

    /// Closing message with a single OK button.
    pub fn notice(message: &str) -> Self {
        let tree = UINode::new(roles::FRAME)
            .with_package(DEFAULT_PACKAGE)
            .with_children(vec![
                UINode::text_view(message),
                UINode::button("OK", Some("android:id/button1")),
            ]);
        Self::new(tree).on_click("android:id/button1", ClickEffect::Dismiss)
    }

    pub fn on_click(mut self, key: &str, effect: ClickEffect) -> Self {
        self.on_click.insert(key.to_string(), effect);
        self
    }

    pub fn rejecting_text(mut self) -> Self {
        self.rejects_text = true;
        self
    }

    pub fn failing_input(mut self, reason: &str) -> Self {
        self.input_error = Some(reason.to_string());
        self
    }
}

/// Everything the engine saw the automation do, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RecordedAction {
    Focus,
    SetText(String),
    Click {
        label: Option<String>,
        view_id: Option<String>,
        accepted: bool,
    },
    /// Value the input field held when an advancing click was accepted.
    Submitted(Option<String>),
    Global(GlobalAction),
    Gesture(Gesture),
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub attrs: UIElementAttributes,
    pub children: Vec<usize>,
}

#[derive(Debug, Default)]
pub(crate) struct SurfaceState {
    pub generation: u64,
    pub nodes: Vec<NodeData>,
    pub current: Option<Screen>,
    pub pending: VecDeque<Screen>,
    pub live_handles: usize,
    pub acquired: usize,
    pub actions: Vec<RecordedAction>,
    pub global_action_error: Option<String>,
}

impl SurfaceState {
    pub fn load(&mut self, screen: Option<Screen>) {
        self.generation += 1;
        self.nodes.clear();
        if let Some(ref screen) = screen {
            flatten(&screen.tree, &mut self.nodes);
        }
        self.current = screen;
    }

    pub fn node(&self, generation: u64, index: usize) -> Result<&NodeData, AutomationError> {
        if generation != self.generation {
            return Err(AutomationError::ElementDetached(format!(
                "node {index} belongs to window generation {generation}, current is {}",
                self.generation
            )));
        }
        self.nodes
            .get(index)
            .ok_or_else(|| AutomationError::ElementDetached(format!("node {index} is gone")))
    }

    pub fn node_mut(
        &mut self,
        generation: u64,
        index: usize,
    ) -> Result<&mut NodeData, AutomationError> {
        self.node(generation, index)?;
        Ok(&mut self.nodes[index])
    }

    pub fn input_value(&self) -> Option<String> {
        self.nodes
            .iter()
            .find(|n| n.attrs.role == roles::INPUT)
            .and_then(|n| n.attrs.text.clone())
    }

    pub fn click_effect(&self, attrs: &UIElementAttributes) -> ClickEffect {
        let Some(screen) = self.current.as_ref() else {
            return ClickEffect::Ignore;
        };
        attrs
            .view_id
            .as_ref()
            .and_then(|id| screen.on_click.get(id))
            .or_else(|| attrs.text.as_ref().and_then(|t| screen.on_click.get(t)))
            .copied()
            .unwrap_or(ClickEffect::Ignore)
    }

    fn rebuild(&self, index: usize) -> UINode {
        let node = &self.nodes[index];
        UINode {
            attributes: node.attrs.clone(),
            children: node.children.iter().map(|c| self.rebuild(*c)).collect(),
        }
    }
}

fn flatten(node: &UINode, out: &mut Vec<NodeData>) -> usize {
    let index = out.len();
    out.push(NodeData {
        attrs: node.attributes.clone(),
        children: Vec::new(),
    });
    let children: Vec<usize> = node.children.iter().map(|c| flatten(c, out)).collect();
    out[index].children = children;
    index
}

/// Hands out a counted handle to `index` within window `generation`.
pub(crate) fn acquire(shared: &Arc<Shared>, generation: u64, index: usize) -> UIElement {
    {
        let mut state = shared.state();
        state.live_handles += 1;
        state.acquired += 1;
    }
    UIElement::new(Box::new(MemoryElement::new(shared.clone(), generation, index)))
}

pub(crate) struct Shared {
    state: Mutex<SurfaceState>,
    events: broadcast::Sender<SurfaceEvent>,
}

impl Shared {
    pub fn state(&self) -> MutexGuard<'_, SurfaceState> {
        // A panicking test thread must not take the whole surface down with it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn emit(&self, kind: SurfaceEventKind) {
        let _ = self
            .events
            .send(SurfaceEvent::new(kind, Some(DEFAULT_PACKAGE)));
    }
}

/// A scripted, thread-safe stand-in for the device's accessibility service.
#[derive(Clone)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(256);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SurfaceState::default()),
                events,
            }),
        }
    }

    /// Engine that already shows `tree`.
    pub fn with_tree(tree: UINode) -> Self {
        let engine = Self::new();
        engine.shared.state().load(Some(Screen::new(tree)));
        engine
    }

    /// Engine with `screens` queued; nothing is shown until [`show_next`](Self::show_next).
    pub fn with_screens(screens: Vec<Screen>) -> Self {
        let engine = Self::new();
        engine.shared.state().pending.extend(screens);
        engine
    }

    pub fn push_screen(&self, screen: Screen) {
        self.shared.state().pending.push_back(screen);
    }

    /// Replace whatever is shown with the next queued screen. Returns `false`
    /// (and clears the window) when the script is exhausted.
    pub fn show_next(&self) -> bool {
        let shown = {
            let mut state = self.shared.state();
            let next = state.pending.pop_front();
            let shown = next.is_some();
            state.load(next);
            shown
        };
        self.shared.emit(SurfaceEventKind::WindowStateChanged);
        shown
    }

    pub fn dismiss(&self) {
        self.shared.state().load(None);
        self.shared.emit(SurfaceEventKind::WindowStateChanged);
    }

    /// Make every global action fail with a platform error.
    pub fn fail_global_actions(&self, reason: &str) {
        self.shared.state().global_action_error = Some(reason.to_string());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.shared.events.subscribe()
    }

    pub fn current_tree(&self) -> Option<UINode> {
        let state = self.shared.state();
        if state.nodes.is_empty() {
            None
        } else {
            Some(state.rebuild(0))
        }
    }

    pub fn is_showing(&self) -> bool {
        self.shared.state().current.is_some()
    }

    pub fn pending_screens(&self) -> usize {
        self.shared.state().pending.len()
    }

    /// Handles acquired and not yet released.
    pub fn live_handles(&self) -> usize {
        self.shared.state().live_handles
    }

    /// Handles ever acquired.
    pub fn acquired_handles(&self) -> usize {
        self.shared.state().acquired
    }

    pub fn actions(&self) -> Vec<RecordedAction> {
        self.shared.state().actions.clone()
    }

    /// Values the surface accepted through advancing clicks, in order.
    pub fn submitted_values(&self) -> Vec<String> {
        self.shared
            .state()
            .actions
            .iter()
            .filter_map(|a| match a {
                RecordedAction::Submitted(value) => Some(value.clone().unwrap_or_default()),
                _ => None,
            })
            .collect()
    }
}

impl AccessibilityEngine for MemoryEngine {
    fn root_in_active_window(&self) -> Option<UIElement> {
        let generation = {
            let state = self.shared.state();
            if state.nodes.is_empty() {
                return None;
            }
            state.generation
        };
        Some(acquire(&self.shared, generation, 0))
    }

    fn perform_global_action(&self, action: GlobalAction) -> Result<bool, AutomationError> {
        {
            let mut state = self.shared.state();
            if let Some(reason) = state.global_action_error.clone() {
                return Err(AutomationError::PlatformError(reason));
            }
            state.actions.push(RecordedAction::Global(action));
            if action == GlobalAction::Back && state.current.is_some() {
                state.load(None);
            } else {
                return Ok(true);
            }
        }
        debug!("Global {:?} closed the window", action);
        self.shared.emit(SurfaceEventKind::WindowStateChanged);
        Ok(true)
    }

    fn dispatch_gesture(&self, gesture: Gesture) -> Result<bool, AutomationError> {
        self.shared
            .state()
            .actions
            .push(RecordedAction::Gesture(gesture));
        Ok(true)
    }
}
