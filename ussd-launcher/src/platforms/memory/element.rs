use std::fmt;
use std::sync::Arc;
use tracing::trace;

use super::engine::{acquire, ClickEffect, RecordedAction, Shared};
use crate::element::{UIElement, UIElementAttributes, UIElementImpl};
use crate::errors::AutomationError;
use crate::platforms::SurfaceEventKind;

/// Handle to a node of one window generation. Once the window changes every
/// operation except `attributes` fails with `ElementDetached`.
pub struct MemoryElement {
    shared: Arc<Shared>,
    generation: u64,
    index: usize,
}

impl MemoryElement {
    pub(crate) fn new(shared: Arc<Shared>, generation: u64, index: usize) -> Self {
        Self {
            shared,
            generation,
            index,
        }
    }
}

impl fmt::Debug for MemoryElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryElement")
            .field("generation", &self.generation)
            .field("index", &self.index)
            .finish()
    }
}

impl UIElementImpl for MemoryElement {
    fn object_id(&self) -> usize {
        ((self.generation as usize) << 20) | self.index
    }

    fn attributes(&self) -> UIElementAttributes {
        let state = self.shared.state();
        match state.node(self.generation, self.index) {
            Ok(node) => node.attrs.clone(),
            Err(_) => UIElementAttributes {
                visible: false,
                enabled: false,
                ..Default::default()
            },
        }
    }

    fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        let indices = {
            let state = self.shared.state();
            state.node(self.generation, self.index)?.children.clone()
        };
        Ok(indices
            .into_iter()
            .map(|index| acquire(&self.shared, self.generation, index))
            .collect())
    }

    fn focus(&self) -> Result<bool, AutomationError> {
        let mut state = self.shared.state();
        let node = state.node_mut(self.generation, self.index)?;
        if !node.attrs.enabled {
            return Ok(false);
        }
        node.attrs.focused = true;
        state.actions.push(RecordedAction::Focus);
        Ok(true)
    }

    fn set_text(&self, text: &str) -> Result<bool, AutomationError> {
        {
            let mut state = self.shared.state();
            let (rejects, failure) = state
                .current
                .as_ref()
                .map(|screen| (screen.rejects_text, screen.input_error.clone()))
                .unwrap_or((false, None));
            if let Some(reason) = failure {
                return Err(AutomationError::PlatformError(reason));
            }
            let node = state.node_mut(self.generation, self.index)?;
            if !node.attrs.enabled {
                return Ok(false);
            }
            if !rejects {
                node.attrs.text = if text.is_empty() {
                    None
                } else {
                    Some(text.to_string())
                };
            }
            state.actions.push(RecordedAction::SetText(text.to_string()));
        }
        self.shared.emit(SurfaceEventKind::WindowContentChanged);
        Ok(true)
    }

    fn click(&self) -> Result<bool, AutomationError> {
        let effect = {
            let mut state = self.shared.state();
            let attrs = state.node(self.generation, self.index)?.attrs.clone();
            let effect = if attrs.enabled && attrs.clickable {
                state.click_effect(&attrs)
            } else {
                ClickEffect::Refuse
            };
            state.actions.push(RecordedAction::Click {
                label: attrs.text.clone(),
                view_id: attrs.view_id.clone(),
                accepted: effect != ClickEffect::Refuse,
            });
            match effect {
                ClickEffect::Advance => {
                    let submitted = state.input_value();
                    state.actions.push(RecordedAction::Submitted(submitted));
                    let next = state.pending.pop_front();
                    state.load(next);
                }
                ClickEffect::Dismiss => state.load(None),
                ClickEffect::Refuse | ClickEffect::Ignore => {}
            }
            effect
        };
        trace!("Click on node {} resolved to {:?}", self.index, effect);
        match effect {
            ClickEffect::Refuse => Ok(false),
            ClickEffect::Ignore => Ok(true),
            ClickEffect::Advance | ClickEffect::Dismiss => {
                self.shared.emit(SurfaceEventKind::WindowStateChanged);
                Ok(true)
            }
        }
    }

    fn release(&self) {
        let mut state = self.shared.state();
        state.live_handles = state.live_handles.saturating_sub(1);
    }

    fn clone_box(&self) -> Box<dyn UIElementImpl> {
        {
            let mut state = self.shared.state();
            state.live_handles += 1;
            state.acquired += 1;
        }
        Box::new(MemoryElement::new(
            self.shared.clone(),
            self.generation,
            self.index,
        ))
    }
}
