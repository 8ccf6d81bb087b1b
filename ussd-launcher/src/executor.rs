use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::extractor;
use crate::keywords::{self, LabelClass};
use crate::locator;
use crate::platforms::{AccessibilityEngine, Gesture, GlobalAction};

/// Why a snapshot is not yet safe to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReady {
    NoWindow,
    /// Input field, clickable button or text is missing.
    DialogIncomplete,
    InputNotInteractable,
    NoConfirmControl,
}

impl NotReady {
    pub fn describe(&self) -> &'static str {
        match self {
            NotReady::NoWindow => "no window",
            NotReady::DialogIncomplete => "dialog incomplete",
            NotReady::InputNotInteractable => "input not interactable",
            NotReady::NoConfirmControl => "no confirm control",
        }
    }
}

/// A dialog that passed every readiness check, with the handles needed to act on it.
#[derive(Debug)]
pub struct ReadyDialog {
    pub input: UIElement,
    pub confirm: UIElement,
    pub message: Option<String>,
}

#[derive(Debug)]
pub enum AttemptOutcome {
    /// The input field holds exactly the reply. The confirm control located
    /// during the readiness check is handed back for the delayed click.
    Verified { confirm: UIElement },
    Mismatch { observed: Option<String> },
    NotReady(NotReady),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMethod {
    StoredControl,
    RelocatedControl,
    AnyButton,
    KnownViewId,
    Gesture,
    Skipped,
    Exhausted,
}

/// Holds the result of a confirm click
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickResult {
    pub method: ClickMethod,
    pub details: String,
}

impl ClickResult {
    fn new(method: ClickMethod, details: impl Into<String>) -> Self {
        Self {
            method,
            details: details.into(),
        }
    }

    pub fn clicked(&self) -> bool {
        !matches!(self.method, ClickMethod::Skipped | ClickMethod::Exhausted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissMethod {
    CancelControl,
    Back,
    NothingShown,
}

fn clicked(element: &UIElement) -> bool {
    match element.click() {
        Ok(done) => done,
        Err(e) => {
            debug!("Click on {:?} failed: {}", element.label(), e);
            false
        }
    }
}

/// Drives one reply into the current dialog.
///
/// Every call starts from a fresh snapshot. Handles never outlive the call
/// that acquired them, except the confirm control which the caller keeps
/// until the confirm click.
pub struct ReplyExecutor {
    engine: Arc<dyn AccessibilityEngine>,
    input_settle: Duration,
}

impl ReplyExecutor {
    pub fn new(engine: Arc<dyn AccessibilityEngine>, input_settle: Duration) -> Self {
        Self {
            engine,
            input_settle,
        }
    }

    /// Current dialog text, if any window is shown.
    pub fn read_message(&self) -> Option<String> {
        let root = self.engine.root_in_active_window()?;
        extractor::extract_message(&root)
    }

    /// Readiness checks, in order: dialog shape, input interactable, confirm control.
    pub fn check_ready(&self) -> Result<ReadyDialog, NotReady> {
        let root = self.engine.root_in_active_window().ok_or(NotReady::NoWindow)?;

        let input = locator::find_first_input(&root);
        let has_button = !locator::find_clickable_buttons(&root).is_empty();
        let has_text = locator::has_text_content(&root);
        let input = match input {
            Some(input) if has_button && has_text => input,
            _ => return Err(NotReady::DialogIncomplete),
        };

        if !input.is_visible() || !input.is_enabled() {
            return Err(NotReady::InputNotInteractable);
        }

        let confirm = locator::find_confirm_control(&root).ok_or(NotReady::NoConfirmControl)?;
        let message = extractor::extract_message(&root);
        Ok(ReadyDialog {
            input,
            confirm,
            message,
        })
    }

    async fn settle(&self) {
        if !self.input_settle.is_zero() {
            tokio::time::sleep(self.input_settle).await;
        }
    }

    /// Focus, clear, set, then verify on a fresh snapshot.
    #[instrument(level = "debug", skip(self, cancel))]
    pub async fn attempt(
        &self,
        reply: &str,
        cancel: &CancellationToken,
    ) -> Result<AttemptOutcome, AutomationError> {
        let dialog = match self.check_ready() {
            Ok(dialog) => dialog,
            Err(reason) => return Ok(AttemptOutcome::NotReady(reason)),
        };
        let ReadyDialog { input, confirm, .. } = dialog;

        if cancel.is_cancelled() {
            return Ok(AttemptOutcome::Cancelled);
        }
        if !input.focus()? {
            debug!("Input field refused focus, setting text anyway");
        }
        self.settle().await;

        if cancel.is_cancelled() {
            return Ok(AttemptOutcome::Cancelled);
        }
        input.set_text("")?;
        self.settle().await;

        if cancel.is_cancelled() {
            return Ok(AttemptOutcome::Cancelled);
        }
        input.set_text(reply)?;
        self.settle().await;
        drop(input);

        let observed = self
            .engine
            .root_in_active_window()
            .and_then(|root| locator::find_first_input(&root))
            .and_then(|input| input.text());
        if observed.as_deref() != Some(reply) {
            debug!("Verification mismatch: expected {:?}, read {:?}", reply, observed);
            return Ok(AttemptOutcome::Mismatch { observed });
        }
        if cancel.is_cancelled() {
            return Ok(AttemptOutcome::Cancelled);
        }
        Ok(AttemptOutcome::Verified { confirm })
    }

    /// Click the confirm control, falling back through: a freshly located
    /// confirm control, any non-cancel button, well-known view ids and
    /// finally an empty gesture.
    #[instrument(level = "debug", skip(self, stored, cancel))]
    pub fn confirm(&self, stored: Option<UIElement>, cancel: &CancellationToken) -> ClickResult {
        if cancel.is_cancelled() {
            return ClickResult::new(ClickMethod::Skipped, "session cancelled");
        }

        if let Some(control) = stored {
            let label = control.label();
            if clicked(&control) {
                return ClickResult::new(ClickMethod::StoredControl, label);
            }
        }

        if let Some(root) = self.engine.root_in_active_window() {
            if let Some(control) = locator::find_confirm_control(&root) {
                let label = control.label();
                if clicked(&control) {
                    return ClickResult::new(ClickMethod::RelocatedControl, label);
                }
            }

            for button in locator::find_clickable_buttons(&root) {
                let label = button.label();
                if keywords::classify_label(&label) == LabelClass::Cancel {
                    continue;
                }
                if clicked(&button) {
                    return ClickResult::new(ClickMethod::AnyButton, label);
                }
            }

            for id in keywords::CONFIRM_VIEW_IDS {
                if let Some(control) = locator::find_by_view_id(&root, id) {
                    if clicked(&control) {
                        return ClickResult::new(ClickMethod::KnownViewId, *id);
                    }
                }
            }
        }

        match self.engine.dispatch_gesture(Gesture::Nudge) {
            Ok(true) => ClickResult::new(ClickMethod::Gesture, "nudge"),
            Ok(false) => {
                warn!("Every confirm fallback failed, gesture was not dispatched");
                ClickResult::new(ClickMethod::Exhausted, "gesture not dispatched")
            }
            Err(e) => {
                warn!("Every confirm fallback failed: {}", e);
                ClickResult::new(ClickMethod::Exhausted, e.to_string())
            }
        }
    }

    /// Close whatever dialog is shown: a cancel control if there is one, else Back.
    pub fn dismiss(&self) -> Result<DismissMethod, AutomationError> {
        let Some(root) = self.engine.root_in_active_window() else {
            return Ok(DismissMethod::NothingShown);
        };
        if let Some(control) = locator::find_cancel_control(&root) {
            let label = control.label();
            if control.click()? {
                info!("Dismissed dialog with {:?}", label);
                return Ok(DismissMethod::CancelControl);
            }
        }
        drop(root);
        self.engine.perform_global_action(GlobalAction::Back)?;
        info!("Dismissed dialog with Back");
        Ok(DismissMethod::Back)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{roles, UINode};
    use crate::platforms::memory::{ClickEffect, MemoryEngine, RecordedAction, Screen};

    fn executor(engine: &MemoryEngine) -> ReplyExecutor {
        ReplyExecutor::new(Arc::new(engine.clone()), Duration::ZERO)
    }

    #[test]
    fn test_not_ready_reasons() {
        let engine = MemoryEngine::new();
        assert_eq!(executor(&engine).check_ready().unwrap_err(), NotReady::NoWindow);

        let engine = MemoryEngine::with_tree(
            UINode::new(roles::FRAME).with_children(vec![UINode::text_view("Please wait")]),
        );
        assert_eq!(
            executor(&engine).check_ready().unwrap_err(),
            NotReady::DialogIncomplete
        );

        let engine = MemoryEngine::with_tree(UINode::new(roles::FRAME).with_children(vec![
            UINode::text_view("Menu"),
            UINode::input().disabled(),
            UINode::button("Send", None),
        ]));
        assert_eq!(
            executor(&engine).check_ready().unwrap_err(),
            NotReady::InputNotInteractable
        );

        let engine = MemoryEngine::with_tree(UINode::new(roles::FRAME).with_children(vec![
            UINode::text_view("Menu"),
            UINode::input(),
            UINode::button("Cancel", None),
        ]));
        assert_eq!(
            executor(&engine).check_ready().unwrap_err(),
            NotReady::NoConfirmControl
        );
        assert_eq!(engine.live_handles(), 0);
    }

    #[tokio::test]
    async fn test_attempt_verifies_injected_value() {
        let engine = MemoryEngine::with_screens(vec![Screen::prompt("1. Balance")]);
        engine.show_next();
        let exec = executor(&engine);
        let token = CancellationToken::new();

        let outcome = exec.attempt("1", &token).await.unwrap();
        let AttemptOutcome::Verified { confirm } = outcome else {
            panic!("expected verified, got {outcome:?}");
        };
        assert_eq!(confirm.label(), "Send");
        // Same dialog, before confirmation: the field reads back the reply.
        let root = engine.root_in_active_window().unwrap();
        let input = locator::find_first_input(&root).unwrap();
        assert_eq!(input.text().as_deref(), Some("1"));
        drop((root, input, confirm));
        assert_eq!(engine.live_handles(), 0);
    }

    #[tokio::test]
    async fn test_attempt_reports_mismatch() {
        let engine = MemoryEngine::with_screens(vec![Screen::prompt("Menu").rejecting_text()]);
        engine.show_next();
        let outcome = executor(&engine)
            .attempt("2", &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, AttemptOutcome::Mismatch { observed: None }));
    }

    #[tokio::test]
    async fn test_cancelled_attempt_touches_nothing() {
        let engine = MemoryEngine::with_screens(vec![Screen::prompt("Menu")]);
        engine.show_next();
        let token = CancellationToken::new();
        token.cancel();
        let outcome = executor(&engine).attempt("2", &token).await.unwrap();
        assert!(matches!(outcome, AttemptOutcome::Cancelled));
        assert!(engine.actions().is_empty());
    }

    #[test]
    fn test_confirm_falls_back_to_known_view_id() {
        // "Proceed" is unclassified and refuses clicks; the bare view-id node
        // is not a button and so only the view-id fallback reaches it.
        let tree = UINode::new(roles::FRAME).with_children(vec![
            UINode::text_view("Menu"),
            UINode::input(),
            UINode::button("Proceed", None),
            {
                let mut node = UINode::new(roles::LAYOUT).with_view_id("android:id/button1");
                node.attributes.clickable = true;
                node
            },
        ]);
        let engine = MemoryEngine::with_screens(vec![Screen::new(tree)
            .on_click("Proceed", ClickEffect::Refuse)
            .on_click("android:id/button1", ClickEffect::Dismiss)]);
        engine.show_next();
        let exec = executor(&engine);

        let result = exec.confirm(None, &CancellationToken::new());
        assert_eq!(result.method, ClickMethod::KnownViewId);
        assert!(!engine.is_showing());
    }

    #[test]
    fn test_confirm_ends_with_gesture() {
        let engine = MemoryEngine::new();
        let result = executor(&engine).confirm(None, &CancellationToken::new());
        assert_eq!(result.method, ClickMethod::Gesture);
        assert_eq!(
            engine.actions(),
            vec![RecordedAction::Gesture(Gesture::Nudge)]
        );
    }

    #[test]
    fn test_dismiss_prefers_cancel_control() {
        let engine = MemoryEngine::with_screens(vec![Screen::prompt("Menu")]);
        engine.show_next();
        assert_eq!(
            executor(&engine).dismiss().unwrap(),
            DismissMethod::CancelControl
        );
        assert!(!engine.is_showing());

        let engine = MemoryEngine::with_screens(vec![Screen::notice("Bye")]);
        engine.show_next();
        assert_eq!(executor(&engine).dismiss().unwrap(), DismissMethod::Back);
    }
}
