use crate::element::UIElement;
use crate::errors::{AutomationError, TelephonyError};
use crate::telephony::{DialIntent, SimCard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// System-wide actions that do not target an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalAction {
    Back,
    Home,
}

/// Synthetic pointer gesture. `Nudge` is an empty stroke whose only purpose is
/// to wake a surface that ignored a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gesture {
    Nudge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceEventKind {
    WindowStateChanged,
    WindowContentChanged,
    Other,
}

/// Notification that the visible tree changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceEvent {
    pub kind: SurfaceEventKind,
    pub package_name: Option<String>,
}

impl SurfaceEvent {
    pub fn new(kind: SurfaceEventKind, package_name: Option<&str>) -> Self {
        Self {
            kind,
            package_name: package_name.map(str::to_string),
        }
    }

    pub fn is_window_change(&self) -> bool {
        matches!(
            self.kind,
            SurfaceEventKind::WindowStateChanged | SurfaceEventKind::WindowContentChanged
        )
    }
}

/// Read access to the visible element tree plus element-independent actions.
pub trait AccessibilityEngine: Send + Sync {
    /// Root of the active window, or `None` when no window is shown. The
    /// returned handle is released when dropped.
    fn root_in_active_window(&self) -> Option<UIElement>;

    fn perform_global_action(&self, action: GlobalAction) -> Result<bool, AutomationError>;

    fn dispatch_gesture(&self, gesture: Gesture) -> Result<bool, AutomationError>;
}

/// Places calls and reads SIM information.
#[async_trait::async_trait]
pub trait Telephony: Send + Sync {
    /// Issue the call that opens the USSD dialog.
    fn dial(&self, intent: &DialIntent) -> Result<(), TelephonyError>;

    /// Whether `send_ussd_request` can read responses directly.
    fn supports_ussd_api(&self) -> bool;

    async fn send_ussd_request(
        &self,
        code: &str,
        subscription_id: Option<i32>,
    ) -> Result<String, TelephonyError>;

    fn sim_cards(&self) -> Result<Vec<SimCard>, TelephonyError>;
}

/// Permission checks and the settings screens that grant them.
pub trait SystemSettings: Send + Sync {
    fn is_accessibility_enabled(&self) -> bool;
    fn is_overlay_permission_granted(&self) -> bool;
    fn open_accessibility_settings(&self);
    fn open_overlay_settings(&self);
}

/// The transient screen shown to the user while a session runs.
pub trait Overlay: Send + Sync {
    fn show(&self, message: &str);
    fn hide(&self);
}

/// The collaborators a launcher needs, bundled.
#[derive(Clone)]
pub struct Platform {
    pub engine: Arc<dyn AccessibilityEngine>,
    pub telephony: Arc<dyn Telephony>,
    pub settings: Arc<dyn SystemSettings>,
    pub overlay: Option<Arc<dyn Overlay>>,
}

pub mod memory;
