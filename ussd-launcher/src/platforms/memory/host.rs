//! Telephony, settings and overlay stand-ins that record what was asked of them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::info;

use super::engine::MemoryEngine;
use crate::errors::TelephonyError;
use crate::platforms::{Overlay, SystemSettings, Telephony};
use crate::telephony::{DialIntent, SimCard};

/// Dialing shows the engine's next scripted screen.
pub struct MemoryTelephony {
    engine: MemoryEngine,
    dialed: Mutex<Vec<DialIntent>>,
    dial_error: Mutex<Option<TelephonyError>>,
    /// `None` means the direct request API is unavailable.
    api_response: Mutex<Option<Result<String, TelephonyError>>>,
    sims: Mutex<Vec<SimCard>>,
}

impl MemoryTelephony {
    pub fn new(engine: MemoryEngine) -> Self {
        Self {
            engine,
            dialed: Mutex::new(Vec::new()),
            dial_error: Mutex::new(None),
            api_response: Mutex::new(None),
            sims: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_dial(&self, err: TelephonyError) {
        *self.dial_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(err);
    }

    pub fn respond_with(&self, response: Result<String, TelephonyError>) {
        *self.api_response.lock().unwrap_or_else(|e| e.into_inner()) = Some(response);
    }

    pub fn set_sim_cards(&self, sims: Vec<SimCard>) {
        *self.sims.lock().unwrap_or_else(|e| e.into_inner()) = sims;
    }

    pub fn dialed(&self) -> Vec<DialIntent> {
        self.dialed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl Telephony for MemoryTelephony {
    fn dial(&self, intent: &DialIntent) -> Result<(), TelephonyError> {
        self.dialed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(intent.clone());
        if let Some(err) = self
            .dial_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Err(err);
        }
        info!("Dialing {} (slot {:?})", intent.uri, intent.slot);
        self.engine.show_next();
        Ok(())
    }

    fn supports_ussd_api(&self) -> bool {
        self.api_response
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    async fn send_ussd_request(
        &self,
        code: &str,
        subscription_id: Option<i32>,
    ) -> Result<String, TelephonyError> {
        info!(
            "Direct USSD request {} (subscription {:?})",
            code, subscription_id
        );
        self.api_response
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_else(|| Err(TelephonyError::UnsupportedApi("direct USSD API".to_string())))
    }

    fn sim_cards(&self) -> Result<Vec<SimCard>, TelephonyError> {
        Ok(self.sims.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

/// Permission switches plus a log of settings screens opened.
pub struct MemorySettings {
    accessibility: AtomicBool,
    overlay: AtomicBool,
    opened: Mutex<Vec<&'static str>>,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            accessibility: AtomicBool::new(true),
            overlay: AtomicBool::new(true),
            opened: Mutex::new(Vec::new()),
        }
    }
}

impl MemorySettings {
    pub fn set_accessibility_enabled(&self, enabled: bool) {
        self.accessibility.store(enabled, Ordering::SeqCst);
    }

    pub fn set_overlay_granted(&self, granted: bool) {
        self.overlay.store(granted, Ordering::SeqCst);
    }

    /// Names of the settings screens opened so far.
    pub fn opened(&self) -> Vec<&'static str> {
        self.opened.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SystemSettings for MemorySettings {
    fn is_accessibility_enabled(&self) -> bool {
        self.accessibility.load(Ordering::SeqCst)
    }

    fn is_overlay_permission_granted(&self) -> bool {
        self.overlay.load(Ordering::SeqCst)
    }

    fn open_accessibility_settings(&self) {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push("accessibility");
    }

    fn open_overlay_settings(&self) {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push("overlay");
    }
}

#[derive(Default)]
pub struct MemoryOverlay {
    visible: AtomicBool,
    shown: Mutex<Vec<String>>,
}

impl MemoryOverlay {
    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Overlay for MemoryOverlay {
    fn show(&self, message: &str) {
        self.visible.store(true, Ordering::SeqCst);
        self.shown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }

    fn hide(&self) {
        self.visible.store(false, Ordering::SeqCst);
    }
}
