//! Scripted platform used by tests and the `ussd` command line tool.

mod element;
mod engine;
mod host;

pub use element::MemoryElement;
pub use engine::{ClickEffect, MemoryEngine, RecordedAction, Screen, DEFAULT_PACKAGE};
pub use host::{MemoryOverlay, MemorySettings, MemoryTelephony};

use std::sync::Arc;

use super::Platform;

/// Concrete handles to every scripted collaborator, so callers can both hand
/// out a [`Platform`] and inspect what happened afterwards.
#[derive(Clone)]
pub struct MemoryPlatform {
    pub engine: MemoryEngine,
    pub telephony: Arc<MemoryTelephony>,
    pub settings: Arc<MemorySettings>,
    pub overlay: Arc<MemoryOverlay>,
}

impl MemoryPlatform {
    pub fn new(screens: Vec<Screen>) -> Self {
        let engine = MemoryEngine::with_screens(screens);
        Self {
            telephony: Arc::new(MemoryTelephony::new(engine.clone())),
            settings: Arc::new(MemorySettings::default()),
            overlay: Arc::new(MemoryOverlay::default()),
            engine,
        }
    }

    pub fn platform(&self) -> Platform {
        Platform {
            engine: Arc::new(self.engine.clone()),
            telephony: self.telephony.clone(),
            settings: self.settings.clone(),
            overlay: Some(self.overlay.clone()),
        }
    }
}
