#![allow(dead_code)]

use std::time::Duration;
use tokio::sync::broadcast;
use ussd_launcher::platforms::memory::{MemoryPlatform, Screen};
use ussd_launcher::{SessionConfig, UssdEvent, UssdLauncher};

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_target(true)
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub memory: MemoryPlatform,
    pub launcher: UssdLauncher,
}

impl Harness {
    pub fn new(screens: Vec<Screen>) -> Self {
        Self::with_config(screens, SessionConfig::default())
    }

    pub fn with_config(screens: Vec<Screen>, config: SessionConfig) -> Self {
        init_tracing();
        let memory = MemoryPlatform::new(screens);
        let launcher = UssdLauncher::new(memory.platform(), config);
        launcher.forward_events(memory.engine.subscribe());
        Self { memory, launcher }
    }
}

pub fn options(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Let the event loop drain whatever is queued. Time is paused in these
/// tests, so this also fires any timer due within `ms`.
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

pub fn drain(events: &mut broadcast::Receiver<UssdEvent>) -> Vec<UssdEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

pub fn received_texts(events: &[UssdEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            UssdEvent::MessageReceived { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}
