//! Scripted multi-step USSD sessions driven through an accessibility tree
//!
//! A USSD session shows up as a series of modal dialogs that can only be
//! observed as an element tree and driven with clicks and text input. This
//! crate dials the code, waits for each dialog to settle, types the next
//! scripted reply, verifies it, confirms it, and reports every distinct
//! dialog message along the way.

use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub mod bridge;
pub mod config;
pub mod element;
pub mod errors;
pub mod events;
pub mod executor;
pub mod extractor;
pub mod keywords;
pub mod locator;
pub mod platforms;
mod runtime;
pub mod selector;
pub mod session;
pub mod telephony;
pub mod timer;

pub use bridge::MethodCallBridge;
pub use config::{BackoffPolicy, ReplyClassification, SessionConfig, TimingOverrides};
pub use element::{UIElement, UIElementAttributes, UINode};
pub use errors::{AutomationError, BridgeError, TelephonyError, UssdError};
pub use events::UssdEvent;
pub use locator::Locator;
pub use platforms::{Platform, SurfaceEvent, SurfaceEventKind};
pub use selector::Selector;
pub use session::{SessionReport, SessionRequest, SessionState, SkippedReply};
pub use telephony::{DialIntent, SimCard, UssdResponse};

use events::EventBus;
use runtime::{Command, EventLoop, Outcome};

/// A running multi-step session.
///
/// Intermediate dialog messages arrive on [`next_message`](Self::next_message);
/// [`wait`](Self::wait) resolves once the session reaches a terminal state.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: Uuid,
    messages: mpsc::UnboundedReceiver<String>,
    outcome: oneshot::Receiver<Outcome>,
}

impl SessionHandle {
    /// Next distinct dialog message, or `None` once the session is over and
    /// every message has been read.
    pub async fn next_message(&mut self) -> Option<String> {
        self.messages.recv().await
    }

    /// Messages already delivered and not yet read.
    pub fn drain_messages(&mut self) -> Vec<String> {
        let mut drained = Vec::new();
        while let Ok(message) = self.messages.try_recv() {
            drained.push(message);
        }
        drained
    }

    pub async fn wait(self) -> Result<SessionReport, UssdError> {
        self.outcome.await.unwrap_or_else(|_| {
            Err(UssdError::SessionEndError(
                "event loop stopped before the session ended".to_string(),
            ))
        })
    }
}

struct Inner {
    platform: Platform,
    defaults: SessionConfig,
    commands: mpsc::UnboundedSender<Command>,
    bus: EventBus,
    shutdown: CancellationToken,
    /// Cancellation token of the most recently started session.
    active: Mutex<Option<CancellationToken>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// The main entry point: one launcher owns one event loop and therefore at
/// most one active session. Cheap to clone.
#[derive(Clone)]
pub struct UssdLauncher {
    inner: Arc<Inner>,
}

impl UssdLauncher {
    /// Spawns the session event loop, so it must be called inside a tokio runtime.
    #[instrument(skip_all)]
    pub fn new(platform: Platform, defaults: SessionConfig) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let bus = EventBus::default();
        let shutdown = CancellationToken::new();
        let event_loop = EventLoop::new(
            platform.clone(),
            bus.clone(),
            rx,
            shutdown.clone(),
            defaults.input_settle(),
        );
        tokio::spawn(event_loop.run());
        Self {
            inner: Arc::new(Inner {
                platform,
                defaults,
                commands,
                bus,
                shutdown,
                active: Mutex::new(None),
            }),
        }
    }

    pub fn defaults(&self) -> &SessionConfig {
        &self.inner.defaults
    }

    /// A session request carrying this launcher's default configuration.
    pub fn request(&self, code: &str, slot: i32, options: Vec<String>) -> SessionRequest {
        SessionRequest::new(code, slot, options).with_config(self.inner.defaults.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UssdEvent> {
        self.inner.bus.subscribe()
    }

    /// Feed one surface notification to the event loop.
    pub fn notify(&self, event: SurfaceEvent) {
        if self.inner.commands.send(Command::Surface(event)).is_err() {
            debug!("Event loop gone, dropping surface notification");
        }
    }

    /// Forward every notification from `events` until the launcher is dropped
    /// or the sender side closes.
    pub fn forward_events(&self, mut events: broadcast::Receiver<SurfaceEvent>) -> JoinHandle<()> {
        let commands = self.inner.commands.clone();
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(event) => {
                        if commands.send(Command::Surface(event)).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Surface notifications lagged, {} dropped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Surface notification forwarding stopped");
        })
    }

    fn require_accessibility(&self) -> Result<(), UssdError> {
        let settings = &self.inner.platform.settings;
        if settings.is_accessibility_enabled() {
            return Ok(());
        }
        warn!("Accessibility service disabled, opening settings");
        settings.open_accessibility_settings();
        Err(UssdError::AccessibilityNotEnabled)
    }

    /// One-shot request. Uses the telephony API when it can read responses
    /// directly, otherwise dials and lets the dialog surface through
    /// notifications.
    #[instrument(skip(self))]
    pub async fn send_ussd_request(
        &self,
        code: &str,
        subscription_id: Option<i32>,
    ) -> Result<UssdResponse, UssdError> {
        self.require_accessibility()?;
        if code.trim().is_empty() {
            return Err(UssdError::InvalidArgument(
                "USSD code must not be empty".to_string(),
            ));
        }

        let telephony = &self.inner.platform.telephony;
        if telephony.supports_ussd_api() {
            let response = telephony
                .send_ussd_request(code.trim(), subscription_id)
                .await?;
            info!("USSD response received ({} chars)", response.chars().count());
            return Ok(UssdResponse::Response(response));
        }

        // A subscription id is not a slot index; the call path leaves SIM
        // selection to the dialer.
        let intent = DialIntent::unrouted(code.trim());
        telephony.dial(&intent).map_err(|e| match e {
            TelephonyError::PermissionDenied(msg) => UssdError::PermissionDenied(msg),
            other => UssdError::UssdFailed(other.to_string()),
        })?;
        info!("Dialed {} through the call path", intent.uri);
        Ok(UssdResponse::InitiatedLegacy)
    }

    /// Start a multi-step session. Any session already running is cancelled.
    #[instrument(skip(self, request), fields(code = %request.code, slot = request.slot))]
    pub async fn multisession_ussd(
        &self,
        request: SessionRequest,
    ) -> Result<SessionHandle, UssdError> {
        self.require_accessibility()?;

        let settings = &self.inner.platform.settings;
        if request.overlay_message.is_some() && !settings.is_overlay_permission_granted() {
            warn!("Overlay permission missing, continuing without the overlay");
            settings.open_overlay_settings();
        }

        let cancel = CancellationToken::new();
        let (messages_tx, messages) = mpsc::unbounded_channel();
        let (outcome_tx, outcome) = oneshot::channel();
        let (started_tx, started) = oneshot::channel();
        self.send(Command::Start {
            request,
            cancel: cancel.clone(),
            messages: messages_tx,
            outcome: outcome_tx,
            started: started_tx,
        })?;
        let id = started.await.map_err(|_| loop_gone())??;

        if let Ok(mut active) = self.inner.active.lock() {
            *active = Some(cancel);
        }
        Ok(SessionHandle {
            id,
            messages,
            outcome,
        })
    }

    /// Cancel the active session. The session's token is tripped before the
    /// request reaches the event loop, so an in-flight attempt stops at its
    /// next step.
    #[instrument(skip(self))]
    pub async fn cancel_session(&self) -> Result<(), UssdError> {
        let token = self.inner.active.lock().ok().and_then(|mut a| a.take());
        if let Some(token) = token {
            token.cancel();
        }
        let (ack, rx) = oneshot::channel();
        self.send(Command::Cancel { ack })?;
        rx.await.map_err(|_| loop_gone())?
    }

    /// Append a reply to the active session's queue.
    #[instrument(skip(self, text))]
    pub async fn send_message(&self, text: &str) -> Result<(), UssdError> {
        let (ack, rx) = oneshot::channel();
        self.send(Command::SendMessage {
            text: text.to_string(),
            ack,
        })?;
        rx.await.map_err(|_| loop_gone())?
    }

    pub fn is_accessibility_enabled(&self) -> bool {
        self.inner.platform.settings.is_accessibility_enabled()
    }

    pub fn is_overlay_permission_granted(&self) -> bool {
        self.inner.platform.settings.is_overlay_permission_granted()
    }

    pub fn open_accessibility_settings(&self) {
        self.inner.platform.settings.open_accessibility_settings();
    }

    pub fn open_overlay_settings(&self) {
        self.inner.platform.settings.open_overlay_settings();
    }

    #[instrument(skip(self))]
    pub fn get_sim_cards(&self) -> Result<Vec<SimCard>, UssdError> {
        Ok(self.inner.platform.telephony.sim_cards()?)
    }

    fn send(&self, command: Command) -> Result<(), UssdError> {
        self.inner.commands.send(command).map_err(|_| loop_gone())
    }
}

fn loop_gone() -> UssdError {
    UssdError::SessionEndError("event loop is not running".to_string())
}
