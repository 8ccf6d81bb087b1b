use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{ReplyClassification, SessionConfig};
use crate::element::UIElement;
use crate::errors::UssdError;
use crate::extractor::MessageDeduplicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Idle,
    Dialing,
    AwaitingDialog,
    Replying,
    AwaitingNextDialog,
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Dialing => "dialing",
            SessionState::AwaitingDialog => "awaiting dialog",
            SessionState::Replying => "replying",
            SessionState::AwaitingNextDialog => "awaiting next dialog",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A reply dropped after its retries ran out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedReply {
    pub value: String,
    pub attempts: u32,
}

/// What a finished session produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: Uuid,
    pub state: SessionState,
    pub steps_delivered: usize,
    pub delivered: Vec<String>,
    pub skipped: Vec<SkippedReply>,
    pub final_message: Option<String>,
}

/// Everything needed to start a multi-step session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub code: String,
    pub slot: i32,
    pub options: Vec<String>,
    pub config: SessionConfig,
    pub classification: ReplyClassification,
    pub overlay_message: Option<String>,
}

impl SessionRequest {
    pub fn new(code: &str, slot: i32, options: Vec<String>) -> Self {
        Self {
            code: code.to_string(),
            slot,
            options,
            config: SessionConfig::default(),
            classification: ReplyClassification::default(),
            overlay_message: None,
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_classification(mut self, classification: ReplyClassification) -> Self {
        self.classification = classification;
        self
    }

    pub fn with_overlay(mut self, message: &str) -> Self {
        self.overlay_message = Some(message.to_string());
        self
    }
}

/// First sighting of the dialog content currently being waited on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogStability {
    pub since: Instant,
    pub fingerprint: Option<String>,
}

/// One scripted USSD interaction. Owned and mutated only by the event loop.
pub struct Session {
    pub id: Uuid,
    pub code: String,
    pub slot: i32,
    pub config: SessionConfig,
    pub classification: ReplyClassification,
    pub overlay_message: Option<String>,
    pub state: SessionState,
    pub queue: VecDeque<String>,
    pub step_index: usize,
    pub retry_count: u32,
    /// Attempts for the current reply that ended in an engine error.
    pub hard_errors: u32,
    pub last_error: Option<String>,
    pub dedup: MessageDeduplicator,
    pub stability: Option<DialogStability>,
    /// Confirm control located by the last verified attempt, kept for the click.
    pub pending_confirm: Option<UIElement>,
    /// Notifications before this instant do not pull the next tick forward.
    pub quiet_until: Option<Instant>,
    pub delivered: Vec<String>,
    pub skipped: Vec<SkippedReply>,
    pub cancel: CancellationToken,
    pub messages: mpsc::UnboundedSender<String>,
    pub outcome: Option<oneshot::Sender<Result<SessionReport, UssdError>>>,
}

impl Session {
    pub fn new(
        request: SessionRequest,
        cancel: CancellationToken,
        messages: mpsc::UnboundedSender<String>,
        outcome: oneshot::Sender<Result<SessionReport, UssdError>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: request.code,
            slot: request.slot,
            config: request.config,
            classification: request.classification,
            overlay_message: request.overlay_message,
            state: SessionState::Idle,
            queue: request.options.into_iter().collect(),
            step_index: 0,
            retry_count: 0,
            hard_errors: 0,
            last_error: None,
            dedup: MessageDeduplicator::new(),
            stability: None,
            pending_confirm: None,
            quiet_until: None,
            delivered: Vec::new(),
            skipped: Vec::new(),
            cancel,
            messages,
            outcome: Some(outcome),
        }
    }

    pub fn head(&self) -> Option<&str> {
        self.queue.front().map(String::as_str)
    }

    /// Pop the verified head reply and start the next one from scratch.
    pub fn commit(&mut self) -> Option<String> {
        let reply = self.queue.pop_front()?;
        self.step_index += 1;
        self.retry_count = 0;
        self.hard_errors = 0;
        self.last_error = None;
        self.stability = None;
        self.delivered.push(reply.clone());
        Some(reply)
    }

    /// Drop the head reply after its retries ran out.
    pub fn skip_head(&mut self) -> Option<SkippedReply> {
        let value = self.queue.pop_front()?;
        let skipped = SkippedReply {
            value,
            attempts: self.retry_count,
        };
        self.retry_count = 0;
        self.hard_errors = 0;
        self.last_error = None;
        self.stability = None;
        self.skipped.push(skipped.clone());
        Some(skipped)
    }

    /// Record `fingerprint` as the dialog being waited on. Returns `true` when
    /// it differs from what was recorded, which restarts the window.
    pub fn observe_dialog(&mut self, fingerprint: Option<String>, now: Instant) -> bool {
        match &self.stability {
            Some(current) if current.fingerprint == fingerprint => false,
            _ => {
                self.stability = Some(DialogStability {
                    since: now,
                    fingerprint,
                });
                true
            }
        }
    }

    /// Whether the dialog has kept the same content for the whole window.
    pub fn is_stable(&self, now: Instant) -> bool {
        self.stability
            .as_ref()
            .map(|s| now.saturating_duration_since(s.since) >= self.config.stability_window())
            .unwrap_or(false)
    }

    /// Stop everything still pending. Used on every terminal transition.
    pub fn wind_down(&mut self) {
        self.queue.clear();
        self.pending_confirm = None;
        self.stability = None;
        self.quiet_until = None;
        self.cancel.cancel();
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            session_id: self.id,
            state: self.state,
            steps_delivered: self.step_index,
            delivered: self.delivered.clone(),
            skipped: self.skipped.clone(),
            final_message: self.dedup.last().map(str::to_string),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("code", &self.code)
            .field("state", &self.state)
            .field("queue", &self.queue)
            .field("step_index", &self.step_index)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}
