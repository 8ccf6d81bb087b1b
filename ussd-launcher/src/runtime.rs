//! The single task that owns the active session.
//!
//! Commands from the controller, surface notifications and timer expiries are
//! handled one at a time, so nothing here needs a lock.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::errors::UssdError;
use crate::events::{EventBus, UssdEvent};
use crate::executor::{AttemptOutcome, ReplyExecutor};
use crate::extractor::{self, MessageDeduplicator};
use crate::keywords;
use crate::platforms::{Platform, SurfaceEvent};
use crate::session::{Session, SessionReport, SessionRequest, SessionState};
use crate::telephony::DialIntent;
use crate::timer::{TimerKind, Timers};

pub(crate) type Outcome = Result<SessionReport, UssdError>;

pub(crate) enum Command {
    Start {
        request: SessionRequest,
        cancel: CancellationToken,
        messages: mpsc::UnboundedSender<String>,
        outcome: oneshot::Sender<Outcome>,
        started: oneshot::Sender<Result<Uuid, UssdError>>,
    },
    Cancel {
        ack: oneshot::Sender<Result<(), UssdError>>,
    },
    SendMessage {
        text: String,
        ack: oneshot::Sender<Result<(), UssdError>>,
    },
    Surface(SurfaceEvent),
}

enum LoopEvent {
    Command(Command),
    Timer(TimerKind),
}

fn transition(bus: &EventBus, session: &mut Session, to: SessionState) {
    if session.state == to {
        return;
    }
    debug!("Session {}: {} -> {}", session.id, session.state, to);
    bus.publish(UssdEvent::SessionStateChanged {
        session_id: session.id,
        from: session.state,
        to,
    });
    session.state = to;
}

/// Checks a session start performs before anything is dialed or superseded.
fn check_request(request: &SessionRequest) -> Result<(), UssdError> {
    if request.code.trim().is_empty() {
        return Err(UssdError::EmptyUssdCode);
    }
    request.classification.validate()?;
    request.config.validate()
}

pub(crate) struct EventLoop {
    platform: Platform,
    executor: ReplyExecutor,
    session: Option<Session>,
    /// Deduplicates messages seen while no session is active.
    monitor: MessageDeduplicator,
    timers: Timers,
    bus: EventBus,
    commands: mpsc::UnboundedReceiver<Command>,
    shutdown: CancellationToken,
}

impl EventLoop {
    pub(crate) fn new(
        platform: Platform,
        bus: EventBus,
        commands: mpsc::UnboundedReceiver<Command>,
        shutdown: CancellationToken,
        input_settle: Duration,
    ) -> Self {
        Self {
            executor: ReplyExecutor::new(platform.engine.clone(), input_settle),
            platform,
            session: None,
            monitor: MessageDeduplicator::new(),
            timers: Timers::new(),
            bus,
            commands,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("USSD event loop started");
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => LoopEvent::Command(command),
                    None => break,
                },
                kind = self.timers.next_expired() => LoopEvent::Timer(kind),
            };
            match event {
                LoopEvent::Command(command) => self.handle_command(command),
                LoopEvent::Timer(TimerKind::RetryTick) => self.on_tick().await,
                LoopEvent::Timer(TimerKind::ConfirmClick) => self.on_confirm(),
                LoopEvent::Timer(TimerKind::CompletionGrace) => self.on_completion(),
            }
        }
        if self.session.is_some() {
            info!("Event loop shutting down, cancelling the active session");
            self.finish(SessionState::Cancelled, None);
        }
        debug!("USSD event loop stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start {
                request,
                cancel,
                messages,
                outcome,
                started,
            } => {
                let result = self.start(request, cancel, messages, outcome);
                let _ = started.send(result);
            }
            Command::Cancel { ack } => {
                let _ = ack.send(self.cancel());
            }
            Command::SendMessage { text, ack } => {
                let _ = ack.send(self.append_reply(text));
            }
            Command::Surface(event) => self.on_surface(event),
        }
    }

    #[instrument(level = "info", skip_all, fields(code = %request.code, slot = request.slot))]
    fn start(
        &mut self,
        request: SessionRequest,
        cancel: CancellationToken,
        messages: mpsc::UnboundedSender<String>,
        outcome: oneshot::Sender<Outcome>,
    ) -> Result<Uuid, UssdError> {
        if let Err(e) = check_request(&request) {
            error!("Refusing to start session: {}", e);
            let mut rejected = Session::new(request, cancel, messages, outcome);
            transition(&self.bus, &mut rejected, SessionState::Failed);
            rejected.wind_down();
            let report = rejected.report();
            self.bus.publish(UssdEvent::SessionFinished(report));
            if let Some(outcome) = rejected.outcome.take() {
                let _ = outcome.send(Err(e.clone()));
            }
            return Err(e);
        }

        if self.session.is_some() {
            info!("New session supersedes the active one");
            self.finish(SessionState::Cancelled, None);
        }

        self.executor =
            ReplyExecutor::new(self.platform.engine.clone(), request.config.input_settle());
        let mut session = Session::new(request, cancel, messages, outcome);
        let id = session.id;
        info!(
            "Starting session {} with {} queued replies",
            id,
            session.queue.len()
        );

        if let (Some(text), Some(overlay)) = (&session.overlay_message, &self.platform.overlay) {
            if self.platform.settings.is_overlay_permission_granted() {
                overlay.show(text);
            }
        }

        transition(&self.bus, &mut session, SessionState::Dialing);
        let intent = DialIntent::new(session.code.trim(), session.slot);
        let initial_delay = session.config.initial_delay();
        self.session = Some(session);

        if let Err(e) = self.platform.telephony.dial(&intent) {
            error!("Dialing {} failed: {}", intent.uri, e);
            self.finish(SessionState::Failed, Some(UssdError::DialError(e.to_string())));
            return Ok(id);
        }

        if let Some(session) = self.session.as_mut() {
            transition(&self.bus, session, SessionState::AwaitingDialog);
            session.quiet_until = Some(Instant::now() + initial_delay);
        }
        self.timers.schedule(TimerKind::RetryTick, initial_delay);
        Ok(id)
    }

    fn cancel(&mut self) -> Result<(), UssdError> {
        let Some(session) = self.session.as_mut() else {
            return Err(UssdError::NoActiveSession);
        };
        // No timer may fire once cancellation is requested.
        session.cancel.cancel();
        self.timers.clear();
        session.wind_down();
        info!("Cancelling session {}", session.id);

        let dismissal = self.executor.dismiss();
        self.finish(SessionState::Cancelled, None);
        match dismissal {
            Ok(method) => {
                debug!("Cancel dismissal: {:?}", method);
                Ok(())
            }
            Err(e) => {
                warn!("Dismissal after cancel failed: {}", e);
                Err(UssdError::CancelError(e.to_string()))
            }
        }
    }

    fn append_reply(&mut self, text: String) -> Result<(), UssdError> {
        let Some(session) = self.session.as_mut() else {
            return Err(UssdError::NoActiveSession);
        };
        debug!("Appending reply to session {}", session.id);
        session.queue.push_back(text);
        if self.timers.is_pending(TimerKind::CompletionGrace) {
            self.timers.cancel(TimerKind::CompletionGrace);
            self.timers.schedule(TimerKind::RetryTick, Duration::ZERO);
        }
        Ok(())
    }

    /// Push `text` upward unless it is filler or repeats the last report.
    fn report_message(&mut self, text: String) {
        if !extractor::is_reportable(&text) {
            return;
        }
        match self.session.as_mut() {
            Some(session) => {
                if !session.dedup.offer(&text) {
                    return;
                }
                info!("Session {} received: {:?}", session.id, text);
                let _ = session.messages.send(text.clone());
                self.bus.publish(UssdEvent::MessageReceived {
                    session_id: Some(session.id),
                    text,
                });
            }
            None => {
                if !self.monitor.offer(&text) {
                    return;
                }
                info!("USSD message received: {:?}", text);
                self.bus.publish(UssdEvent::MessageReceived {
                    session_id: None,
                    text,
                });
            }
        }
    }

    fn on_surface(&mut self, event: SurfaceEvent) {
        if !event.is_window_change() || !keywords::is_ussd_package(event.package_name.as_deref()) {
            return;
        }
        if let Some(message) = self.executor.read_message() {
            self.report_message(message);
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let waiting = matches!(
            session.state,
            SessionState::AwaitingDialog | SessionState::AwaitingNextDialog
        );
        if !waiting || session.queue.is_empty() || session.pending_confirm.is_some() {
            return;
        }

        let now = Instant::now();
        let Ok(dialog) = self.executor.check_ready() else {
            return;
        };
        let fingerprint = dialog.message.clone();
        drop(dialog);
        if !session.observe_dialog(fingerprint, now) {
            // Same dialog, window already running: the pending tick covers it.
            return;
        }
        if session.quiet_until.map_or(true, |quiet| now >= quiet) {
            let window = session.config.stability_window();
            if self
                .timers
                .schedule_no_later_than(TimerKind::RetryTick, window)
            {
                debug!("Dialog detected, next tick in {:?}", window);
            }
        }
    }

    async fn on_tick(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(reply) = session.head().map(str::to_string) else {
            let grace = session.config.completion_grace();
            self.timers.schedule(TimerKind::CompletionGrace, grace);
            return;
        };

        let now = Instant::now();
        let dialog = match self.executor.check_ready() {
            Ok(dialog) => dialog,
            Err(reason) => {
                self.retry(reason.describe(), Duration::ZERO);
                return;
            }
        };
        let fingerprint = dialog.message.clone();
        drop(dialog);
        if let Some(message) = fingerprint.clone() {
            self.report_message(message);
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let had_dialog = session.stability.is_some();
        if session.observe_dialog(fingerprint, now) && had_dialog {
            let window = session.config.stability_window();
            self.retry("dialog content changed", window);
            return;
        }
        if !session.is_stable(now) {
            let since = session.stability.as_ref().map(|s| s.since).unwrap_or(now);
            let remaining = session
                .config
                .stability_window()
                .saturating_sub(now.saturating_duration_since(since));
            debug!("Waiting {:?} for the dialog to settle", remaining);
            self.timers.schedule(TimerKind::RetryTick, remaining);
            return;
        }

        transition(&self.bus, session, SessionState::Replying);
        let cancel = session.cancel.clone();
        let outcome = self.executor.attempt(&reply, &cancel).await;

        let Some(session) = self.session.as_mut() else {
            return;
        };
        match outcome {
            Ok(AttemptOutcome::Verified { confirm }) => {
                session.commit();
                info!(
                    "Session {}: reply {} verified ({:?})",
                    session.id, session.step_index, reply
                );
                session.pending_confirm = Some(confirm);
                transition(&self.bus, session, SessionState::AwaitingNextDialog);
                let settle = session.config.confirm_settle();
                self.timers.schedule(TimerKind::ConfirmClick, settle);
            }
            Ok(AttemptOutcome::Mismatch { observed }) => {
                self.retry(&format!("verification read back {observed:?}"), Duration::ZERO);
            }
            Ok(AttemptOutcome::NotReady(reason)) => {
                self.retry(reason.describe(), Duration::ZERO);
            }
            Ok(AttemptOutcome::Cancelled) => {
                debug!("Attempt interrupted by cancellation");
            }
            Err(e) => {
                session.hard_errors += 1;
                session.last_error = Some(e.to_string());
                self.retry(&e.to_string(), Duration::ZERO);
            }
        }
    }

    /// Count a failed attempt for the head reply and either reschedule with
    /// backoff or give up on that reply.
    fn retry(&mut self, reason: &str, min_delay: Duration) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.retry_count += 1;
        debug!(
            "Session {}: attempt {}/{} not done: {}",
            session.id, session.retry_count, session.config.max_retries, reason
        );

        if session.retry_count < session.config.max_retries {
            transition(&self.bus, session, SessionState::AwaitingDialog);
            let delay = session
                .config
                .backoff
                .delay_for(session.retry_count)
                .max(min_delay);
            self.timers.schedule(TimerKind::RetryTick, delay);
            return;
        }

        if session.hard_errors == session.retry_count {
            let detail = session
                .last_error
                .clone()
                .unwrap_or_else(|| reason.to_string());
            error!("Session {}: every attempt failed: {}", session.id, detail);
            self.finish(SessionState::Failed, Some(UssdError::SendOptionError(detail)));
            return;
        }

        if let Some(skipped) = session.skip_head() {
            warn!(
                "Session {}: skipping reply {:?} after {} attempts",
                session.id, skipped.value, skipped.attempts
            );
        }
        transition(&self.bus, session, SessionState::AwaitingDialog);
        if session.queue.is_empty() {
            let grace = session.config.completion_grace();
            self.timers.schedule(TimerKind::CompletionGrace, grace);
        } else {
            let delay = session.config.backoff.delay_for(0);
            self.timers.schedule(TimerKind::RetryTick, delay);
        }
    }

    fn on_confirm(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let stored = session.pending_confirm.take();
        let result = self.executor.confirm(stored, &session.cancel);
        if result.clicked() {
            info!(
                "Session {}: confirmed via {:?} ({})",
                session.id, result.method, result.details
            );
        } else {
            warn!(
                "Session {}: confirm click not delivered ({:?}: {})",
                session.id, result.method, result.details
            );
        }

        if session.queue.is_empty() {
            let grace = session.config.completion_grace();
            self.timers.schedule(TimerKind::CompletionGrace, grace);
        } else {
            let delay = session.config.option_delay();
            session.quiet_until = Some(Instant::now() + delay);
            self.timers.schedule(TimerKind::RetryTick, delay);
        }
    }

    fn on_completion(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if !session.queue.is_empty() {
            self.timers.schedule(TimerKind::RetryTick, Duration::ZERO);
            return;
        }
        let dismiss = session.config.dismiss_on_complete;

        if let Some(message) = self.executor.read_message() {
            self.report_message(message);
        }

        if dismiss {
            if let Err(e) = self.executor.dismiss() {
                error!("Closing the final dialog failed: {}", e);
                self.finish(
                    SessionState::Failed,
                    Some(UssdError::SessionEndError(e.to_string())),
                );
                return;
            }
        }
        self.finish(SessionState::Completed, None);
    }

    /// Move the active session to a terminal state and resolve its outcome.
    fn finish(&mut self, state: SessionState, error: Option<UssdError>) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.timers.clear();
        transition(&self.bus, &mut session, state);
        session.wind_down();

        if session.overlay_message.is_some() {
            if let Some(overlay) = &self.platform.overlay {
                overlay.hide();
            }
        }

        let report = session.report();
        info!(
            "Session {} {}: {} delivered, {} skipped",
            report.session_id,
            report.state,
            report.steps_delivered,
            report.skipped.len()
        );
        self.monitor.reset();
        if let Some(last) = session.dedup.last() {
            self.monitor.offer(last);
        }
        self.bus.publish(UssdEvent::SessionFinished(report.clone()));

        if let Some(outcome) = session.outcome.take() {
            let _ = outcome.send(match error {
                Some(e) => Err(e),
                None => Ok(report),
            });
        }
    }
}
