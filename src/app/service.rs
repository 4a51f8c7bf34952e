//! Application service: the hexagonal core.
//!
//! [`Controller`] owns the session FSM, the backend channel, the bin level
//! monitor and the alert surface.  Adapters feed it operator input and a
//! periodic tick; everything it has to say comes back out through the
//! [`EventSink`] port.
//!
//! ```text
//!  Operator ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!               │          Controller           │
//!  Backend ◀──▶ │  Channel · FSM · Bins · Alerts │ ──▶ OperatorView
//!               └──────────────────────────────┘
//! ```

use log::{debug, error, info, warn};

use crate::alerts::{AlertKind, AlertSurface};
use crate::bins::{Bin, BinLevelMonitor};
use crate::channel::messages::{InboundEvent, ServerMessageKind};
use crate::channel::transport::Transport;
use crate::channel::{ChannelEvent, ChannelManager, LinkState, ReconnectPolicy};
use crate::classify::{WasteCategory, classify};
use crate::config::SystemConfig;
use crate::dispatch::InFlight;
use crate::error::{ControlError, PolicyViolation};
use crate::fsm::context::{SessionContext, SessionState, StatusKind};
use crate::fsm::states::build_phase_table;
use crate::fsm::{CompletionSignal, Fsm, PhaseId, SessionInput};

use super::commands::{AppCommand, OperatorInput};
use super::events::ControllerEvent;
use super::ports::EventSink;
use super::view::{BinView, OperatorView, Prompt};

const MULTIPLE_WASTE_TEXT: &str = "Multiple waste detected!";

// ───────────────────────────────────────────────────────────────
// Controller
// ───────────────────────────────────────────────────────────────

/// The controller orchestrates all domain logic.
pub struct Controller<T: Transport> {
    fsm: Fsm,
    ctx: SessionContext,
    channel: ChannelManager<T>,
    bins: BinLevelMonitor,
    alerts: AlertSurface,
    /// Camera frames relayed by the backend since startup.
    frames_seen: u64,
    // Last values handed to the sink, so only changes are emitted.
    published_status: (StatusKind, String),
    published_link: LinkState,
}

impl<T: Transport> Controller<T> {
    /// Construct the controller from configuration.
    ///
    /// Does **not** start the session or open the link. Call [`start`](Self::start) next.
    pub fn new(config: SystemConfig, transport: T) -> Self {
        let channel = ChannelManager::new(transport, ReconnectPolicy::from_config(&config));
        let bins = BinLevelMonitor::new(config.bin_height_cm, config.bin_full_distance_cm);
        let alerts = AlertSurface::new(config.alert_dwell_ms);
        let fsm = Fsm::new(build_phase_table(), PhaseId::Idle);
        Self {
            fsm,
            ctx: SessionContext::new(config),
            channel,
            bins,
            alerts,
            frames_seen: 0,
            published_status: (StatusKind::Normal, String::new()),
            published_link: LinkState::Disconnected,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter Idle and open the backend link.  A failed connect is not
    /// fatal: the channel keeps retrying on [`tick`](Self::tick).
    pub fn start(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        self.ctx.now_ms = now_ms;
        self.fsm.start(&mut self.ctx);
        sink.emit(&ControllerEvent::Started(self.fsm.current_phase()));
        info!("Controller started in {:?}", self.fsm.current_phase());
        self.publish_status(sink);

        if let Err(e) = self.channel.connect(now_ms) {
            warn!("Initial connect failed: {}", e);
        }
        self.pump_channel(now_ms, sink);
    }

    /// Run one cycle: channel I/O → inbound events → completion timer →
    /// alert expiry.
    pub fn tick(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        self.pump_channel(now_ms, sink);
        // Timer-driven completion never carries a rejection.
        let _ = self.deliver(SessionInput::Tick, now_ms, sink);
        let expired = self.alerts.expire(now_ms);
        if expired > 0 {
            debug!("{} alert(s) expired", expired);
        }
    }

    /// Stop both streams, return to Idle and close the link.
    pub fn shutdown(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        info!("Controller shutting down");
        self.ctx.now_ms = now_ms;
        if self.channel.is_connected() {
            for result in [self.channel.end_detection(), self.channel.unsubscribe_telemetry()] {
                if let Err(e) = result {
                    warn!("Shutdown command not sent: {}", e);
                }
            }
        }
        self.force_idle(sink);
        self.channel.disconnect();
        // Shutdown is not a link loss; drop the Disconnected notification.
        let _ = self.channel.poll(now_ms);
        self.publish_link(sink);
        self.publish_status(sink);
    }

    // ── Command handling ──────────────────────────────────────

    /// Apply one operator action.  A refused action is reported both as an
    /// [`ControllerEvent::Error`] and as the return value.
    pub fn handle_operator(
        &mut self,
        input: OperatorInput,
        now_ms: u64,
        sink: &mut impl EventSink,
    ) -> Result<(), ControlError> {
        debug!("Operator input: {:?}", input);
        self.deliver(SessionInput::Operator(input), now_ms, sink)
            .map(|_| ())
    }

    /// Process an external command (console, UI, tests).
    pub fn handle_command(
        &mut self,
        command: AppCommand,
        now_ms: u64,
        sink: &mut impl EventSink,
    ) -> Result<(), ControlError> {
        match command {
            AppCommand::Operator(input) => self.handle_operator(input, now_ms, sink),
            AppCommand::Reconnect => {
                info!("Manual reconnect requested");
                let result = self.channel.connect(now_ms);
                self.pump_channel(now_ms, sink);
                result.map_err(ControlError::from)
            }
            AppCommand::UpdateConfig(config) => {
                config.validate()?;
                self.apply_config(config);
                info!("Configuration updated at runtime");
                Ok(())
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Snapshot of everything the operator screen shows.
    pub fn view(&self) -> OperatorView {
        let levels = self.bins.snapshot();
        let phase = self.fsm.current_phase();
        OperatorView {
            phase,
            status: self.ctx.status.as_str().to_string(),
            status_kind: self.ctx.status_kind,
            category: self.ctx.session.current_category,
            action_label: self.ctx.category().action_label(),
            confidence: self.ctx.session.last_confidence,
            last_detection_ms: self.ctx.session.last_detection_ms,
            link: self.channel.state(),
            link_connects: self.channel.connect_count(),
            frames_seen: self.frames_seen,
            bins: Bin::ALL.map(|bin| BinView {
                bin,
                pct: levels.level(bin),
                tier: self.bins.tier_of(bin),
            }),
            alerts: self.alerts.active().cloned().collect(),
            prompt: Prompt::for_phase(phase),
        }
    }

    pub fn phase(&self) -> PhaseId {
        self.fsm.current_phase()
    }

    pub fn session(&self) -> &SessionState {
        &self.ctx.session
    }

    /// The actuator command awaiting completion, if any.
    pub fn in_flight(&self) -> Option<InFlight> {
        self.ctx.dispatcher.in_flight()
    }

    pub fn status(&self) -> &str {
        self.ctx.status.as_str()
    }

    pub fn link_state(&self) -> LinkState {
        self.channel.state()
    }

    pub fn alerts(&self) -> &AlertSurface {
        &self.alerts
    }

    pub fn bins(&self) -> &BinLevelMonitor {
        &self.bins
    }

    pub fn config(&self) -> &SystemConfig {
        &self.ctx.config
    }

    pub fn channel(&self) -> &ChannelManager<T> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut ChannelManager<T> {
        &mut self.channel
    }

    // ── Internal ──────────────────────────────────────────────

    /// Hand one input to the FSM, then flush what it produced: phase
    /// change, queued commands, status line.  Returns whether the phase
    /// changed, or the handler's rejection.
    fn deliver(
        &mut self,
        input: SessionInput,
        now_ms: u64,
        sink: &mut impl EventSink,
    ) -> Result<bool, ControlError> {
        self.ctx.now_ms = now_ms;
        self.ctx.link_up = self.channel.is_connected();
        self.ctx.rejection = None;

        let from = self.fsm.current_phase();
        let changed = self.fsm.handle(&input, &mut self.ctx);
        if changed {
            sink.emit(&ControllerEvent::PhaseChanged {
                from,
                to: self.fsm.current_phase(),
            });
        }
        self.flush_outbox(sink);
        self.publish_status(sink);

        match self.ctx.rejection.take() {
            // Detections keep streaming during actuation; the handler's
            // `warn!` is the only trace they leave.
            Some(e @ ControlError::PolicyViolation(PolicyViolation::DetectionWhilePaused)) => Err(e),
            Some(e) => {
                sink.emit(&ControllerEvent::Error(e));
                Err(e)
            }
            None => Ok(changed),
        }
    }

    fn force_idle(&mut self, sink: &mut impl EventSink) {
        let from = self.fsm.current_phase();
        if from == PhaseId::Idle {
            return;
        }
        self.fsm.force_transition(PhaseId::Idle, &mut self.ctx);
        sink.emit(&ControllerEvent::PhaseChanged {
            from,
            to: PhaseId::Idle,
        });
        // Commands queued on the way down have no link to go to.
        self.ctx.outbox.clear();
    }

    fn flush_outbox(&mut self, sink: &mut impl EventSink) {
        let outbox = core::mem::take(&mut self.ctx.outbox);
        for command in outbox {
            match self.channel.send(command) {
                Ok(()) => sink.emit(&ControllerEvent::CommandSent(command)),
                Err(e) => {
                    warn!("{} not sent: {}", command.event_name(), e);
                    sink.emit(&ControllerEvent::Error(e.into()));
                }
            }
        }
    }

    fn pump_channel(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        for event in self.channel.poll(now_ms) {
            self.on_channel_event(event, now_ms, sink);
        }
        self.publish_link(sink);
    }

    fn on_channel_event(&mut self, event: ChannelEvent, now_ms: u64, sink: &mut impl EventSink) {
        match event {
            ChannelEvent::Connected => {
                // Standing subscriptions are already reissued by the channel.
                self.ctx.now_ms = now_ms;
                self.force_idle(sink);
                self.ctx
                    .set_status(StatusKind::Normal, "Connected. Press BEGIN to start detection.");
                self.publish_link(sink);
                self.publish_status(sink);
            }
            ChannelEvent::Disconnected => {
                self.ctx.now_ms = now_ms;
                self.force_idle(sink);
                self.ctx
                    .set_status(StatusKind::Error, "Disconnected. Attempting to reconnect...");
                self.publish_link(sink);
                self.publish_status(sink);
            }
            ChannelEvent::Failed => {
                self.ctx.set_status(
                    StatusKind::Error,
                    "Backend unreachable. Use CONNECT to retry.",
                );
                sink.emit(&ControllerEvent::Error(ControlError::ConnectivityLost));
                self.publish_link(sink);
                self.publish_status(sink);
            }
            ChannelEvent::Rejected(e) => {
                sink.emit(&ControllerEvent::Error(ControlError::Decode(e)));
            }
            ChannelEvent::Inbound(inbound) => self.on_inbound(inbound, now_ms, sink),
        }
    }

    fn on_inbound(&mut self, event: InboundEvent, now_ms: u64, sink: &mut impl EventSink) {
        match event {
            InboundEvent::Frame => {
                self.frames_seen += 1;
            }
            InboundEvent::Detection(detection) => {
                let unrecognized = classify(detection.label.as_deref(), &self.ctx.config.labels)
                    == WasteCategory::Unrecognized;
                let input = SessionInput::Detection(detection);
                let result = self.deliver(input, now_ms, sink);
                let recorded = self.ctx.session.last_detection_ms == Some(now_ms);
                if unrecognized && result.is_ok() && recorded {
                    sink.emit(&ControllerEvent::Error(ControlError::UnrecognizedLabel));
                }
            }
            InboundEvent::ServerMessage { kind, message } => {
                sink.emit(&ControllerEvent::BackendMessage {
                    kind,
                    message: message.clone(),
                });
                self.on_server_message(kind, &message, now_ms, sink);
            }
            InboundEvent::MultipleWasteWarning { message } => {
                let text = message.as_deref().unwrap_or(MULTIPLE_WASTE_TEXT);
                self.on_warning(text, now_ms, sink);
            }
            InboundEvent::ChoicePrompt => {
                let _ = self.deliver(
                    SessionInput::Completion(CompletionSignal::ChoicePrompt),
                    now_ms,
                    sink,
                );
            }
            InboundEvent::Telemetry(reading) => {
                let full_mask = self.bins.apply(&reading, now_ms, &mut self.alerts);
                sink.emit(&ControllerEvent::BinLevels {
                    levels: self.bins.snapshot(),
                    full_mask,
                });
                if full_mask != 0 {
                    if let Some(alert) = self.alerts.get(AlertKind::BinFull) {
                        sink.emit(&ControllerEvent::AlertRaised {
                            kind: AlertKind::BinFull,
                            message: alert.message.as_str().to_string(),
                        });
                    }
                }
            }
            InboundEvent::BinAlert { bin } => {
                let text = format!("{} bin is almost full!", bin);
                self.alerts.raise(AlertKind::BinFull, &text, now_ms);
                sink.emit(&ControllerEvent::AlertRaised {
                    kind: AlertKind::BinFull,
                    message: text,
                });
            }
            InboundEvent::Handshake { message } => {
                info!(
                    "Backend handshake: {}",
                    message.as_deref().unwrap_or("(no message)")
                );
            }
        }
    }

    fn on_server_message(
        &mut self,
        kind: ServerMessageKind,
        message: &str,
        now_ms: u64,
        sink: &mut impl EventSink,
    ) {
        match kind {
            ServerMessageKind::Status => {
                let completed = message.to_ascii_lowercase().contains("completed");
                let changed = if completed {
                    let signal = SessionInput::Completion(CompletionSignal::StatusMessage);
                    self.deliver(signal, now_ms, sink).unwrap_or(false)
                } else {
                    false
                };
                // The completion prompt outranks the backend's own wording.
                if !changed {
                    self.ctx.set_status(StatusKind::Normal, message);
                    self.publish_status(sink);
                }
            }
            ServerMessageKind::Error => {
                error!("Backend error: {}", message);
                let _ = self.deliver(SessionInput::BackendError, now_ms, sink);
                self.ctx.set_status(StatusKind::Error, message);
                self.publish_status(sink);
                sink.emit(&ControllerEvent::Error(ControlError::Backend));
            }
            ServerMessageKind::Warning => self.on_warning(message, now_ms, sink),
        }
    }

    fn on_warning(&mut self, message: &str, now_ms: u64, sink: &mut impl EventSink) {
        self.alerts.raise(AlertKind::MultipleWaste, message, now_ms);
        sink.emit(&ControllerEvent::AlertRaised {
            kind: AlertKind::MultipleWaste,
            message: message.to_string(),
        });
        let _ = self.deliver(SessionInput::BackendWarning, now_ms, sink);
    }

    fn apply_config(&mut self, config: SystemConfig) {
        self.ctx.dispatcher.set_windows(config.completion);
        self.bins
            .set_geometry(config.bin_height_cm, config.bin_full_distance_cm);
        self.alerts.set_dwell(config.alert_dwell_ms);
        self.channel.set_policy(ReconnectPolicy::from_config(&config));
        self.ctx.config = config;
    }

    fn publish_status(&mut self, sink: &mut impl EventSink) {
        let kind = self.ctx.status_kind;
        let text = self.ctx.status.as_str();
        if self.published_status.0 == kind && self.published_status.1 == text {
            return;
        }
        self.published_status = (kind, text.to_string());
        sink.emit(&ControllerEvent::StatusChanged {
            kind,
            text: text.to_string(),
        });
    }

    fn publish_link(&mut self, sink: &mut impl EventSink) {
        let state = self.channel.state();
        if state != self.published_link {
            self.published_link = state;
            sink.emit(&ControllerEvent::LinkChanged(state));
        }
    }
}
