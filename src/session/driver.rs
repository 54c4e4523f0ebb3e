//! Impure session task
//!
//! One Tokio task owns every piece of protocol state and reacts, in a single
//! `select!` loop, to client commands, outbound acknowledgments, the
//! in-flight connection attempt, inbound frames, the reconnect timer and the
//! heartbeat check. Nothing else mutates session state.

use super::delivery::{Delivery, OutboundSender};
use super::events::ClientEvent;
use super::handshake::{self, HandshakeOutcome, CLIENT_VERSION};
use super::heartbeat::{HeartbeatAction, HeartbeatMonitor};
use super::publish::{AckOutcome, PublishCorrelator, PublishReply};
use super::reconnect::{ReconnectPolicy, ReconnectionDecision};
use super::state::{next_state, SessionEvent, SessionState, SessionStatus};
use super::subscriptions::SubscriptionRegistry;
use crate::error::ClientError;
use crate::observability::SessionMetrics;
use crate::protocol::{
    BrokerMessage, ClientMessage, HeartbeatPayload, PayloadValidator, PublishAckPayload,
    PublishPayload, SubscribeAckPayload, SubscribePayload,
};
use crate::transport::{Connector, MessageChannel, TransportError};
use futures::future::{self, BoxFuture};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};

/// Requests from client handles
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Close { done: oneshot::Sender<()> },
    SyncSubscriptions,
    Publish {
        payload: PublishPayload,
        reply: PublishReply,
    },
    AbandonPublish { message_id: String },
}

/// Fixed parameters of a session
#[derive(Debug, Clone)]
pub(crate) struct SessionSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub auth_token: Option<String>,
    pub max_workers: u32,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub reconnect_max_wait: Duration,
    pub pending_stale_after: Duration,
    pub pending_sweep_min_len: usize,
}

/// Channels connecting the driver to its handles
pub(crate) struct DriverChannels {
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub events: mpsc::UnboundedSender<ClientEvent>,
    pub status: watch::Sender<SessionStatus>,
    pub subscriptions: watch::Receiver<SubscriptionRegistry>,
}

/// How a live channel is released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    /// Flush pending writes and close, bounded by the write timeout
    Graceful,
    /// Drop the channel; the peer may not be reading
    Forced,
}

type ConnectFuture = BoxFuture<'static, Result<Box<dyn MessageChannel>, TransportError>>;

pub(crate) struct SessionDriver {
    settings: SessionSettings,
    connector: Arc<dyn Connector>,
    validator: Arc<dyn PayloadValidator>,
    metrics: Arc<SessionMetrics>,

    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ClientEvent>,
    status: watch::Sender<SessionStatus>,
    subscriptions: watch::Receiver<SubscriptionRegistry>,
    outbound_tx: OutboundSender,
    outbound_rx: mpsc::UnboundedReceiver<ClientMessage>,

    state: SessionState,
    reconnect: ReconnectPolicy,
    reconnect_enabled: bool,
    reconnect_count: Option<u32>,
    reconnect_at: Option<Instant>,
    pending_connect: Option<ConnectFuture>,
    channel: Option<Box<dyn MessageChannel>>,
    heartbeat: Option<HeartbeatMonitor>,
    heartbeat_tick: Option<Interval>,
    heartbeat_sec: Option<u64>,
    server_version: Option<String>,
    correlator: PublishCorrelator,
}

impl SessionDriver {
    pub(crate) fn new(
        settings: SessionSettings,
        connector: Arc<dyn Connector>,
        validator: Arc<dyn PayloadValidator>,
        metrics: Arc<SessionMetrics>,
        channels: DriverChannels,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let reconnect = ReconnectPolicy::new(settings.reconnect_max_wait);
        let correlator =
            PublishCorrelator::new(settings.pending_stale_after, settings.pending_sweep_min_len);

        Self {
            settings,
            connector,
            validator,
            metrics,
            commands: channels.commands,
            events: channels.events,
            status: channels.status,
            subscriptions: channels.subscriptions,
            outbound_tx,
            outbound_rx,
            state: SessionState::Disconnected,
            reconnect,
            reconnect_enabled: false,
            reconnect_count: None,
            reconnect_at: None,
            pending_connect: None,
            channel: None,
            heartbeat: None,
            heartbeat_tick: None,
            heartbeat_sec: None,
            server_version: None,
            correlator,
        }
    }

    /// Run until every client handle is dropped
    pub(crate) async fn run(mut self) {
        let span = crate::session_span!(
            client_id = %self.settings.client_id,
            broker = %format!("{}:{}", self.settings.host, self.settings.port)
        );
        async move {
            debug!("Session task started");
            loop {
                tokio::select! {
                    command = self.commands.recv() => match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            self.shutdown().await;
                            break;
                        }
                    },
                    Some(message) = self.outbound_rx.recv() => self.send_message(message).await,
                    result = poll_pending_connect(&mut self.pending_connect) => {
                        self.pending_connect = None;
                        self.on_connect_result(result).await;
                    }
                    inbound = recv_inbound(&mut self.channel) => self.on_inbound(inbound).await,
                    () = sleep_until_deadline(self.reconnect_at) => {
                        self.reconnect_at = None;
                        self.start_connect();
                    }
                    _ = tick_heartbeat(&mut self.heartbeat_tick) => self.on_heartbeat_tick().await,
                }
            }
            debug!("Session task stopped");
        }
        .instrument(span)
        .await
    }

    // ========== Commands ==========

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                self.reconnect_enabled = true;
                self.start_connect();
                self.publish_status();
            }
            Command::Close { done } => {
                self.close_session("closed by client").await;
                let _ = done.send(());
            }
            Command::SyncSubscriptions => self.sync_subscriptions().await,
            Command::Publish { payload, reply } => self.publish(payload, reply).await,
            Command::AbandonPublish { message_id } => {
                if self.correlator.abandon(&message_id) {
                    debug!("Dropped timed out publish {}", message_id);
                }
            }
        }
    }

    async fn publish(&mut self, payload: PublishPayload, reply: PublishReply) {
        if !self.state.is_connected() {
            let _ = reply.send(Err(ClientError::NotConnected));
            return;
        }
        if !self.state.is_ready() {
            let _ = reply.send(Err(ClientError::NotReady));
            return;
        }

        let now = Instant::now();
        self.correlator
            .register(payload.options.message_id.clone(), reply, now);
        self.metrics.publish_sent();
        self.send_message(ClientMessage::Publish(payload)).await;
        self.maintain_pending(now);
    }

    async fn sync_subscriptions(&mut self) {
        // Mark seen so the flush after the next login sends the latest set
        let patterns = self.subscriptions.borrow_and_update().patterns().to_vec();
        if !self.state.is_ready() {
            return;
        }
        self.send_message(ClientMessage::Subscribe(SubscribePayload {
            subscriptions: patterns,
        }))
        .await;
    }

    async fn close_session(&mut self, reason: &str) {
        self.reconnect_enabled = false;
        self.reconnect_at = None;
        if self.pending_connect.take().is_some() {
            debug!("Cancelled in-flight connection attempt");
        }

        if self.channel.is_some() {
            self.on_transport_closed(reason, Teardown::Graceful).await;
        } else if self.state != SessionState::Disconnected {
            self.transition(SessionEvent::TransportClosed(reason.to_string()));
        } else {
            self.publish_status();
        }
    }

    async fn shutdown(&mut self) {
        info!("All client handles dropped, closing session");
        self.close_session("client dropped").await;
    }

    // ========== Connection lifecycle ==========

    fn start_connect(&mut self) {
        if self.pending_connect.is_some() || self.channel.is_some() {
            return;
        }
        self.reconnect_at = None;
        self.metrics.connection_attempt();
        self.transition(SessionEvent::ConnectStarted);

        let connector = Arc::clone(&self.connector);
        let host = self.settings.host.clone();
        let port = self.settings.port;
        let timeout = self.settings.connect_timeout;
        debug!("Connecting to {}:{}", host, port);

        self.pending_connect = Some(Box::pin(async move {
            match tokio::time::timeout(timeout, connector.connect(&host, port)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::ConnectTimeout {
                    addr: format!("{host}:{port}"),
                    timeout_ms: timeout.as_millis() as u64,
                }),
            }
        }));
    }

    async fn on_connect_result(&mut self, result: Result<Box<dyn MessageChannel>, TransportError>) {
        match result {
            Ok(channel) => {
                self.channel = Some(channel);
                self.metrics.connection_established();
                let reconnect_count = self.reconnect_count.map_or(0, |count| count + 1);
                self.reconnect_count = Some(reconnect_count);
                self.transition(SessionEvent::TransportConnected);
                self.emit(ClientEvent::Connected { reconnect_count });

                let login = handshake::build_login(
                    &self.settings.client_id,
                    self.settings.auth_token.as_deref(),
                    self.settings.max_workers,
                );
                self.send_message(ClientMessage::Login(login)).await;
            }
            Err(error) => {
                self.metrics.connection_failed();
                self.transition(SessionEvent::ConnectFailed(error.to_string()));
                self.report(ClientError::Transport(error), None);
                self.schedule_reconnect();
            }
        }
    }

    async fn on_transport_closed(&mut self, reason: &str, teardown: Teardown) {
        if let Some(mut channel) = self.channel.take() {
            if teardown == Teardown::Graceful {
                match tokio::time::timeout(self.write_timeout(), channel.close()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!("Error while closing channel: {}", e),
                    Err(_) => debug!("Channel close timed out, dropping it"),
                }
            }
        }
        self.heartbeat = None;
        self.heartbeat_tick = None;

        let was_connected = self.state.is_connected();
        self.metrics.connection_lost();
        self.transition(SessionEvent::TransportClosed(reason.to_string()));
        if was_connected {
            self.emit(ClientEvent::Disconnected);
        }
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        let decision =
            self.reconnect
                .decide(self.reconnect_enabled, self.state, &mut rand::thread_rng());
        match decision {
            ReconnectionDecision::Proceed { delay } => {
                info!("Reconnecting in {}ms", delay.as_millis());
                self.reconnect_at = Some(Instant::now() + delay);
            }
            ReconnectionDecision::AbortDisabled => {
                debug!("Reconnection disabled, staying disconnected");
            }
            ReconnectionDecision::AbortActive => {}
        }
    }

    /// Handshake failure: report and tear down. Fatal errors stop reconnection.
    async fn fail_session(&mut self, error: ClientError) {
        warn!("Session failed: {}", error);
        if error.disables_reconnect() {
            self.reconnect_enabled = false;
            self.reconnect_at = None;
        }
        self.report(error, None);
        self.on_transport_closed("handshake failed", Teardown::Forced)
            .await;
    }

    // ========== Inbound ==========

    async fn on_inbound(&mut self, inbound: Result<Option<Value>, TransportError>) {
        match inbound {
            Ok(Some(frame)) => {
                self.metrics.message_received();
                self.refresh_liveness();
                match BrokerMessage::decode(frame, self.validator.as_ref()) {
                    Ok(message) => self.dispatch(message).await,
                    Err(e) => {
                        self.metrics.message_dropped();
                        debug!("Dropping inbound frame: {}", e);
                    }
                }
            }
            Ok(None) => {
                self.on_transport_closed("closed by broker", Teardown::Forced)
                    .await
            }
            Err(e) if !e.is_fatal() => {
                self.metrics.message_dropped();
                self.refresh_liveness();
                debug!("Dropping malformed frame: {}", e);
            }
            Err(e) => {
                warn!("Transport failure: {}", e);
                self.on_transport_closed(&e.to_string(), Teardown::Forced)
                    .await;
            }
        }
    }

    async fn dispatch(&mut self, message: BrokerMessage) {
        match message {
            BrokerMessage::LoginAck(ack) => self.on_login_ack(ack).await,
            BrokerMessage::Heartbeat(_) => {}
            BrokerMessage::SubscribeAck(ack) => self.on_subscribe_ack(ack),
            BrokerMessage::PublishAck(ack) => self.on_publish_ack(ack),
            BrokerMessage::Delivery(payload) => {
                self.metrics.delivery_received();
                let delivery = Delivery::new(payload, self.outbound_tx.clone());
                let span = crate::delivery_span!(
                    message_id = %delivery.message_id(),
                    topic = %delivery.topic
                );
                span.in_scope(|| {
                    debug!("Delivery received");
                    self.emit(ClientEvent::Message(delivery));
                });
            }
            BrokerMessage::DeliveryReport(report) => {
                self.emit(ClientEvent::DeliveryReport(report));
            }
        }
    }

    async fn on_login_ack(&mut self, ack: crate::protocol::LoginAckPayload) {
        if self.state != SessionState::Connected {
            debug!("Ignoring loginAck in state {:?}", self.state);
            return;
        }

        match handshake::evaluate(&ack, CLIENT_VERSION) {
            HandshakeOutcome::Rejected { message } => {
                self.fail_session(ClientError::login(message)).await;
            }
            HandshakeOutcome::Incompatible { server_version } => {
                self.fail_session(ClientError::VersionIncompatible {
                    server_version,
                    client_version: CLIENT_VERSION.to_string(),
                })
                .await;
            }
            HandshakeOutcome::Accepted {
                heartbeat,
                server_version,
            } => {
                if let Some(interval) = heartbeat {
                    self.start_heartbeat(interval);
                }
                self.heartbeat_sec = heartbeat.map(|d| d.as_secs());
                self.server_version = server_version.clone();
                self.transition(SessionEvent::HandshakeAccepted);
                self.emit(ClientEvent::Ready {
                    heartbeat_sec: self.heartbeat_sec,
                    server_version,
                });
                self.sync_subscriptions().await;
            }
        }
    }

    fn on_subscribe_ack(&mut self, ack: SubscribeAckPayload) {
        if ack.errors.is_empty() {
            return;
        }
        for failure in &ack.errors {
            warn!(
                "Broker rejected subscription '{}': {}",
                failure.pattern, failure.error_message
            );
        }
        let data = serde_json::to_value(&ack.errors).ok();
        self.report(ClientError::SubscribeRejected { errors: ack.errors }, data);
    }

    fn on_publish_ack(&mut self, ack: PublishAckPayload) {
        match self.correlator.resolve(&ack) {
            AckOutcome::Acked => self.metrics.publish_acked(),
            AckOutcome::Rejected => self.metrics.publish_rejected(),
            AckOutcome::Unmatched => {}
        }
        self.maintain_pending(Instant::now());
    }

    fn maintain_pending(&mut self, now: Instant) {
        let swept = self.correlator.maintain(now);
        if swept > 0 {
            self.metrics.pending_swept(swept);
        }
    }

    // ========== Heartbeat ==========

    fn start_heartbeat(&mut self, interval: Duration) {
        let now = Instant::now();
        let monitor = HeartbeatMonitor::new(interval, now);
        let period = monitor.check_period();
        let mut tick = tokio::time::interval_at(now + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Heartbeat every {}s, checking every {}ms",
            interval.as_secs(),
            period.as_millis()
        );

        if let Some(channel) = self.channel.as_ref() {
            if let Err(e) = channel.set_keep_alive(handshake::keep_alive_for(interval)) {
                warn!("Failed to set transport keep-alive: {}", e);
            }
        }
        self.heartbeat = Some(monitor);
        self.heartbeat_tick = Some(tick);
    }

    async fn on_heartbeat_tick(&mut self) {
        let Some(monitor) = self.heartbeat.as_ref() else {
            return;
        };
        match monitor.evaluate(Instant::now()) {
            HeartbeatAction::Idle => {}
            HeartbeatAction::SendHeartbeat => {
                self.send_message(ClientMessage::Heartbeat(HeartbeatPayload {}))
                    .await;
            }
            HeartbeatAction::ConnectionLost => {
                let interval_secs = monitor.interval().as_secs();
                warn!("No traffic from broker for {}s, dropping connection", interval_secs);
                self.metrics.heartbeat_lost();
                self.heartbeat = None;
                self.heartbeat_tick = None;
                self.report(ClientError::HeartbeatLost { interval_secs }, None);
                self.on_transport_closed("heartbeat lost", Teardown::Forced)
                    .await;
            }
        }
    }

    fn refresh_liveness(&mut self) {
        if let Some(monitor) = self.heartbeat.as_mut() {
            monitor.record_received(Instant::now());
        }
    }

    // ========== Outbound ==========

    /// Bound on one write: the configured timeout, capped by the heartbeat
    /// interval so a stalled peer is dropped within one heartbeat window
    fn write_timeout(&self) -> Duration {
        match self.heartbeat.as_ref() {
            Some(monitor) => self.settings.write_timeout.min(monitor.interval()),
            None => self.settings.write_timeout,
        }
    }

    /// Single funnel for every outbound message
    async fn send_message(&mut self, message: ClientMessage) {
        let command = message.command();
        let write_timeout = self.write_timeout();
        let Some(channel) = self.channel.as_mut() else {
            debug!("Not connected, dropping outbound {}", command);
            return;
        };
        let value = match message.to_value() {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to encode {}: {}", command, e);
                return;
            }
        };

        let sent = match tokio::time::timeout(write_timeout, channel.send(value)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::WriteTimeout {
                timeout_ms: write_timeout.as_millis() as u64,
            }),
        };
        match sent {
            Ok(()) => {
                self.metrics.message_sent();
                if let Some(monitor) = self.heartbeat.as_mut() {
                    monitor.record_sent(Instant::now());
                }
                match message {
                    ClientMessage::Heartbeat(_) => self.metrics.heartbeat_sent(),
                    ClientMessage::DeliveryAck(_) => self.metrics.delivery_ack_sent(),
                    _ => {}
                }
                debug!("Sent {}", command);
            }
            Err(e) => {
                warn!("Failed to send {}: {}", command, e);
                let reason = e.to_string();
                self.report(ClientError::Transport(e), None);
                self.on_transport_closed(&reason, Teardown::Forced).await;
            }
        }
    }

    // ========== State & events ==========

    fn transition(&mut self, event: SessionEvent) {
        self.state = next_state(self.state, &event);
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status.send_replace(SessionStatus {
            state: self.state,
            reconnect_count: self.reconnect_count,
            reconnect_enabled: self.reconnect_enabled,
            heartbeat_sec: self.heartbeat_sec,
            server_version: self.server_version.clone(),
        });
    }

    fn emit(&self, event: ClientEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    fn report(&self, error: ClientError, data: Option<Value>) {
        if let Some(event) = ClientEvent::from_error(&error, data) {
            self.emit(event);
        }
    }
}

// Each helper borrows one field so the select! arms stay disjoint. A `None`
// source never completes.

async fn poll_pending_connect(
    pending: &mut Option<ConnectFuture>,
) -> Result<Box<dyn MessageChannel>, TransportError> {
    match pending.as_mut() {
        Some(connect) => connect.await,
        None => future::pending().await,
    }
}

async fn recv_inbound(
    channel: &mut Option<Box<dyn MessageChannel>>,
) -> Result<Option<Value>, TransportError> {
    match channel.as_mut() {
        Some(channel) => channel.recv().await,
        None => future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

async fn tick_heartbeat(tick: &mut Option<Interval>) -> Instant {
    match tick.as_mut() {
        Some(tick) => tick.tick().await,
        None => future::pending().await,
    }
}
