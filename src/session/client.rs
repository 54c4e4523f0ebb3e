//! Public client handle
//!
//! [`EngineClient`] is a cheap, cloneable handle onto one session task. All
//! protocol state lives in the task; the handle validates input, forwards
//! commands and reads the shared status snapshot.

use super::driver::{Command, DriverChannels, SessionDriver, SessionSettings};
use super::events::ClientEvent;
use super::publish::{prepare_publish, PublishClientOptions, PublishOptions};
use super::state::{SessionState, SessionStatus};
use super::subscriptions::SubscriptionRegistry;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::observability::{MetricsSnapshot, SessionMetrics};
use crate::protocol::{IdGenerator, PayloadValidator, SchemaValidator, UuidIdGenerator};
use crate::transport::{Connector, TcpConnector};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, Instrument};

/// Stream of lifecycle and data events for one client
pub type EventReceiver = mpsc::UnboundedReceiver<ClientEvent>;

/// Configures collaborators before the session task is spawned
pub struct ClientBuilder {
    config: ClientConfig,
    connector: Option<Arc<dyn Connector>>,
    validator: Option<Arc<dyn PayloadValidator>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connector: None,
            validator: None,
            ids: None,
        }
    }

    /// Replace the default TCP connector
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Replace the default schema-based payload validator
    pub fn validator<V: PayloadValidator + 'static>(mut self, validator: V) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Replace the default UUID message id generator
    pub fn id_generator<G: IdGenerator + 'static>(mut self, ids: G) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    /// Spawn the session task. Must be called within a Tokio runtime.
    pub fn build(self) -> ClientResult<(EngineClient, EventReceiver)> {
        self.config.validate()?;
        let auth_token = self.config.resolved_auth_token()?;

        let validator: Arc<dyn PayloadValidator> = match self.validator {
            Some(validator) => validator,
            None => Arc::new(SchemaValidator::new()?),
        };
        let connector: Arc<dyn Connector> =
            self.connector.unwrap_or_else(|| Arc::new(TcpConnector));
        let ids: Arc<dyn IdGenerator> = self.ids.unwrap_or_else(|| Arc::new(UuidIdGenerator));

        let settings = SessionSettings {
            host: self.config.broker.host.clone(),
            port: self.config.broker.port,
            client_id: self.config.client.id.clone(),
            auth_token,
            max_workers: self.config.client.max_workers,
            connect_timeout: self.config.connect_timeout(),
            write_timeout: self.config.write_timeout(),
            reconnect_max_wait: self.config.reconnect_max_wait(),
            pending_stale_after: self.config.pending_stale_after(),
            pending_sweep_min_len: self.config.publish.pending_sweep_min_len,
        };

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let subscriptions = Arc::new(watch::Sender::new(SubscriptionRegistry::new()));
        let metrics = Arc::new(SessionMetrics::new());

        let driver = SessionDriver::new(
            settings,
            connector,
            validator,
            Arc::clone(&metrics),
            DriverChannels {
                commands: commands_rx,
                events: events_tx,
                status: status_tx,
                subscriptions: subscriptions.subscribe(),
            },
        );
        tokio::spawn(driver.run());

        info!(
            client_id = %self.config.client.id,
            "EngineMQ client created for {}:{}",
            self.config.broker.host,
            self.config.broker.port
        );

        let client = EngineClient {
            commands: commands_tx,
            status: status_rx,
            subscriptions,
            ids,
            metrics,
            publish_timeout: self.config.publish_timeout(),
        };
        if self.config.client.connect_auto_start {
            client.connect()?;
        }
        Ok((client, events_rx))
    }
}

/// Handle onto a running session
#[derive(Clone)]
pub struct EngineClient {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SessionStatus>,
    subscriptions: Arc<watch::Sender<SubscriptionRegistry>>,
    ids: Arc<dyn IdGenerator>,
    metrics: Arc<SessionMetrics>,
    publish_timeout: Duration,
}

impl std::fmt::Debug for EngineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineClient")
            .field("status", &*self.status.borrow())
            .field("publish_timeout", &self.publish_timeout)
            .finish_non_exhaustive()
    }
}

impl EngineClient {
    /// Build with the default connector, validator and id generator
    pub fn new(config: ClientConfig) -> ClientResult<(Self, EventReceiver)> {
        ClientBuilder::new(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    // ========== Connection ==========

    /// Start connecting and enable automatic reconnection.
    /// No-op while a connection is already active or in progress.
    pub fn connect(&self) -> ClientResult<()> {
        self.command(Command::Connect)
    }

    /// Disable reconnection and shut the connection down.
    /// Resolves once the session has reached `Disconnected`.
    pub async fn close(&self) {
        let (done, finished) = oneshot::channel();
        if self.command(Command::Close { done }).is_ok() {
            let _ = finished.await;
        }
    }

    // ========== Subscriptions ==========

    pub fn subscribe<I, S>(&self, patterns: I) -> ClientResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = SubscriptionRegistry::validated(patterns)?;
        self.subscriptions.send_modify(|registry| {
            // Already validated
            let _ = registry.subscribe(&patterns);
        });
        self.command(Command::SyncSubscriptions)
    }

    pub fn unsubscribe<I, S>(&self, patterns: I) -> ClientResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.subscriptions.send_modify(|registry| {
            registry.unsubscribe(patterns);
        });
        self.command(Command::SyncSubscriptions)
    }

    pub fn unsubscribe_all(&self) -> ClientResult<()> {
        self.subscriptions.send_modify(SubscriptionRegistry::clear);
        self.command(Command::SyncSubscriptions)
    }

    /// Current desired subscription set, in insertion order
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.borrow().patterns().to_vec()
    }

    // ========== Publishing ==========

    /// Publish with default options. Resolves with the normalized message id.
    pub async fn publish(&self, topic: &str, message: Value) -> ClientResult<String> {
        self.publish_with(
            topic,
            message,
            &PublishOptions::default(),
            PublishClientOptions::default(),
        )
        .await
    }

    pub async fn publish_with(
        &self,
        topic: &str,
        message: Value,
        options: &PublishOptions,
        client_options: PublishClientOptions,
    ) -> ClientResult<String> {
        let state = self.state();
        if !state.is_connected() {
            return Err(ClientError::NotConnected);
        }
        if !state.is_ready() {
            return Err(ClientError::NotReady);
        }

        let payload = prepare_publish(topic, message, options, self.ids.as_ref())?;
        let message_id = payload.options.message_id.clone();
        let timeout = client_options.timeout.unwrap_or(self.publish_timeout);

        let span = crate::publish_span!(message_id = %message_id, topic = %payload.topic);
        async move {
            let (reply, ack) = oneshot::channel();
            self.command(Command::Publish { payload, reply })?;

            match tokio::time::timeout(timeout, ack).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(ClientError::publish_abandoned(message_id)),
                Err(_) => {
                    debug!("No acknowledgment within {}ms", timeout.as_millis());
                    self.metrics.publish_timed_out();
                    let _ = self.command(Command::AbandonPublish {
                        message_id: message_id.clone(),
                    });
                    Err(ClientError::publish_timeout(
                        message_id,
                        timeout.as_millis() as u64,
                    ))
                }
            }
        }
        .instrument(span)
        .await
    }

    // ========== Status ==========

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// `None` before the first successful connection
    pub fn reconnect_count(&self) -> Option<u32> {
        self.status.borrow().reconnect_count
    }

    pub fn reconnect_allowed(&self) -> bool {
        self.status.borrow().reconnect_enabled
    }

    /// Wait until the session reaches `state`, or give up after `timeout`
    pub async fn wait_for_state(&self, state: SessionState, timeout: Duration) -> bool {
        let mut status = self.status.clone();
        let reached = status.wait_for(|current| current.state == state);
        let outcome = tokio::time::timeout(timeout, reached)
            .await
            .map(|result| result.is_ok());
        matches!(outcome, Ok(true))
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn command(&self, command: Command) -> ClientResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::SessionClosed)
    }
}
