//! MQTT broker client wrapper
//!
//! One clean session to a fixed broker and topic. Connect, publish and
//! disconnect never fail towards the caller: errors are logged and the
//! wrapper stays (or becomes) disconnected. There is no reconnect.

use anyhow::{anyhow, Result};
use bytes::Bytes;
use collect_shared::state_machine::BrokerState;
use rand::Rng;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// Configuration for the broker connection
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker host name or address
    pub host: String,
    /// Broker TCP port
    pub port: u16,
    /// Topic every status message is published on
    pub topic: String,
    /// Prefix of the generated client identifier
    pub client_id_prefix: String,
    /// MQTT keep-alive interval
    pub keep_alive: Duration,
    /// Time allowed for the CONNACK to arrive
    pub connect_timeout: Duration,
    /// Capacity of the outgoing request queue
    pub request_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            topic: "vehicule".into(),
            client_id_prefix: "collect".into(),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            request_capacity: 10,
        }
    }
}

/// What happened to a publish request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the client for QoS 1 delivery
    Published,
    /// Dropped because no session is open
    NotConnected,
    /// Dropped because the client rejected it
    Failed,
}

struct BrokerSession {
    client: AsyncClient,
    client_id: String,
    driver: JoinHandle<()>,
}

/// Owned broker connection handle
pub struct BrokerClient {
    config: BrokerConfig,
    session: RwLock<Option<BrokerSession>>,
    connected: Arc<AtomicBool>,
}

impl BrokerClient {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            session: RwLock::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current connection state
    pub fn state(&self) -> BrokerState {
        if self.connected.load(Ordering::SeqCst) {
            BrokerState::Connected
        } else {
            BrokerState::Disconnected
        }
    }

    /// Client identifier of the open session, if any
    pub async fn client_id(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.client_id.clone())
    }

    /// Open a clean session with a fresh client identifier
    pub async fn connect(&self) {
        if self.state().can_publish() {
            debug!("[BROKER] Already connected");
            return;
        }

        let mut session = self.session.write().await;
        if let Some(stale) = session.take() {
            stale.driver.abort();
        }

        let client_id = generate_client_id(&self.config.client_id_prefix);
        let mut options = MqttOptions::new(&client_id, &self.config.host, self.config.port);
        options.set_keep_alive(self.config.keep_alive);
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, self.config.request_capacity);
        let address = format!("{}:{}", self.config.host, self.config.port);

        match timeout(self.config.connect_timeout, wait_for_connack(&mut eventloop)).await {
            Ok(Ok(())) => {
                self.connected.store(true, Ordering::SeqCst);
                let driver = tokio::spawn(drive_event_loop(eventloop, self.connected.clone()));
                info!("[BROKER] Connected to {} as {}", address, client_id);
                *session = Some(BrokerSession {
                    client,
                    client_id,
                    driver,
                });
            }
            Ok(Err(e)) => {
                warn!("[BROKER] Failed to connect to {}: {:#}", address, e);
            }
            Err(_) => {
                warn!(
                    "[BROKER] Timed out connecting to {} after {:?}",
                    address, self.config.connect_timeout
                );
            }
        }
    }

    /// Publish `payload` on the configured topic with QoS 1.
    ///
    /// No-op unless connected. The request is queued without waiting, so a
    /// full queue drops the message.
    pub async fn publish(&self, payload: Bytes) -> PublishOutcome {
        if !self.state().can_publish() {
            debug!("[BROKER] Not connected, dropping message");
            return PublishOutcome::NotConnected;
        }

        let session = self.session.read().await;
        let Some(session) = session.as_ref() else {
            return PublishOutcome::NotConnected;
        };

        match session
            .client
            .try_publish(&self.config.topic, QoS::AtLeastOnce, false, payload.to_vec())
        {
            Ok(()) => {
                trace!("[BROKER] Queued message on {}", self.config.topic);
                PublishOutcome::Published
            }
            Err(e) => {
                warn!("[BROKER] Failed to publish on {}: {}", self.config.topic, e);
                PublishOutcome::Failed
            }
        }
    }

    /// Close the session if one is open. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let Some(session) = self.session.write().await.take() else {
            debug!("[BROKER] Disconnect requested while not connected");
            return;
        };

        if self.connected.load(Ordering::SeqCst) {
            if let Err(e) = session.client.disconnect().await {
                warn!("[BROKER] Failed to disconnect cleanly: {}", e);
            }
        }

        let mut driver = session.driver;
        if timeout(Duration::from_secs(1), &mut driver).await.is_err() {
            driver.abort();
        }

        self.connected.store(false, Ordering::SeqCst);
        info!("[BROKER] Disconnected ({})", session.client_id);
    }
}

impl Drop for BrokerClient {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.driver.abort();
        }
    }
}

/// Generate a fresh client identifier: `<prefix>-<8 hex digits>`
pub fn generate_client_id(prefix: &str) -> String {
    format!("{}-{:08x}", prefix, rand::thread_rng().gen::<u32>())
}

/// Poll the event loop until the broker acknowledges the connection
async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        if let Event::Incoming(Packet::ConnAck(ack)) = eventloop.poll().await? {
            if ack.code == ConnectReturnCode::Success {
                return Ok(());
            }
            return Err(anyhow!("Broker refused connection: {:?}", ack.code));
        }
    }
}

/// Keep the session alive until it fails or is closed; no reconnect
async fn drive_event_loop(mut eventloop: EventLoop, connected: Arc<AtomicBool>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("[BROKER] Session closed");
                break;
            }
            Ok(event) => trace!("[BROKER] {:?}", event),
            Err(e) => {
                warn!("[BROKER] Connection lost: {}", e);
                break;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
}
