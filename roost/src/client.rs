// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio_rustls::rustls::ClientConfig;

use codec::v3::{
    ConnectReturnCode, PublishPacket, SubscribePacket, SubscribeTopic, UnsubscribePacket,
};
use codec::{EncodePacket, PacketId, QoS};

use crate::commands::{ClientToSessionCmd, SessionToClientCmd};
use crate::error::{Error, ErrorKind};
use crate::log::init_log;
use crate::options::ConnectOptions;
use crate::packet_id::{PacketIdAllocator, PendingPacket};
use crate::persist::{send_key, MemoryPersist, Persist, PersistStrategy};
use crate::router::{SubHandler, TextRouter, TopicRouter};
use crate::session::Session;
use crate::tls;
use crate::ClientStatus;

/// Invoked when a Connect handshake finishes. A dial failure is reported
/// with the reserved return code as sentinel.
pub type ConnectHandler = Arc<dyn Fn(&str, ConnectReturnCode) + Send + Sync>;

/// Invoked when a publish completes, successfully or not.
pub type PublishHandler = Arc<dyn Fn(&str, &Result<(), Error>) + Send + Sync>;

/// Invoked with the granted topic list when a subscribe completes.
pub type SubscribeHandler = Arc<dyn Fn(&[SubscribeTopic], &Result<(), Error>) + Send + Sync>;

/// Invoked when an unsubscribe is acknowledged.
pub type UnsubscribeHandler = Arc<dyn Fn(&[String]) + Send + Sync>;

/// Invoked when a connection breaks mid-session.
pub type NetHandler = Arc<dyn Fn(&str, &Error) + Send + Sync>;

/// Invoked when persistence reports a non-fatal failure.
pub type PersistHandler = Arc<dyn Fn(&Error) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    connect: Mutex<Option<ConnectHandler>>,
    publish: Mutex<Option<PublishHandler>>,
    subscribe: Mutex<Option<SubscribeHandler>>,
    unsubscribe: Mutex<Option<UnsubscribeHandler>>,
    net: Mutex<Option<NetHandler>>,
    persist: Mutex<Option<PersistHandler>>,
}

/// The client facade.
///
/// Owns the option set, the router, persistence, the packet id allocator
/// and one session task per configured server. Application calls are
/// stamped with packet ids, recorded in persistence and fanned out to
/// every session; lifecycle events travel back over one channel and are
/// delivered to the registered handlers by a dispatch task.
pub struct AsyncClient {
    options: ConnectOptions,
    tls_config: Option<Arc<ClientConfig>>,
    allocator: Arc<PacketIdAllocator>,
    persist: Arc<dyn Persist>,
    router: Arc<dyn TopicRouter>,
    handlers: Arc<Handlers>,
    status: ClientStatus,
    session_senders: Vec<Sender<ClientToSessionCmd>>,
    tasks: Vec<JoinHandle<()>>,
    stopped: Arc<AtomicBool>,
}

impl std::fmt::Debug for AsyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncClient")
            .field("options", &self.options)
            .field("persist", &self.persist.name())
            .field("router", &self.router.name())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl AsyncClient {
    /// Create a new client from `options`.
    ///
    /// Only configuration problems surface here; everything after
    /// `connect` is reported through the event handlers.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if no servers are configured or TLS material
    /// cannot be loaded.
    pub fn new(options: ConnectOptions) -> Result<Self, Error> {
        init_log(options.log_level());

        if options.servers().is_empty() {
            return Err(Error::new(ErrorKind::ConfigError, "No servers configured"));
        }

        let tls_config = match options.tls() {
            Some(tls_options) => Some(tls::build_client_config(tls_options)?),
            None => None,
        };

        Ok(Self {
            options,
            tls_config,
            allocator: Arc::new(PacketIdAllocator::new()),
            persist: Arc::new(MemoryPersist::new(PersistStrategy::default())),
            router: Arc::new(TextRouter::new()),
            handlers: Arc::new(Handlers::default()),
            status: ClientStatus::Disconnected,
            session_senders: Vec::new(),
            tasks: Vec::new(),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Install a persistence plug-in. Must be called before `connect`.
    pub fn set_persist(&mut self, persist: Arc<dyn Persist>) -> &mut Self {
        self.persist = persist;
        self
    }

    /// Install a router plug-in. Must be called before `connect`.
    pub fn set_router(&mut self, router: Arc<dyn TopicRouter>) -> &mut Self {
        self.router = router;
        self
    }

    pub fn set_publish_handler(&mut self, handler: PublishHandler) -> &mut Self {
        *self.handlers.publish.lock().unwrap() = Some(handler);
        self
    }

    pub fn set_subscribe_handler(&mut self, handler: SubscribeHandler) -> &mut Self {
        *self.handlers.subscribe.lock().unwrap() = Some(handler);
        self
    }

    pub fn set_unsubscribe_handler(&mut self, handler: UnsubscribeHandler) -> &mut Self {
        *self.handlers.unsubscribe.lock().unwrap() = Some(handler);
        self
    }

    pub fn set_net_handler(&mut self, handler: NetHandler) -> &mut Self {
        *self.handlers.net.lock().unwrap() = Some(handler);
        self
    }

    pub fn set_persist_handler(&mut self, handler: PersistHandler) -> &mut Self {
        *self.handlers.persist.lock().unwrap() = Some(handler);
        self
    }

    /// Register `handler` for messages published to `topic`.
    ///
    /// # Errors
    ///
    /// Returns error if the router rejects `topic` as a key.
    pub fn handle(&self, topic: &str, handler: SubHandler) -> Result<(), Error> {
        self.router.handle(topic, handler)
    }

    #[must_use]
    pub const fn status(&self) -> ClientStatus {
        self.status
    }

    #[must_use]
    pub const fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Spawn one session task per configured server plus the event
    /// dispatch task. `on_connect` is invoked per server with the
    /// handshake outcome.
    ///
    /// # Errors
    ///
    /// Returns error if the client was already started.
    pub fn connect(&mut self, on_connect: ConnectHandler) -> Result<(), Error> {
        if self.status != ClientStatus::Disconnected {
            return Err(Error::new(
                ErrorKind::InvalidClientStatus,
                "Client already started",
            ));
        }
        self.status = ClientStatus::Connecting;
        *self.handlers.connect.lock().unwrap() = Some(on_connect);

        let (event_tx, event_rx) = mpsc::channel(self.options.recv_buf());

        let servers: Vec<String> = self.options.servers().to_vec();
        for server in servers {
            let (cmd_tx, cmd_rx) = mpsc::channel(self.options.send_buf());
            let session = Session::new(
                server,
                self.options.clone(),
                self.tls_config.clone(),
                Arc::clone(&self.allocator),
                Arc::clone(&self.persist),
                Arc::clone(&self.router),
                event_tx.clone(),
                cmd_rx,
                Arc::clone(&self.stopped),
            );
            self.session_senders.push(cmd_tx);
            self.tasks.push(tokio::spawn(session.run()));
        }
        drop(event_tx);

        let handlers = Arc::clone(&self.handlers);
        self.tasks
            .push(tokio::spawn(dispatch_events(event_rx, handlers)));

        self.status = ClientStatus::Connected;
        Ok(())
    }

    /// Publish `payload` to `topic`.
    ///
    /// `QoS` 0 is fire and forget. `QoS` 1 and 2 allocate a packet id,
    /// persist the packet under its send key and follow the ack chain;
    /// the publish handler reports the outcome.
    ///
    /// # Errors
    ///
    /// Returns error if the topic is invalid, the client is not started,
    /// or a session channel is gone.
    pub async fn publish(&self, topic: &str, qos: QoS, payload: &[u8]) -> Result<(), Error> {
        self.check_started()?;
        let mut packet = PublishPacket::new(topic, qos, payload)?;

        if qos != QoS::AtMostOnce {
            let packet_id = self.next_packet_id(&mut packet);
            self.persist_outbound(packet_id, &packet);
        }

        self.send_to_sessions(ClientToSessionCmd::Publish(packet))
            .await
    }

    /// Subscribe to a single topic filter.
    ///
    /// # Errors
    ///
    /// Returns error if the topic filter is invalid, the client is not
    /// started, or a session channel is gone.
    pub async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), Error> {
        self.subscribe_many(&[(topic, qos)]).await
    }

    /// Subscribe to several topic filters with one packet.
    ///
    /// # Errors
    ///
    /// Returns error if some topic filter is invalid, the client is not
    /// started, or a session channel is gone.
    pub async fn subscribe_many(&self, topics: &[(&str, QoS)]) -> Result<(), Error> {
        self.check_started()?;
        let mut packet = SubscribePacket::with_topics(topics, PacketId::new(0))?;
        let packet_id = self
            .allocator
            .next(PendingPacket::Subscribe(packet.clone()));
        packet.set_packet_id(packet_id);
        self.allocator
            .bind(packet_id, PendingPacket::Subscribe(packet.clone()));

        self.send_to_sessions(ClientToSessionCmd::Subscribe(packet))
            .await
    }

    /// Unsubscribe from `topics`. The router registrations are removed
    /// when the broker acknowledges.
    ///
    /// # Errors
    ///
    /// Returns error if some topic filter is invalid, the client is not
    /// started, or a session channel is gone.
    pub async fn unsubscribe(&self, topics: &[&str]) -> Result<(), Error> {
        self.check_started()?;
        let mut packet = UnsubscribePacket::with_topics(topics, PacketId::new(0))?;
        let packet_id = self
            .allocator
            .next(PendingPacket::Unsubscribe(packet.clone()));
        packet.set_packet_id(packet_id);
        self.allocator
            .bind(packet_id, PendingPacket::Unsubscribe(packet.clone()));

        self.send_to_sessions(ClientToSessionCmd::Unsubscribe(packet))
            .await
    }

    /// Block until every session task has finished.
    pub async fn wait(&mut self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.drain(..).collect();
        let _results = join_all(tasks).await;
    }

    /// Stop all sessions and disable reconnection. Idempotent.
    ///
    /// With `force` the sockets are dropped immediately; otherwise each
    /// session writes a Disconnect packet first and closes naturally.
    pub async fn destroy(&mut self, force: bool) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.status = ClientStatus::Disconnecting;

        for sender in &self.session_senders {
            if let Err(err) = sender.send(ClientToSessionCmd::Disconnect { force }).await {
                log::debug!("client: Session already gone: {err}");
            }
        }

        if let Err(err) = self.persist.flush() {
            log::warn!("client: Failed to flush persistence: {err}");
        }
        self.status = ClientStatus::Disconnected;
    }

    fn check_started(&self) -> Result<(), Error> {
        if self.status == ClientStatus::Connected {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::InvalidClientStatus,
                "Client is not started",
            ))
        }
    }

    /// Allocate an id for an outbound publish and rebind the finished
    /// packet so the session engine sees the id it will be acked with.
    fn next_packet_id(&self, packet: &mut PublishPacket) -> PacketId {
        let packet_id = self.allocator.next(PendingPacket::Publish(packet.clone()));
        packet.set_packet_id(packet_id);
        self.allocator
            .bind(packet_id, PendingPacket::Publish(packet.clone()));
        packet_id
    }

    /// Record an outbound `QoS` 1/2 publish before it is transmitted.
    /// Persistence refusals are reported through the persist handler and
    /// do not fail the publish.
    fn persist_outbound(&self, packet_id: PacketId, packet: &PublishPacket) {
        let mut bytes = Vec::new();
        let store_result = match packet.encode(&mut bytes) {
            Ok(_len) => self.persist.store(&send_key(packet_id), &bytes),
            Err(err) => Err(Error::from(err)),
        };
        if let Err(error) = store_result {
            log::warn!("client: Persist of outbound publish failed: {error}");
            let handler = self.handlers.persist.lock().unwrap().clone();
            if let Some(handler) = handler {
                handler(&error);
            }
        }
    }

    async fn send_to_sessions(&self, cmd: ClientToSessionCmd) -> Result<(), Error> {
        for sender in &self.session_senders {
            sender.send(cmd.clone()).await?;
        }
        Ok(())
    }
}

/// Single consumer of the event channel; delivers lifecycle events to the
/// registered application handlers in arrival order.
async fn dispatch_events(mut event_rx: Receiver<SessionToClientCmd>, handlers: Arc<Handlers>) {
    while let Some(event) = event_rx.recv().await {
        match event {
            SessionToClientCmd::ConnectResult { server, code } => {
                let handler = handlers.connect.lock().unwrap().clone();
                if let Some(handler) = handler {
                    handler(&server, code);
                }
            }
            SessionToClientCmd::DialFailed { server, error } => {
                log::warn!("client: Dial to {server} failed: {error}");
                let handler = handlers.connect.lock().unwrap().clone();
                if let Some(handler) = handler {
                    handler(&server, ConnectReturnCode::Reserved);
                }
            }
            SessionToClientCmd::PublishDone { topic, result } => {
                let handler = handlers.publish.lock().unwrap().clone();
                if let Some(handler) = handler {
                    handler(&topic, &result);
                }
            }
            SessionToClientCmd::SubscribeDone { topics, result } => {
                let handler = handlers.subscribe.lock().unwrap().clone();
                if let Some(handler) = handler {
                    handler(&topics, &result);
                }
            }
            SessionToClientCmd::UnsubscribeDone { topics } => {
                let handler = handlers.unsubscribe.lock().unwrap().clone();
                if let Some(handler) = handler {
                    handler(&topics);
                }
            }
            SessionToClientCmd::NetworkError { server, error } => {
                let handler = handlers.net.lock().unwrap().clone();
                if let Some(handler) = handler {
                    handler(&server, &error);
                }
            }
            SessionToClientCmd::PersistFailed { error } => {
                let handler = handlers.persist.lock().unwrap().clone();
                if let Some(handler) = handler {
                    handler(&error);
                }
            }
            SessionToClientCmd::SessionClosed { server } => {
                log::info!("client: Session for {server} closed");
            }
        }
    }
}
