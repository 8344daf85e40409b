// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::{interval_at, sleep, timeout};
use tokio_rustls::rustls::ClientConfig;

use codec::v3::{
    ConnectAckPacket, ConnectPacket, ConnectReturnCode, DisconnectPacket, Packet,
    PingRequestPacket, PublishAckPacket, PublishCompletePacket, PublishPacket,
    PublishReceivedPacket, PublishReleasePacket, SubscribeAckPacket, SubscribeAck,
    UnsubscribeAckPacket,
};
use codec::{ByteArray, DecodePacket, EncodePacket, PacketId, QoS};

use crate::backoff::Backoff;
use crate::commands::{ClientToSessionCmd, SessionToClientCmd};
use crate::error::{Error, ErrorKind};
use crate::options::ConnectOptions;
use crate::packet_id::{PacketIdAllocator, PendingPacket};
use crate::persist::{recv_key, send_key, Persist};
use crate::router::TopicRouter;
use crate::stream::Stream;
use crate::ClientStatus;

/// How one pass of the connected loop ended.
enum LoopExit {
    /// Client asked to stop; no reconnect.
    Stopped,

    /// Socket or protocol failure; reconnect if backoff is configured.
    ConnectionLost,
}

/// Compute the ping period from the configured keepalive interval.
///
/// Pings fire at three quarters of the keepalive so a response has time
/// to arrive before the broker's own grace period runs out.
#[must_use]
pub fn ping_interval(keep_alive: Duration) -> Duration {
    keep_alive * 3 / 4
}

/// One broker connection: socket loops, keepalive, reconnect backoff and
/// the per-connection `QoS` state machine.
///
/// The session owns its socket exclusively and talks to the rest of the
/// client only through channels: application requests arrive on `cmd_rx`,
/// lifecycle events leave through `event_tx`. Control packets produced by
/// the state machine (acks, pings, disconnect) are written inline by this
/// task, which gives them priority over queued application packets.
pub struct Session {
    server: String,
    options: ConnectOptions,
    tls_config: Option<Arc<ClientConfig>>,
    allocator: Arc<PacketIdAllocator>,
    persist: Arc<dyn Persist>,
    router: Arc<dyn TopicRouter>,
    event_tx: Sender<SessionToClientCmd>,
    cmd_rx: Receiver<ClientToSessionCmd>,
    stopped: Arc<AtomicBool>,

    stream: Stream,
    status: ClientStatus,
    read_buf: Vec<u8>,

    /// Inbound `QoS` 2 publishes acknowledged with PubRec but not yet
    /// released by the broker.
    pub_recv_packets: HashSet<PacketId>,

    /// Inbound `QoS` 1 ids already dispatched on this connection, so a
    /// duplicate does not reach handlers or the wire twice.
    pub_seen_qos1: HashSet<PacketId>,

    /// Armed when a ping is outstanding; elapsing means the broker went
    /// silent and the connection is declared dead.
    ping_deadline: Option<Instant>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        server: String,
        options: ConnectOptions,
        tls_config: Option<Arc<ClientConfig>>,
        allocator: Arc<PacketIdAllocator>,
        persist: Arc<dyn Persist>,
        router: Arc<dyn TopicRouter>,
        event_tx: Sender<SessionToClientCmd>,
        cmd_rx: Receiver<ClientToSessionCmd>,
        stopped: Arc<AtomicBool>,
    ) -> Self {
        Self {
            server,
            options,
            tls_config,
            allocator,
            persist,
            router,
            event_tx,
            cmd_rx,
            stopped,

            stream: Stream::None,
            status: ClientStatus::Disconnected,
            read_buf: Vec::with_capacity(1024),
            pub_recv_packets: HashSet::new(),
            pub_seen_qos1: HashSet::new(),
            ping_deadline: None,
        }
    }

    /// Drive this session until the client destroys it.
    ///
    /// Each iteration runs one connect handshake and, on success, the
    /// connected loop. Exhausting the connection triggers the backoff
    /// sequence; a missing backoff configuration disables reconnection.
    pub async fn run(mut self) {
        let mut backoff = self.options.backoff().map(Backoff::new);

        loop {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }

            match self.connect().await {
                Ok(()) => {
                    if let Some(backoff) = &mut backoff {
                        backoff.reset();
                    }
                    match self.run_loop().await {
                        LoopExit::Stopped => break,
                        LoopExit::ConnectionLost => (),
                    }
                }
                Err(err) => {
                    log::warn!("session: Connect to {} failed: {err}", self.server);
                }
            }

            self.stream.close().await;
            self.status = ClientStatus::Disconnected;

            let Some(backoff) = &mut backoff else {
                break;
            };
            let delay = backoff.next_delay();
            log::info!(
                "session: Reconnect to {} in {delay:?} (attempt {})",
                self.server,
                backoff.attempt()
            );
            let delay_done = sleep(delay);
            tokio::pin!(delay_done);
            let mut stop = false;
            loop {
                tokio::select! {
                    _ = &mut delay_done => break,
                    Some(cmd) = self.cmd_rx.recv() => {
                        if let ClientToSessionCmd::Disconnect { .. } = cmd {
                            stop = true;
                            break;
                        }
                        // Requests sent while offline cannot be served, and
                        // they do not shorten the backoff delay.
                        log::warn!("session: {} is offline, dropped {cmd:?}", self.server);
                    }
                }
            }
            if stop {
                break;
            }
        }

        self.stream.close().await;
        self.emit(SessionToClientCmd::SessionClosed {
            server: self.server.clone(),
        })
        .await;
    }

    /// Dial the broker and run the Connect/ConnectAck handshake under the
    /// configured dial timeout.
    async fn connect(&mut self) -> Result<(), Error> {
        self.status = ClientStatus::Connecting;
        self.read_buf.clear();
        self.ping_deadline = None;
        self.pub_seen_qos1.clear();
        self.pub_recv_packets.clear();

        let handshake = timeout(self.options.connect_timeout(), self.handshake()).await;
        let ack = match handshake {
            Ok(Ok(ack)) => ack,
            Ok(Err(err)) => {
                self.emit(SessionToClientCmd::DialFailed {
                    server: self.server.clone(),
                    error: err.clone(),
                })
                .await;
                return Err(err);
            }
            Err(elapsed) => {
                let err = Error::from(elapsed);
                self.emit(SessionToClientCmd::DialFailed {
                    server: self.server.clone(),
                    error: err.clone(),
                })
                .await;
                return Err(err);
            }
        };

        self.emit(SessionToClientCmd::ConnectResult {
            server: self.server.clone(),
            code: ack.return_code(),
        })
        .await;

        if ack.return_code() != ConnectReturnCode::Accepted {
            return Err(Error::from_string(
                ErrorKind::ProtocolError,
                format!(
                    "Broker {} refused connection: {:?}",
                    self.server,
                    ack.return_code()
                ),
            ));
        }

        self.status = ClientStatus::Connected;
        log::info!("session: Connected to {}", self.server);
        eprintln!("DEBUG connect: status=Connected, clean_session={}", self.options.clean_session());

        if !self.options.clean_session() {
            self.resume_session().await;
        }
        eprintln!("DEBUG connect: returning Ok");
        Ok(())
    }

    /// Open the socket, send Connect, await the first packet which must be
    /// a ConnectAck.
    async fn handshake(&mut self) -> Result<ConnectAckPacket, Error> {
        self.stream = match (&self.tls_config, self.options.tls()) {
            (Some(config), Some(tls_options)) => {
                Stream::connect_tls(
                    &self.server,
                    Arc::clone(config),
                    tls_options.server_name(),
                )
                .await?
            }
            _ => Stream::connect(&self.server).await?,
        };

        let conn_packet = build_connect_packet(&self.options)?;
        self.send_packet(conn_packet).await?;

        loop {
            if let Some(frame_len) = Packet::frame_len(&self.read_buf)? {
                let frame: Vec<u8> = self.read_buf.drain(..frame_len).collect();
                let mut ba = ByteArray::new(&frame);
                let packet = Packet::decode(&mut ba)?;
                return match packet {
                    Packet::ConnectAck(ack) => Ok(ack),
                    other => Err(Error::from_string(
                        ErrorKind::BadPacket,
                        format!(
                            "Expected ConnectAck from {}, got {:?}",
                            self.server,
                            other.packet_type()
                        ),
                    )),
                };
            }

            let n_recv = self.stream.read_buf(&mut self.read_buf).await?;
            if n_recv == 0 {
                return Err(Error::from_string(
                    ErrorKind::NetError,
                    format!("{} closed connection during handshake", self.server),
                ));
            }
        }
    }

    /// The connected loop: reads the socket, drains application requests
    /// and keeps the keepalive timer honest, until the connection dies or
    /// the client stops the session.
    async fn run_loop(&mut self) -> LoopExit {
        eprintln!("DEBUG run_loop entered");
        let keep_alive = self.options.keep_alive();
        let ping_enabled = !keep_alive.is_zero();
        // Zero keepalive disables pings; park the ticker far in the future.
        let period = if ping_enabled {
            ping_interval(keep_alive)
        } else {
            Duration::from_secs(3600 * 24 * 365)
        };
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);

        loop {
            if self.stopped.load(Ordering::SeqCst) {
                self.disconnect_gracefully().await;
                return LoopExit::Stopped;
            }

            tokio::select! {
                read_result = self.stream.read_buf(&mut self.read_buf) => {
                    match read_result {
                        Ok(0) => {
                            self.report_net_error(Error::from_string(
                                ErrorKind::NetError,
                                format!("{} closed connection", self.server),
                            ))
                            .await;
                            return LoopExit::ConnectionLost;
                        }
                        Ok(_n_recv) => {
                            if let Err(err) = self.process_incoming().await {
                                self.report_net_error(err).await;
                                return LoopExit::ConnectionLost;
                            }
                        }
                        Err(err) => {
                            self.report_net_error(err).await;
                            return LoopExit::ConnectionLost;
                        }
                    }
                }

                Some(cmd) = self.cmd_rx.recv() => {
                    match cmd {
                        ClientToSessionCmd::Disconnect { force } => {
                            if !force {
                                self.disconnect_gracefully().await;
                            }
                            return LoopExit::Stopped;
                        }
                        other => self.handle_client_cmd(other).await,
                    }
                }

                _ = ticker.tick(), if ping_enabled => {
                    if let Some(deadline) = self.ping_deadline {
                        if Instant::now() >= deadline {
                            self.report_net_error(Error::from_string(
                                ErrorKind::NetError,
                                format!("{} missed ping response", self.server),
                            ))
                            .await;
                            return LoopExit::ConnectionLost;
                        }
                    }
                    self.ping().await;
                }
            }
        }
    }

    /// Decode every complete packet in the read buffer, leaving a
    /// truncated tail for the next socket read.
    async fn process_incoming(&mut self) -> Result<(), Error> {
        eprintln!("DEBUG process_incoming buf_len={}", self.read_buf.len());
        while let Some(frame_len) = Packet::frame_len(&self.read_buf)? {
            let frame: Vec<u8> = self.read_buf.drain(..frame_len).collect();
            let mut ba = ByteArray::new(&frame);
            let packet = Packet::decode(&mut ba)?;
            eprintln!("DEBUG decoded packet type={:?}", packet.packet_type());
            self.handle_session_packet(packet).await;
        }
        Ok(())
    }

    async fn handle_session_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Publish(publish) => self.on_message(publish).await,
            Packet::PublishAck(ack) => self.on_publish_ack(&ack).await,
            Packet::PublishReceived(received) => self.on_publish_received(&received).await,
            Packet::PublishRelease(release) => self.on_publish_release(&release).await,
            Packet::PublishComplete(complete) => self.on_publish_complete(&complete).await,
            Packet::SubscribeAck(ack) => self.on_subscribe_ack(ack).await,
            Packet::UnsubscribeAck(ack) => self.on_unsubscribe_ack(&ack).await,
            Packet::PingResponse(_pong) => {
                log::trace!("session: Ping response from {}", self.server);
                self.ping_deadline = None;
            }
            other => {
                log::warn!(
                    "session: Unexpected packet from {}: {:?}",
                    self.server,
                    other.packet_type()
                );
            }
        }
    }

    /// Inbound Publish dispatching, with the `QoS` 1/2 receiver half of
    /// the state machine.
    async fn on_message(&mut self, publish: PublishPacket) {
        match publish.qos() {
            QoS::AtMostOnce => {
                self.router.dispatch(&publish);
            }
            QoS::AtLeastOnce => {
                let packet_id = publish.packet_id();
                // A redelivery we already dispatched and acked; the first
                // PubAck is on its way over the same reliable connection.
                if publish.dup() && self.pub_seen_qos1.contains(&packet_id) {
                    log::info!("session: Duplicate QoS 1 publish {packet_id}, ignored");
                    return;
                }
                self.pub_seen_qos1.insert(packet_id);
                self.router.dispatch(&publish);
                self.send_control(PublishAckPacket::new(packet_id)).await;
            }
            QoS::ExactOnce => {
                let packet_id = publish.packet_id();
                eprintln!("DEBUG on_message QoS2 packet_id={packet_id} dup={} contains={}", publish.dup(), self.pub_recv_packets.contains(&packet_id));
                if self.pub_recv_packets.contains(&packet_id) {
                    // Duplicate before PubRel: acknowledge again, do not
                    // dispatch again.
                    self.send_control(PublishReceivedPacket::new(packet_id))
                        .await;
                    return;
                }

                // Persisted before dispatch so a crash between receipt and
                // PubRec cannot lose the exactly-once bookkeeping.
                match encode_to_vec(&publish) {
                    Ok(bytes) => {
                        if let Err(error) = self.persist.store(&recv_key(packet_id), &bytes) {
                            self.emit(SessionToClientCmd::PersistFailed { error }).await;
                        }
                    }
                    Err(error) => {
                        self.emit(SessionToClientCmd::PersistFailed { error }).await;
                    }
                }
                self.pub_recv_packets.insert(packet_id);
                self.router.dispatch(&publish);
                self.send_control(PublishReceivedPacket::new(packet_id))
                    .await;
            }
        }
    }

    async fn on_publish_ack(&mut self, ack: &PublishAckPacket) {
        let packet_id = ack.packet_id();
        match self.allocator.get(packet_id) {
            Some(PendingPacket::Publish(publish)) if publish.qos() == QoS::AtLeastOnce => {
                self.allocator.free(packet_id);
                self.persist.delete(&send_key(packet_id));
                self.emit(SessionToClientCmd::PublishDone {
                    topic: publish.topic().to_string(),
                    result: Ok(()),
                })
                .await;
            }
            _ => log::warn!("session: PubAck {packet_id} matches no QoS 1 publish"),
        }
    }

    /// `PubRec` moves an outbound `QoS` 2 publish into the release phase.
    /// A `PubRec` whose id is not bound to a `QoS` 2 publish is ignored.
    async fn on_publish_received(&mut self, received: &PublishReceivedPacket) {
        let packet_id = received.packet_id();
        match self.allocator.get(packet_id) {
            Some(PendingPacket::Publish(publish)) if publish.qos() == QoS::ExactOnce => {
                let release = PublishReleasePacket::new(packet_id);
                match encode_to_vec(&release) {
                    Ok(bytes) => {
                        if let Err(error) = self.persist.store(&send_key(packet_id), &bytes) {
                            self.emit(SessionToClientCmd::PersistFailed { error }).await;
                        }
                    }
                    Err(error) => {
                        self.emit(SessionToClientCmd::PersistFailed { error }).await;
                    }
                }
                self.send_control(release).await;
            }
            _ => log::warn!("session: PubRec {packet_id} matches no QoS 2 publish"),
        }
    }

    async fn on_publish_release(&mut self, release: &PublishReleasePacket) {
        let packet_id = release.packet_id();
        self.send_control(PublishCompletePacket::new(packet_id)).await;
        self.persist.delete(&recv_key(packet_id));
        self.pub_recv_packets.remove(&packet_id);
    }

    async fn on_publish_complete(&mut self, complete: &PublishCompletePacket) {
        let packet_id = complete.packet_id();
        match self.allocator.free(packet_id) {
            Some(PendingPacket::Publish(publish)) => {
                self.persist.delete(&send_key(packet_id));
                self.emit(SessionToClientCmd::PublishDone {
                    topic: publish.topic().to_string(),
                    result: Ok(()),
                })
                .await;
            }
            _ => log::warn!("session: PubComp {packet_id} matches no QoS 2 publish"),
        }
    }

    /// Overwrite each requested topic's `QoS` with the granted level,
    /// truncated at the request count, then report the final list.
    async fn on_subscribe_ack(&mut self, ack: SubscribeAckPacket) {
        let packet_id = ack.packet_id();
        let Some(PendingPacket::Subscribe(mut subscribe)) = self.allocator.free(packet_id)
        else {
            log::warn!("session: SubAck {packet_id} matches no subscribe");
            return;
        };

        let mut failed = 0;
        {
            let topics = subscribe.mut_topics();
            for (index, granted) in ack.acknowledgements().iter().enumerate() {
                if index >= topics.len() {
                    break;
                }
                match granted {
                    SubscribeAck::QoS(qos) => {
                        topics[index].set_qos(*qos);
                    }
                    SubscribeAck::Failed => failed += 1,
                }
            }
        }

        let result = if failed == 0 {
            Ok(())
        } else {
            Err(Error::from_string(
                ErrorKind::ProtocolError,
                format!("{failed} subscription(s) rejected by {}", self.server),
            ))
        };
        self.emit(SessionToClientCmd::SubscribeDone {
            topics: subscribe.topics().to_vec(),
            result,
        })
        .await;
    }

    async fn on_unsubscribe_ack(&mut self, ack: &UnsubscribeAckPacket) {
        let packet_id = ack.packet_id();
        let Some(PendingPacket::Unsubscribe(unsubscribe)) = self.allocator.free(packet_id)
        else {
            log::warn!("session: UnsubAck {packet_id} matches no unsubscribe");
            return;
        };

        let topics: Vec<String> = unsubscribe
            .topics()
            .iter()
            .map(|topic| topic.as_ref().to_string())
            .collect();
        for topic in &topics {
            self.router.remove(topic);
        }
        self.emit(SessionToClientCmd::UnsubscribeDone { topics }).await;
    }

    async fn handle_client_cmd(&mut self, cmd: ClientToSessionCmd) {
        match cmd {
            ClientToSessionCmd::Publish(publish) => {
                let qos = publish.qos();
                let topic = publish.topic().to_string();
                let sent = self.send_app(publish).await;
                if sent && qos == QoS::AtMostOnce {
                    // Fire and forget: success is the write itself.
                    self.emit(SessionToClientCmd::PublishDone {
                        topic,
                        result: Ok(()),
                    })
                    .await;
                }
            }
            ClientToSessionCmd::Subscribe(subscribe) => {
                let _sent = self.send_app(subscribe).await;
            }
            ClientToSessionCmd::Unsubscribe(unsubscribe) => {
                let _sent = self.send_app(unsubscribe).await;
            }
            // Handled by the caller.
            ClientToSessionCmd::Disconnect { .. } => (),
        }
    }

    /// Walk persistence and retransmit unacknowledged outbound state with
    /// the duplicate flag set. Inbound `R` receipts only reseed the
    /// exactly-once set; the broker drives their completion with PubRel.
    async fn resume_session(&mut self) {
        let mut outbound = Vec::new();
        let mut inbound_ids = Vec::new();
        self.persist.range(&mut |key, packet| {
            if key.starts_with('S') {
                outbound.push(packet.to_vec());
            } else if let Some(id) = key.strip_prefix('R').and_then(|raw| raw.parse().ok()) {
                inbound_ids.push(PacketId::new(id));
            }
            true
        });

        for packet_id in inbound_ids {
            self.pub_recv_packets.insert(packet_id);
        }

        for bytes in outbound {
            let mut ba = ByteArray::new(&bytes);
            match Packet::decode(&mut ba) {
                Ok(Packet::Publish(mut publish)) => {
                    if publish.set_dup(true).is_err() {
                        continue;
                    }
                    log::info!(
                        "session: Retransmit publish {} to {}",
                        publish.packet_id(),
                        self.server
                    );
                    self.send_control(publish).await;
                }
                Ok(Packet::PublishRelease(release)) => {
                    log::info!(
                        "session: Retransmit release {} to {}",
                        release.packet_id(),
                        self.server
                    );
                    self.send_control(release).await;
                }
                Ok(other) => {
                    log::warn!(
                        "session: Unexpected persisted packet: {:?}",
                        other.packet_type()
                    );
                }
                Err(err) => log::warn!("session: Corrupt persisted packet: {err:?}"),
            }
        }
    }

    async fn ping(&mut self) {
        log::trace!("session: Ping {}", self.server);
        self.send_control(PingRequestPacket::new()).await;
        if self.ping_deadline.is_none() {
            let grace = self
                .options
                .keep_alive()
                .mul_f64(self.options.keep_alive_factor());
            self.ping_deadline = Some(Instant::now() + grace);
        }
    }

    async fn disconnect_gracefully(&mut self) {
        if self.status == ClientStatus::Connected {
            self.status = ClientStatus::Disconnecting;
            self.send_control(DisconnectPacket::new()).await;
        }
        self.stream.close().await;
        self.status = ClientStatus::Disconnected;
    }

    async fn send_packet<P: EncodePacket>(&mut self, packet: P) -> Result<(), Error> {
        let mut buf = Vec::new();
        packet.encode(&mut buf)?;
        self.stream.write_all(&buf).await
    }

    /// Write a control packet produced by the state machine.
    ///
    /// Write errors are swallowed here; the receive loop observes the
    /// broken socket and reports it once, avoiding duplicate error
    /// delivery.
    async fn send_control<P: EncodePacket>(&mut self, packet: P) {
        if let Err(err) = self.send_packet(packet).await {
            log::warn!("session: Write to {} failed: {err}", self.server);
        }
    }

    /// Write an application packet drained from the command channel.
    /// Returns false if the write failed.
    async fn send_app<P: EncodePacket>(&mut self, packet: P) -> bool {
        match self.send_packet(packet).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!("session: Write to {} failed: {err}", self.server);
                false
            }
        }
    }

    async fn report_net_error(&mut self, error: Error) {
        log::warn!("session: {}", error);
        self.emit(SessionToClientCmd::NetworkError {
            server: self.server.clone(),
            error,
        })
        .await;
    }

    async fn emit(&self, event: SessionToClientCmd) {
        if let Err(err) = self.event_tx.send(event).await {
            log::error!("session: Event channel closed: {err}");
        }
    }
}

/// Build the Connect packet from client options.
///
/// # Errors
///
/// Returns error if the client id, identity or will fields are invalid.
pub fn build_connect_packet(options: &ConnectOptions) -> Result<ConnectPacket, Error> {
    let mut packet = ConnectPacket::new(options.client_id())?;
    packet.set_clean_session(options.clean_session());

    #[allow(clippy::cast_possible_truncation)]
    let keep_alive = options.keep_alive().as_secs().min(u64::from(u16::MAX)) as u16;
    packet.set_keep_alive(keep_alive);

    if !options.username().is_empty() {
        packet.set_username(options.username())?;
    }
    if !options.password().is_empty() {
        packet.set_password(options.password())?;
    }
    if let Some(will) = options.will() {
        packet.set_will(will.topic(), will.qos(), will.retain(), will.message())?;
    }
    Ok(packet)
}

fn encode_to_vec<P: EncodePacket>(packet: &P) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    packet.encode(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::WillOptions;

    #[test]
    fn test_ping_interval() {
        assert_eq!(
            ping_interval(Duration::from_secs(60)),
            Duration::from_secs(45)
        );
        assert_eq!(
            ping_interval(Duration::from_secs(10)),
            Duration::from_millis(7500)
        );
    }

    #[test]
    fn test_build_connect_packet() {
        let mut options = ConnectOptions::new("127.0.0.1:1883");
        options
            .set_client_id("c1")
            .set_clean_session(false)
            .set_keep_alive(Duration::from_secs(30))
            .set_identity("user", b"pass");
        options.set_will(WillOptions::new("t/will", QoS::AtLeastOnce, true, b"bye"));

        let packet = build_connect_packet(&options).unwrap();
        assert_eq!(packet.client_id(), "c1");
        assert_eq!(packet.keep_alive(), 30);
        assert!(!packet.connect_flags().clean_session());
        assert!(packet.connect_flags().will());
        assert!(packet.connect_flags().will_retain());
        assert_eq!(packet.will_topic(), Some("t/will"));
        assert_eq!(packet.username(), "user");
    }

    #[test]
    fn test_keep_alive_seconds_clamped() {
        let mut options = ConnectOptions::new("127.0.0.1:1883");
        options.set_keep_alive(Duration::from_secs(1_000_000));
        let packet = build_connect_packet(&options).unwrap();
        assert_eq!(packet.keep_alive(), u16::MAX);
    }
}
