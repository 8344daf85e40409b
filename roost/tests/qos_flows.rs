// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Session flows against a scripted broker on a local TCP socket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use codec::v3::{
    ConnectAckPacket, ConnectReturnCode, Packet, PublishAckPacket, PublishPacket,
    PublishReleasePacket, SubscribeAck, SubscribeAckPacket,
};
use codec::{ByteArray, DecodePacket, EncodePacket, PacketId, QoS};
use roost::persist::{MemoryPersist, PersistStrategy};
use roost::{AsyncClient, ConnectOptions, LogLevel};

const WAIT: Duration = Duration::from_secs(5);

async fn read_packet(socket: &mut TcpStream, buf: &mut Vec<u8>) -> Packet {
    loop {
        if let Some(frame_len) = Packet::frame_len(buf).unwrap() {
            let frame: Vec<u8> = buf.drain(..frame_len).collect();
            let mut ba = ByteArray::new(&frame);
            return Packet::decode(&mut ba).unwrap();
        }
        let n_recv = socket.read_buf(buf).await.unwrap();
        assert!(n_recv > 0, "client closed connection early");
    }
}

async fn write_packet<P: EncodePacket>(socket: &mut TcpStream, packet: &P) {
    let mut bytes = Vec::new();
    packet.encode(&mut bytes).unwrap();
    socket.write_all(&bytes).await.unwrap();
}

fn test_options(server: &str) -> ConnectOptions {
    let mut options = ConnectOptions::new(server);
    options
        .set_client_id("c1")
        .set_keep_alive(Duration::ZERO)
        .set_log_level(LogLevel::Silent);
    options
}

fn connected_client(
    server: &str,
    persist: Arc<MemoryPersist>,
) -> (AsyncClient, mpsc::UnboundedReceiver<ConnectReturnCode>) {
    let mut client = AsyncClient::new(test_options(server)).unwrap();
    client.set_persist(persist);

    let (conn_tx, conn_rx) = mpsc::unbounded_channel();
    client
        .connect(Arc::new(move |_server, code| {
            let _ret = conn_tx.send(code);
        }))
        .unwrap();
    (client, conn_rx)
}

#[tokio::test]
async fn test_qos1_publish_ack_chain() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap().to_string();

    let broker = tokio::spawn(async move {
        let (mut socket, _peer) = listener.accept().await.unwrap();
        let mut buf = Vec::new();

        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::Connect(_)));
        write_packet(
            &mut socket,
            &ConnectAckPacket::new(false, ConnectReturnCode::Accepted),
        )
        .await;

        let Packet::Publish(publish) = read_packet(&mut socket, &mut buf).await else {
            panic!("expected publish");
        };
        assert_eq!(publish.qos(), QoS::AtLeastOnce);
        assert_eq!(publish.topic(), "t/b");
        assert_eq!(publish.message(), b"hi");
        assert_ne!(publish.packet_id().value(), 0);
        write_packet(&mut socket, &PublishAckPacket::new(publish.packet_id())).await;

        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::Disconnect(_)));
    });

    let persist = Arc::new(MemoryPersist::new(PersistStrategy::default()));
    let (mut client, mut conn_rx) = connected_client(&server, Arc::clone(&persist));

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    client.set_publish_handler(Arc::new(move |topic, result| {
        let _ret = done_tx.send((topic.to_string(), result.is_ok()));
    }));

    let code = timeout(WAIT, conn_rx.recv()).await.unwrap().unwrap();
    assert_eq!(code, ConnectReturnCode::Accepted);

    client.publish("t/b", QoS::AtLeastOnce, b"hi").await.unwrap();

    let (topic, ok) = timeout(WAIT, done_rx.recv()).await.unwrap().unwrap();
    assert_eq!(topic, "t/b");
    assert!(ok);
    // The in-flight entry is gone once the ack chain completed.
    assert!(persist.is_empty());

    client.destroy(false).await;
    broker.await.unwrap();
    client.wait().await;
}

#[tokio::test]
async fn test_qos2_publish_release_chain() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap().to_string();

    let broker = tokio::spawn(async move {
        let (mut socket, _peer) = listener.accept().await.unwrap();
        let mut buf = Vec::new();

        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::Connect(_)));
        write_packet(
            &mut socket,
            &ConnectAckPacket::new(false, ConnectReturnCode::Accepted),
        )
        .await;

        let Packet::Publish(publish) = read_packet(&mut socket, &mut buf).await else {
            panic!("expected publish");
        };
        assert_eq!(publish.qos(), QoS::ExactOnce);
        let packet_id = publish.packet_id();
        write_packet(
            &mut socket,
            &codec::v3::PublishReceivedPacket::new(packet_id),
        )
        .await;

        let Packet::PublishRelease(release) = read_packet(&mut socket, &mut buf).await else {
            panic!("expected publish release");
        };
        assert_eq!(release.packet_id(), packet_id);
        write_packet(
            &mut socket,
            &codec::v3::PublishCompletePacket::new(packet_id),
        )
        .await;

        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::Disconnect(_)));
    });

    let persist = Arc::new(MemoryPersist::new(PersistStrategy::default()));
    let (mut client, mut conn_rx) = connected_client(&server, Arc::clone(&persist));

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    client.set_publish_handler(Arc::new(move |topic, result| {
        let _ret = done_tx.send((topic.to_string(), result.is_ok()));
    }));

    let code = timeout(WAIT, conn_rx.recv()).await.unwrap().unwrap();
    assert_eq!(code, ConnectReturnCode::Accepted);

    client.publish("t/c", QoS::ExactOnce, b"x").await.unwrap();

    let (topic, ok) = timeout(WAIT, done_rx.recv()).await.unwrap().unwrap();
    assert_eq!(topic, "t/c");
    assert!(ok);
    // No send-key entry may remain after PubComp.
    assert!(persist.is_empty());

    client.destroy(false).await;
    broker.await.unwrap();
    client.wait().await;
}

#[tokio::test]
async fn test_inbound_qos2_duplicate_dispatched_once() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap().to_string();

    let broker = tokio::spawn(async move {
        let (mut socket, _peer) = listener.accept().await.unwrap();
        let mut buf = Vec::new();

        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::Connect(_)));
        write_packet(
            &mut socket,
            &ConnectAckPacket::new(false, ConnectReturnCode::Accepted),
        )
        .await;

        let packet_id = PacketId::new(9);
        let mut publish = PublishPacket::new("t/q2", QoS::ExactOnce, b"x").unwrap();
        publish.set_packet_id(packet_id);
        write_packet(&mut socket, &publish).await;

        let Packet::PublishReceived(received) = read_packet(&mut socket, &mut buf).await else {
            panic!("expected publish received");
        };
        assert_eq!(received.packet_id(), packet_id);

        // Redeliver before releasing; the client must re-ack but not
        // re-dispatch.
        publish.set_dup(true).unwrap();
        write_packet(&mut socket, &publish).await;

        let Packet::PublishReceived(received) = read_packet(&mut socket, &mut buf).await else {
            panic!("expected second publish received");
        };
        assert_eq!(received.packet_id(), packet_id);

        write_packet(&mut socket, &PublishReleasePacket::new(packet_id)).await;

        let Packet::PublishComplete(complete) = read_packet(&mut socket, &mut buf).await else {
            panic!("expected publish complete");
        };
        assert_eq!(complete.packet_id(), packet_id);
    });

    let persist = Arc::new(MemoryPersist::new(PersistStrategy::default()));
    let (mut client, mut conn_rx) = connected_client(&server, Arc::clone(&persist));

    let dispatched = Arc::new(AtomicUsize::new(0));
    {
        let dispatched = Arc::clone(&dispatched);
        client
            .handle(
                "t/q2",
                Arc::new(move |_topic, _qos, payload| {
                    assert_eq!(payload, b"x");
                    dispatched.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
    }

    let code = timeout(WAIT, conn_rx.recv()).await.unwrap().unwrap();
    assert_eq!(code, ConnectReturnCode::Accepted);

    timeout(WAIT, broker).await.unwrap().unwrap();
    assert_eq!(dispatched.load(Ordering::SeqCst), 1);
    // The receipt entry is deleted after the release handshake.
    assert!(persist.is_empty());

    client.destroy(true).await;
    client.wait().await;
}

#[tokio::test]
async fn test_subscribe_granted_qos() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap().to_string();

    let broker = tokio::spawn(async move {
        let (mut socket, _peer) = listener.accept().await.unwrap();
        let mut buf = Vec::new();

        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::Connect(_)));
        write_packet(
            &mut socket,
            &ConnectAckPacket::new(false, ConnectReturnCode::Accepted),
        )
        .await;

        let Packet::Subscribe(subscribe) = read_packet(&mut socket, &mut buf).await else {
            panic!("expected subscribe");
        };
        assert_eq!(subscribe.topics().len(), 2);
        write_packet(
            &mut socket,
            &SubscribeAckPacket::with_vec(
                subscribe.packet_id(),
                vec![
                    SubscribeAck::QoS(QoS::AtMostOnce),
                    SubscribeAck::QoS(QoS::AtLeastOnce),
                ],
            ),
        )
        .await;

        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::Disconnect(_)));
    });

    let persist = Arc::new(MemoryPersist::new(PersistStrategy::default()));
    let (mut client, mut conn_rx) = connected_client(&server, Arc::clone(&persist));

    let (sub_tx, mut sub_rx) = mpsc::unbounded_channel();
    client.set_subscribe_handler(Arc::new(move |topics, result| {
        let granted: Vec<(String, QoS)> = topics
            .iter()
            .map(|topic| (topic.topic().to_string(), topic.qos()))
            .collect();
        let _ret = sub_tx.send((granted, result.is_ok()));
    }));

    let code = timeout(WAIT, conn_rx.recv()).await.unwrap().unwrap();
    assert_eq!(code, ConnectReturnCode::Accepted);

    client
        .subscribe_many(&[("t/a", QoS::AtMostOnce), ("t/b", QoS::AtLeastOnce)])
        .await
        .unwrap();

    let (granted, ok) = timeout(WAIT, sub_rx.recv()).await.unwrap().unwrap();
    assert!(ok);
    assert_eq!(
        granted,
        [
            ("t/a".to_string(), QoS::AtMostOnce),
            ("t/b".to_string(), QoS::AtLeastOnce),
        ]
    );

    client.destroy(false).await;
    broker.await.unwrap();
    client.wait().await;
}

#[tokio::test]
async fn test_inbound_qos1_duplicate_dispatched_once() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap().to_string();

    let broker = tokio::spawn(async move {
        let (mut socket, _peer) = listener.accept().await.unwrap();
        let mut buf = Vec::new();

        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::Connect(_)));
        write_packet(
            &mut socket,
            &ConnectAckPacket::new(false, ConnectReturnCode::Accepted),
        )
        .await;

        let packet_id = PacketId::new(5);
        let mut publish = PublishPacket::new("t/q1", QoS::AtLeastOnce, b"hi").unwrap();
        publish.set_packet_id(packet_id);
        write_packet(&mut socket, &publish).await;
        // Redelivery of the same id.
        publish.set_dup(true).unwrap();
        write_packet(&mut socket, &publish).await;
        // A different id must still get through.
        let mut second = PublishPacket::new("t/q1", QoS::AtLeastOnce, b"hi").unwrap();
        second.set_packet_id(PacketId::new(6));
        write_packet(&mut socket, &second).await;

        // Exactly one ack for the duplicated id, then one for the new id.
        let Packet::PublishAck(ack) = read_packet(&mut socket, &mut buf).await else {
            panic!("expected publish ack");
        };
        assert_eq!(ack.packet_id(), packet_id);
        let Packet::PublishAck(ack) = read_packet(&mut socket, &mut buf).await else {
            panic!("expected second publish ack");
        };
        assert_eq!(ack.packet_id(), PacketId::new(6));
    });

    let persist = Arc::new(MemoryPersist::new(PersistStrategy::default()));
    let (mut client, mut conn_rx) = connected_client(&server, Arc::clone(&persist));

    let dispatched = Arc::new(AtomicUsize::new(0));
    {
        let dispatched = Arc::clone(&dispatched);
        client
            .handle(
                "t/q1",
                Arc::new(move |_topic, _qos, _payload| {
                    dispatched.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
    }

    let code = timeout(WAIT, conn_rx.recv()).await.unwrap().unwrap();
    assert_eq!(code, ConnectReturnCode::Accepted);

    timeout(WAIT, broker).await.unwrap().unwrap();
    // One dispatch for id 5, one for id 6.
    assert_eq!(dispatched.load(Ordering::SeqCst), 2);

    client.destroy(true).await;
    client.wait().await;
}

#[tokio::test]
async fn test_keepalive_ping_cadence() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap().to_string();

    let broker = tokio::spawn(async move {
        let (mut socket, _peer) = listener.accept().await.unwrap();
        let mut buf = Vec::new();

        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::Connect(_)));
        write_packet(
            &mut socket,
            &ConnectAckPacket::new(false, ConnectReturnCode::Accepted),
        )
        .await;

        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::PingRequest(_)));
        let first = std::time::Instant::now();
        write_packet(&mut socket, &codec::v3::PingResponsePacket::new()).await;

        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::PingRequest(_)));
        let spacing = first.elapsed();
        write_packet(&mut socket, &codec::v3::PingResponsePacket::new()).await;

        // Pings fire at three quarters of the keepalive interval.
        assert!(spacing >= Duration::from_millis(200), "spacing {spacing:?}");
        assert!(spacing <= Duration::from_millis(500), "spacing {spacing:?}");
    });

    let mut options = ConnectOptions::new(&server);
    options
        .set_client_id("c1")
        .set_keep_alive(Duration::from_millis(400))
        .set_log_level(LogLevel::Silent);
    let mut client = AsyncClient::new(options).unwrap();

    let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();
    client
        .connect(Arc::new(move |_server, code| {
            let _ret = conn_tx.send(code);
        }))
        .unwrap();

    let code = timeout(WAIT, conn_rx.recv()).await.unwrap().unwrap();
    assert_eq!(code, ConnectReturnCode::Accepted);

    timeout(WAIT, broker).await.unwrap().unwrap();
    client.destroy(true).await;
    client.wait().await;
}

#[tokio::test]
async fn test_reconnect_after_connection_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap().to_string();

    let broker = tokio::spawn(async move {
        // First connection is dropped right after the handshake.
        let (mut socket, _peer) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::Connect(_)));
        write_packet(
            &mut socket,
            &ConnectAckPacket::new(false, ConnectReturnCode::Accepted),
        )
        .await;
        drop(socket);

        // The client comes back after the first backoff delay.
        let (mut socket, _peer) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::Connect(_)));
        write_packet(
            &mut socket,
            &ConnectAckPacket::new(false, ConnectReturnCode::Accepted),
        )
        .await;
    });

    let mut options = ConnectOptions::new(&server);
    options
        .set_client_id("c1")
        .set_keep_alive(Duration::ZERO)
        .set_backoff(Some(roost::BackoffOptions::new(
            Duration::from_millis(50),
            Duration::from_millis(200),
            2.0,
        )))
        .set_log_level(LogLevel::Silent);
    let mut client = AsyncClient::new(options).unwrap();

    let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();
    client
        .connect(Arc::new(move |_server, code| {
            let _ret = conn_tx.send(code);
        }))
        .unwrap();

    let code = timeout(WAIT, conn_rx.recv()).await.unwrap().unwrap();
    assert_eq!(code, ConnectReturnCode::Accepted);
    // Second accepted handshake proves the reconnect path works.
    let code = timeout(WAIT, conn_rx.recv()).await.unwrap().unwrap();
    assert_eq!(code, ConnectReturnCode::Accepted);

    timeout(WAIT, broker).await.unwrap().unwrap();
    client.destroy(true).await;
    client.wait().await;
}

#[tokio::test]
async fn test_qos0_publish_reports_after_write() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap().to_string();

    let broker = tokio::spawn(async move {
        let (mut socket, _peer) = listener.accept().await.unwrap();
        let mut buf = Vec::new();

        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::Connect(_)));
        write_packet(
            &mut socket,
            &ConnectAckPacket::new(false, ConnectReturnCode::Accepted),
        )
        .await;

        let Packet::Publish(publish) = read_packet(&mut socket, &mut buf).await else {
            panic!("expected publish");
        };
        assert_eq!(publish.qos(), QoS::AtMostOnce);
        assert_eq!(publish.packet_id().value(), 0);
    });

    let persist = Arc::new(MemoryPersist::new(PersistStrategy::default()));
    let (mut client, mut conn_rx) = connected_client(&server, Arc::clone(&persist));

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    client.set_publish_handler(Arc::new(move |topic, result| {
        let _ret = done_tx.send((topic.to_string(), result.is_ok()));
    }));

    let code = timeout(WAIT, conn_rx.recv()).await.unwrap().unwrap();
    assert_eq!(code, ConnectReturnCode::Accepted);

    client.publish("t/a", QoS::AtMostOnce, b"fire").await.unwrap();

    // No broker ack is involved; the event fires once the write is done.
    let (topic, ok) = timeout(WAIT, done_rx.recv()).await.unwrap().unwrap();
    assert_eq!(topic, "t/a");
    assert!(ok);
    // Nothing was persisted for a QoS 0 publish.
    assert!(persist.is_empty());

    timeout(WAIT, broker).await.unwrap().unwrap();
    client.destroy(true).await;
    client.wait().await;
}

#[tokio::test]
async fn test_unsubscribe_removes_router_entry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap().to_string();

    let broker = tokio::spawn(async move {
        let (mut socket, _peer) = listener.accept().await.unwrap();
        let mut buf = Vec::new();

        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::Connect(_)));
        write_packet(
            &mut socket,
            &ConnectAckPacket::new(false, ConnectReturnCode::Accepted),
        )
        .await;

        let Packet::Subscribe(subscribe) = read_packet(&mut socket, &mut buf).await else {
            panic!("expected subscribe");
        };
        write_packet(
            &mut socket,
            &SubscribeAckPacket::new(subscribe.packet_id(), SubscribeAck::QoS(QoS::AtMostOnce)),
        )
        .await;

        let Packet::Unsubscribe(unsubscribe) = read_packet(&mut socket, &mut buf).await else {
            panic!("expected unsubscribe");
        };
        write_packet(
            &mut socket,
            &codec::v3::UnsubscribeAckPacket::new(unsubscribe.packet_id()),
        )
        .await;

        // Published after the unsubscribe was acknowledged; the handler
        // registration must be gone by the time this is dispatched.
        let publish = PublishPacket::new("t/gone", QoS::AtMostOnce, b"late").unwrap();
        write_packet(&mut socket, &publish).await;
    });

    let persist = Arc::new(MemoryPersist::new(PersistStrategy::default()));
    let (mut client, mut conn_rx) = connected_client(&server, Arc::clone(&persist));

    let dispatched = Arc::new(AtomicUsize::new(0));
    {
        let dispatched = Arc::clone(&dispatched);
        client
            .handle(
                "t/gone",
                Arc::new(move |_topic, _qos, _payload| {
                    dispatched.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
    }

    let (unsub_tx, mut unsub_rx) = mpsc::unbounded_channel();
    client.set_unsubscribe_handler(Arc::new(move |topics| {
        let _ret = unsub_tx.send(topics.to_vec());
    }));

    let code = timeout(WAIT, conn_rx.recv()).await.unwrap().unwrap();
    assert_eq!(code, ConnectReturnCode::Accepted);

    client.subscribe("t/gone", QoS::AtMostOnce).await.unwrap();
    client.unsubscribe(&["t/gone"]).await.unwrap();

    let topics = timeout(WAIT, unsub_rx.recv()).await.unwrap().unwrap();
    assert_eq!(topics, ["t/gone".to_string()]);

    timeout(WAIT, broker).await.unwrap().unwrap();
    // Give the session a moment to process the late publish.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(dispatched.load(Ordering::SeqCst), 0);

    client.destroy(true).await;
    client.wait().await;
}

#[tokio::test]
async fn test_qos1_retransmit_with_dup_after_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap().to_string();

    let broker = tokio::spawn(async move {
        // First connection: swallow the publish and drop the socket
        // without acking it.
        let (mut socket, _peer) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::Connect(_)));
        write_packet(
            &mut socket,
            &ConnectAckPacket::new(false, ConnectReturnCode::Accepted),
        )
        .await;
        let Packet::Publish(publish) = read_packet(&mut socket, &mut buf).await else {
            panic!("expected publish");
        };
        assert!(!publish.dup());
        let packet_id = publish.packet_id();
        drop(socket);

        // Second connection: the unacknowledged publish comes back with
        // the dup flag set and the same id.
        let (mut socket, _peer) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let packet = read_packet(&mut socket, &mut buf).await;
        assert!(matches!(packet, Packet::Connect(_)));
        write_packet(
            &mut socket,
            &ConnectAckPacket::new(true, ConnectReturnCode::Accepted),
        )
        .await;
        let Packet::Publish(publish) = read_packet(&mut socket, &mut buf).await else {
            panic!("expected retransmitted publish");
        };
        assert!(publish.dup());
        assert_eq!(publish.packet_id(), packet_id);
        assert_eq!(publish.message(), b"hi");
        write_packet(&mut socket, &PublishAckPacket::new(packet_id)).await;
    });

    let mut options = ConnectOptions::new(&server);
    options
        .set_client_id("c1")
        .set_clean_session(false)
        .set_keep_alive(Duration::ZERO)
        .set_backoff(Some(roost::BackoffOptions::new(
            Duration::from_millis(50),
            Duration::from_millis(200),
            2.0,
        )))
        .set_log_level(LogLevel::Silent);
    let mut client = AsyncClient::new(options).unwrap();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    client.set_publish_handler(Arc::new(move |topic, result| {
        let _ret = done_tx.send((topic.to_string(), result.is_ok()));
    }));

    let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();
    client
        .connect(Arc::new(move |_server, code| {
            let _ret = conn_tx.send(code);
        }))
        .unwrap();

    let code = timeout(WAIT, conn_rx.recv()).await.unwrap().unwrap();
    assert_eq!(code, ConnectReturnCode::Accepted);

    client.publish("t/b", QoS::AtLeastOnce, b"hi").await.unwrap();

    // The ack only ever arrives on the second connection.
    let (topic, ok) = timeout(WAIT, done_rx.recv()).await.unwrap().unwrap();
    assert_eq!(topic, "t/b");
    assert!(ok);

    timeout(WAIT, broker).await.unwrap().unwrap();
    client.destroy(true).await;
    client.wait().await;
}
