// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Plain TCP demo against a local broker: subscribe, publish at every
//! `QoS` level and watch the events arrive.

use std::sync::Arc;
use std::time::Duration;

use codec::QoS;
use roost::{AsyncClient, BackoffOptions, ConnectOptions, LogLevel};

#[tokio::main]
async fn main() {
    let mut options = ConnectOptions::new("127.0.0.1:1883");
    options
        .set_client_id("c1")
        .set_clean_session(true)
        .set_keep_alive(Duration::from_secs(30))
        .set_backoff(Some(BackoffOptions::new(
            Duration::from_secs(1),
            Duration::from_secs(10),
            2.0,
        )))
        .set_log_level(LogLevel::Info);

    let mut client = AsyncClient::new(options).unwrap();

    client
        .handle(
            "t/b",
            Arc::new(|topic, qos, payload| {
                log::info!(
                    "Got message on {topic} at {qos:?}: {:?}",
                    String::from_utf8_lossy(payload)
                );
            }),
        )
        .unwrap();

    client.set_publish_handler(Arc::new(|topic, result| {
        log::info!("Publish to {topic} finished: {result:?}");
    }));
    client.set_subscribe_handler(Arc::new(|topics, result| {
        log::info!("Subscribed {topics:?}: {result:?}");
    }));

    client
        .connect(Arc::new(|server, code| {
            log::info!("Connect to {server}: {code:?}");
        }))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;

    client
        .subscribe_many(&[("t/a", QoS::AtMostOnce), ("t/b", QoS::AtLeastOnce)])
        .await
        .unwrap();
    client.publish("t/b", QoS::AtLeastOnce, b"hi").await.unwrap();
    client.publish("t/c", QoS::ExactOnce, b"x").await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    client.destroy(false).await;
    client.wait().await;
}
