// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! TLS demo: connect to a broker over port 8883 with the system root
//! store and publish one message.

use std::sync::Arc;
use std::time::Duration;

use codec::QoS;
use roost::{AsyncClient, ConnectOptions, LogLevel, TlsOptions};

#[tokio::main]
async fn main() {
    let mut options = ConnectOptions::new("broker.example.com:8883");
    options
        .set_tls(TlsOptions::new("broker.example.com"))
        .set_log_level(LogLevel::Info);

    let mut client = AsyncClient::new(options).unwrap();
    client
        .connect(Arc::new(|server, code| {
            log::info!("Connect to {server}: {code:?}");
        }))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    client
        .publish("t/tls", QoS::AtLeastOnce, b"over tls")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    client.destroy(false).await;
    client.wait().await;
}
