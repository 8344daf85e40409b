// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::v3::{
    ConnectReturnCode, PublishPacket, SubscribePacket, SubscribeTopic, UnsubscribePacket,
};

use crate::error::Error;

/// Requests flowing from the client facade into one session task.
#[derive(Debug, Clone)]
pub enum ClientToSessionCmd {
    Publish(PublishPacket),

    Subscribe(SubscribePacket),

    Unsubscribe(UnsubscribePacket),

    /// Stop the session. With `force` the socket is dropped immediately,
    /// otherwise a Disconnect packet is written first.
    Disconnect { force: bool },
}

/// Lifecycle events flowing from session tasks to the client dispatcher.
#[derive(Debug, Clone)]
pub enum SessionToClientCmd {
    /// Connect handshake finished; the broker answered with `code`.
    ConnectResult {
        server: String,
        code: ConnectReturnCode,
    },

    /// TCP/TLS connect or handshake failed before any ConnectAck.
    DialFailed { server: String, error: Error },

    /// A publish finished, successfully or not. For `QoS` 0 this fires
    /// right after the socket write; for `QoS` 1/2 after the ack chain.
    PublishDone {
        topic: String,
        result: Result<(), Error>,
    },

    /// A subscribe finished; topics carry the granted `QoS` levels.
    SubscribeDone {
        topics: Vec<SubscribeTopic>,
        result: Result<(), Error>,
    },

    /// An unsubscribe was acknowledged.
    UnsubscribeDone { topics: Vec<String> },

    /// Socket broke mid-session.
    NetworkError { server: String, error: Error },

    /// Persistence refused or failed a store; not fatal.
    PersistFailed { error: Error },

    /// The session task exited and will not reconnect.
    SessionClosed { server: String },
}
