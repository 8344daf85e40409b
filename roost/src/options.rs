// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::path::PathBuf;
use std::time::Duration;

use codec::utils::random_client_id;
use codec::QoS;

use crate::log::LogLevel;

/// Channel capacities are clamped into this range.
pub const MIN_BUF_SIZE: usize = 1;
pub const MAX_BUF_SIZE: usize = 1024;

const DEFAULT_BUF_SIZE: usize = 128;

/// The keepalive deadline factor never goes below this value.
pub const MIN_KEEP_ALIVE_FACTOR: f64 = 1.2;

/// Will message published by the broker on the client's behalf when the
/// client disconnects ungracefully.
#[derive(Clone, Debug)]
pub struct WillOptions {
    topic: String,
    qos: QoS,
    retain: bool,
    message: Vec<u8>,
}

impl WillOptions {
    #[must_use]
    pub fn new(topic: &str, qos: QoS, retain: bool, message: &[u8]) -> Self {
        Self {
            topic: topic.to_string(),
            qos,
            retain,
            message: message.to_vec(),
        }
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    #[must_use]
    pub const fn retain(&self) -> bool {
        self.retain
    }

    #[must_use]
    pub fn message(&self) -> &[u8] {
        &self.message
    }
}

/// TLS transport parameters.
///
/// Certificate material is referenced by path; the files are read once
/// while the client is constructed.
#[derive(Clone, Debug, Default)]
pub struct TlsOptions {
    cert_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
    ca_file: Option<PathBuf>,
    server_name: String,
    skip_verify: bool,
}

impl TlsOptions {
    #[must_use]
    pub fn new(server_name: &str) -> Self {
        Self {
            server_name: server_name.to_string(),
            ..Self::default()
        }
    }

    /// Set client certificate and private key files for mutual TLS.
    pub fn set_client_auth(&mut self, cert_file: PathBuf, key_file: PathBuf) -> &mut Self {
        self.cert_file = Some(cert_file);
        self.key_file = Some(key_file);
        self
    }

    /// Set a custom CA file. When unset, the webpki root store is used.
    pub fn set_ca_file(&mut self, ca_file: PathBuf) -> &mut Self {
        self.ca_file = Some(ca_file);
        self
    }

    /// Disable peer certificate verification.
    pub fn set_skip_verify(&mut self, skip_verify: bool) -> &mut Self {
        self.skip_verify = skip_verify;
        self
    }

    #[must_use]
    pub fn cert_file(&self) -> Option<&PathBuf> {
        self.cert_file.as_ref()
    }

    #[must_use]
    pub fn key_file(&self) -> Option<&PathBuf> {
        self.key_file.as_ref()
    }

    #[must_use]
    pub fn ca_file(&self) -> Option<&PathBuf> {
        self.ca_file.as_ref()
    }

    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    #[must_use]
    pub const fn skip_verify(&self) -> bool {
        self.skip_verify
    }
}

/// Reconnect strategy parameters.
#[derive(Clone, Debug)]
pub struct BackoffOptions {
    first_delay: Duration,
    max_delay: Duration,
    factor: f64,
}

impl BackoffOptions {
    #[must_use]
    pub const fn new(first_delay: Duration, max_delay: Duration, factor: f64) -> Self {
        Self {
            first_delay,
            max_delay,
            factor,
        }
    }

    #[must_use]
    pub const fn first_delay(&self) -> Duration {
        self.first_delay
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }

    #[must_use]
    pub const fn factor(&self) -> f64 {
        self.factor
    }
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self {
            first_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
        }
    }
}

/// Client configuration.
///
/// A plain data record; build it with the setter methods and hand it to
/// the client constructor. Persistence and router plug-ins are installed
/// on the client itself since they are not cloneable values.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    /// "host:port" endpoints, one connection worker per entry.
    servers: Vec<String>,

    /// Upper bound for the whole Connect/ConnectAck handshake.
    connect_timeout: Duration,

    keep_alive: Duration,

    keep_alive_factor: f64,

    client_id: String,

    username: String,

    password: Vec<u8>,

    clean_session: bool,

    will: Option<WillOptions>,

    tls: Option<TlsOptions>,

    send_buf: usize,

    recv_buf: usize,

    /// Reconnect strategy; `None` disables reconnection.
    backoff: Option<BackoffOptions>,

    log_level: LogLevel,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            connect_timeout: Duration::from_secs(10),
            keep_alive: Duration::from_secs(60),
            keep_alive_factor: 1.5,
            client_id: random_client_id(),
            username: String::new(),
            password: Vec::new(),
            clean_session: true,
            will: None,
            tls: None,
            send_buf: DEFAULT_BUF_SIZE,
            recv_buf: DEFAULT_BUF_SIZE,
            backoff: None,
            log_level: LogLevel::Silent,
        }
    }
}

impl ConnectOptions {
    /// Create options with one server endpoint.
    #[must_use]
    pub fn new(server: &str) -> Self {
        Self {
            servers: vec![server.to_string()],
            ..Self::default()
        }
    }

    /// Append a server endpoint.
    pub fn add_server(&mut self, server: &str) -> &mut Self {
        self.servers.push(server.to_string());
        self
    }

    #[must_use]
    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn set_connect_timeout(&mut self, connect_timeout: Duration) -> &mut Self {
        self.connect_timeout = connect_timeout;
        self
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Update keepalive interval. Zero disables keepalive pings.
    pub fn set_keep_alive(&mut self, keep_alive: Duration) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Update the ping deadline multiplier, clamped to at least
    /// [`MIN_KEEP_ALIVE_FACTOR`].
    pub fn set_keep_alive_factor(&mut self, factor: f64) -> &mut Self {
        self.keep_alive_factor = factor.max(MIN_KEEP_ALIVE_FACTOR);
        self
    }

    #[must_use]
    pub const fn keep_alive_factor(&self) -> f64 {
        self.keep_alive_factor
    }

    pub fn set_client_id(&mut self, client_id: &str) -> &mut Self {
        self.client_id = client_id.to_string();
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn set_identity(&mut self, username: &str, password: &[u8]) -> &mut Self {
        self.username = username.to_string();
        self.password = password.to_vec();
        self
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &[u8] {
        &self.password
    }

    pub fn set_clean_session(&mut self, clean_session: bool) -> &mut Self {
        self.clean_session = clean_session;
        self
    }

    #[must_use]
    pub const fn clean_session(&self) -> bool {
        self.clean_session
    }

    pub fn set_will(&mut self, will: WillOptions) -> &mut Self {
        self.will = Some(will);
        self
    }

    #[must_use]
    pub const fn will(&self) -> Option<&WillOptions> {
        self.will.as_ref()
    }

    pub fn set_tls(&mut self, tls: TlsOptions) -> &mut Self {
        self.tls = Some(tls);
        self
    }

    #[must_use]
    pub const fn tls(&self) -> Option<&TlsOptions> {
        self.tls.as_ref()
    }

    /// Update capacity of the application send channel, clamped 1..=1024.
    pub fn set_send_buf(&mut self, send_buf: usize) -> &mut Self {
        self.send_buf = send_buf.clamp(MIN_BUF_SIZE, MAX_BUF_SIZE);
        self
    }

    #[must_use]
    pub const fn send_buf(&self) -> usize {
        self.send_buf
    }

    /// Update capacity of the event channel, clamped 1..=1024.
    pub fn set_recv_buf(&mut self, recv_buf: usize) -> &mut Self {
        self.recv_buf = recv_buf.clamp(MIN_BUF_SIZE, MAX_BUF_SIZE);
        self
    }

    #[must_use]
    pub const fn recv_buf(&self) -> usize {
        self.recv_buf
    }

    pub fn set_backoff(&mut self, backoff: Option<BackoffOptions>) -> &mut Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub const fn backoff(&self) -> Option<&BackoffOptions> {
        self.backoff.as_ref()
    }

    pub fn set_log_level(&mut self, log_level: LogLevel) -> &mut Self {
        self.log_level = log_level;
        self
    }

    #[must_use]
    pub const fn log_level(&self) -> LogLevel {
        self.log_level
    }
}
