// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{ClientConfig, ServerName};
use tokio_rustls::TlsConnector;

use crate::error::{Error, ErrorKind};

/// Each Stream represents a duplex socket connection to one broker.
#[derive(Debug)]
pub enum Stream {
    /// Not connected.
    None,
    Mqtt(TcpStream),
    Mqtts(Box<TlsStream<TcpStream>>),
}

impl Stream {
    /// Open a plain TCP connection to `server` ("host:port").
    ///
    /// # Errors
    ///
    /// Returns error if the TCP connect fails.
    pub async fn connect(server: &str) -> Result<Self, Error> {
        let socket = TcpStream::connect(server).await.map_err(|err| {
            Error::from_string(
                ErrorKind::DialError,
                format!("Failed to connect to {server}, {err}"),
            )
        })?;
        Ok(Self::Mqtt(socket))
    }

    /// Open a TLS wrapped TCP connection to `server`.
    ///
    /// `server_name` is the name presented for SNI and certificate
    /// verification; when empty, the host part of `server` is used.
    ///
    /// # Errors
    ///
    /// Returns error if the TCP connect or the TLS handshake fails.
    pub async fn connect_tls(
        server: &str,
        config: Arc<ClientConfig>,
        server_name: &str,
    ) -> Result<Self, Error> {
        let domain = if server_name.is_empty() {
            server.split(':').next().unwrap_or(server)
        } else {
            server_name
        };
        let domain = ServerName::try_from(domain).map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("Invalid TLS server name {domain}, {err}"),
            )
        })?;

        let socket = TcpStream::connect(server).await.map_err(|err| {
            Error::from_string(
                ErrorKind::DialError,
                format!("Failed to connect to {server}, {err}"),
            )
        })?;
        let connector = TlsConnector::from(config);
        let socket = connector.connect(domain, socket).await.map_err(|err| {
            Error::from_string(
                ErrorKind::DialError,
                format!("TLS handshake with {server} failed, {err}"),
            )
        })?;
        Ok(Self::Mqtts(Box::new(socket)))
    }

    /// Returns true if no socket is attached.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Read available bytes into `buf`, appending at the end.
    ///
    /// Returns the number of bytes read; zero means the peer closed the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns error if stream/socket gets error.
    pub async fn read_buf(&mut self, buf: &mut Vec<u8>) -> Result<usize, Error> {
        match self {
            Self::None => Err(Error::new(ErrorKind::NetError, "Stream is not connected")),
            Self::Mqtt(tcp_stream) => Ok(tcp_stream.read_buf(buf).await?),
            Self::Mqtts(tls_stream) => Ok(tls_stream.read_buf(buf).await?),
        }
    }

    /// Write the whole buffer to stream.
    ///
    /// # Errors
    ///
    /// Returns error if socket/stream gets error.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        match self {
            Self::None => Err(Error::new(ErrorKind::NetError, "Stream is not connected")),
            Self::Mqtt(tcp_stream) => Ok(tcp_stream.write_all(buf).await?),
            Self::Mqtts(tls_stream) => Ok(tls_stream.write_all(buf).await?),
        }
    }

    /// Shut down the write side, letting the peer observe EOF.
    pub async fn close(&mut self) {
        match self {
            Self::None => (),
            Self::Mqtt(tcp_stream) => {
                let _ret = tcp_stream.shutdown().await;
            }
            Self::Mqtts(tls_stream) => {
                let _ret = tls_stream.shutdown().await;
            }
        }
        *self = Self::None;
    }
}
