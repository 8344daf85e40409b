// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt::{self, Display};
use std::io;
use tokio::sync::mpsc;
use tokio::time::error::Elapsed;

use crate::commands::{ClientToSessionCmd, SessionToClientCmd};

/// Represent the types of errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid client configuration: no servers, bad option values or
    /// unreadable TLS material. The only kind surfaced synchronously
    /// from client construction.
    ConfigError,

    /// TCP/TLS connect to the broker failed.
    DialError,

    /// Connect handshake did not finish within the dial timeout.
    TimeoutError,

    /// Packet decode failure, or an unexpected control packet in the
    /// handshake.
    BadPacket,

    /// Socket broken mid-session; triggers reconnect if configured.
    NetError,

    /// Broker replied to Connect with a non-zero return code.
    ProtocolError,

    /// Persistence backing store failed; never fatal.
    PersistError,

    /// Persistence refused a store due to its policy; reported, not fatal.
    PacketDropped,

    /// Error occurred while performing I/O.
    IoError,

    /// Packet encode error.
    EncodeError,

    /// Cert files error.
    CertError,

    /// mpsc channel error.
    ChannelError,

    /// Operation not valid in current client status.
    InvalidClientStatus,
}

#[derive(Clone, Debug)]
pub struct Error {
    /// Type of current error.
    kind: ErrorKind,

    /// Detail message about this error.
    message: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_owned(),
        }
    }

    #[must_use]
    pub const fn from_string(kind: ErrorKind, message: String) -> Self {
        Self { kind, message }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::from_string(ErrorKind::IoError, format!("IoError {err}"))
    }
}

impl From<Elapsed> for Error {
    fn from(err: Elapsed) -> Self {
        Self::from_string(ErrorKind::TimeoutError, format!("Timeout: {err}"))
    }
}

impl From<codec::EncodeError> for Error {
    fn from(err: codec::EncodeError) -> Self {
        Self::from_string(ErrorKind::EncodeError, format!("{err:?}"))
    }
}

impl From<codec::DecodeError> for Error {
    fn from(err: codec::DecodeError) -> Self {
        Self::from_string(ErrorKind::BadPacket, format!("{err:?}"))
    }
}

impl From<tokio_rustls::rustls::Error> for Error {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        Self::from_string(ErrorKind::CertError, format!("Rustls error: {err}"))
    }
}

macro_rules! convert_send_error {
    ($cmd_type: ident) => {
        impl From<mpsc::error::SendError<$cmd_type>> for Error {
            fn from(err: mpsc::error::SendError<$cmd_type>) -> Self {
                Self::from_string(
                    ErrorKind::ChannelError,
                    format!("$cmd_type channel error: {err}"),
                )
            }
        }
    };
}

convert_send_error!(ClientToSessionCmd);
convert_send_error!(SessionToClientCmd);
