// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringError {
    /// More than 65535 bytes.
    TooManyData,

    /// Contains a character forbidden in MQTT strings.
    InvalidChar,
}

/// Validate an MQTT UTF-8 string field.
///
/// The character data in a UTF-8 Encoded String MUST be well-formed UTF-8
/// as defined by RFC 3629 and MUST NOT include an encoding of the null
/// character U+0000 [MQTT-1.5.3-2].
///
/// # Errors
///
/// Returns error if `s` is longer than 65535 bytes or contains U+0000.
pub fn validate_utf8_string(s: &str) -> Result<(), StringError> {
    if s.len() > usize::from(u16::MAX) {
        return Err(StringError::TooManyData);
    }
    if s.chars().any(|c| c == '\u{0000}') {
        return Err(StringError::InvalidChar);
    }
    Ok(())
}

/// Validate a binary field with a two byte length prefix.
///
/// # Errors
///
/// Returns error if `data` is longer than 65535 bytes.
pub fn validate_two_bytes_data(data: &[u8]) -> Result<(), StringError> {
    if data.len() > usize::from(u16::MAX) {
        Err(StringError::TooManyData)
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIdError {
    /// No chars.
    IsEmpty,

    /// Larger than 23 chars.
    TooLong,

    /// Can only contain 0-9a-zA-Z.
    InvalidChars,
}

/// Validate client id in Connect packet.
///
/// The Server MUST allow ClientIds which are between 1 and 23 UTF-8 encoded
/// bytes in length, and that contain only the characters
/// "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ"
/// [MQTT-3.1.3-5].
///
/// An empty client id is a special case handled by the caller; it is only
/// valid together with the clean-session flag.
///
/// # Errors
///
/// Returns error if `client_id` is empty, too long or contains other chars.
pub fn validate_client_id(client_id: &str) -> Result<(), ClientIdError> {
    if client_id.is_empty() {
        return Err(ClientIdError::IsEmpty);
    }
    if client_id.len() > 23 {
        return Err(ClientIdError::TooLong);
    }
    if !client_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ClientIdError::InvalidChars);
    }
    Ok(())
}

/// Generate a random alphanumeric string with `len` chars.
#[must_use]
pub fn random_string(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate a random client id which passes [`validate_client_id`].
#[must_use]
pub fn random_client_id() -> String {
    random_string(12)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_utf8_string() {
        assert!(validate_utf8_string("t/topic").is_ok());
        assert_eq!(
            validate_utf8_string("a\u{0000}b"),
            Err(StringError::InvalidChar)
        );
    }

    #[test]
    fn test_validate_client_id() {
        assert!(validate_client_id("client1").is_ok());
        assert_eq!(validate_client_id(""), Err(ClientIdError::IsEmpty));
        assert_eq!(
            validate_client_id("abcdefghijklmnopqrstuvwxyz"),
            Err(ClientIdError::TooLong)
        );
        assert_eq!(
            validate_client_id("has space"),
            Err(ClientIdError::InvalidChars)
        );
    }

    #[test]
    fn test_random_client_id() {
        let id = random_client_id();
        assert!(validate_client_id(&id).is_ok());
    }
}
