// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringError {
    /// Length of string exceeds 64k.
    TooManyData,

    /// Invalid UTF-8, or contains a forbidden code point.
    InvalidChar,
}

/// Check whether `s` may be carried in a String Data field.
///
/// The character data MUST be well-formed UTF-8 and MUST NOT include
/// an encoding of the null character U+0000 [MQTT-1.5.3-2].
///
/// # Errors
///
/// Returns error if `s` is too long or contains invalid chars.
pub fn validate_utf8_string(s: &str) -> Result<(), StringError> {
    if s.len() > usize::from(u16::MAX) {
        return Err(StringError::TooManyData);
    }
    if s.contains('\u{0000}') {
        return Err(StringError::InvalidChar);
    }
    Ok(())
}

/// Convert `bytes` into an owned String Data value.
///
/// # Errors
///
/// Returns error if `bytes` is not valid UTF-8 or violates
/// [`validate_utf8_string`] rules.
pub fn to_utf8_string(bytes: &[u8]) -> Result<String, StringError> {
    let s = String::from_utf8(bytes.to_vec()).map_err(|_e| StringError::InvalidChar)?;
    validate_utf8_string(&s)?;
    Ok(s)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIdError {
    IsEmpty,
    TooLong,
}

/// Check client id rules.
///
/// A zero-byte client id is only acceptable together with clean-session,
/// which is checked at the Connect packet layer, not here.
///
/// # Errors
///
/// Returns error if `client_id` is empty or too long.
pub fn validate_client_id(client_id: &str) -> Result<(), ClientIdError> {
    if client_id.is_empty() {
        return Err(ClientIdError::IsEmpty);
    }
    if client_id.len() > usize::from(u16::MAX) {
        return Err(ClientIdError::TooLong);
    }
    Ok(())
}

/// Generate a random client id on behalf of a client which sent a
/// zero-byte one.
#[must_use]
pub fn random_client_id() -> String {
    let suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("naiad-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_utf8_string() {
        assert!(validate_utf8_string("sensor/温度").is_ok());
        assert_eq!(
            validate_utf8_string("a\u{0000}b"),
            Err(StringError::InvalidChar)
        );
    }

    #[test]
    fn test_random_client_id() {
        let id = random_client_id();
        assert!(validate_client_id(&id).is_ok());
        assert_ne!(id, random_client_id());
    }
}
