// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Normalizes a received frame into a transport-independent outcome.
//!
//! The backend overloads `Response.message`: it is the error text when
//! `success` is false and the payload when `success` is true. That ambiguity
//! stays on the wire; [`Unwrapped`] splits it into `payload` and
//! `error_message` so callers never have to guess.

use bytes::Bytes;

use crate::codec::{self, Envelope};

/// Result of unwrapping one raw frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unwrapped {
    /// The frame decoded as a `Response` envelope.
    pub has_envelope: bool,
    /// Embedded flag when `has_envelope`, otherwise always true.
    pub success: bool,
    /// `Response.message` on success (absent when empty), or the untouched
    /// raw frame when there was no response envelope.
    pub payload: Option<Bytes>,
    /// `Response.message` on failure.
    pub error_message: Option<String>,
}

impl Unwrapped {
    /// Business failure: a response envelope that says `success == false`.
    pub fn is_business_failure(&self) -> bool {
        self.has_envelope && !self.success
    }

    /// Payload as UTF-8, if present and valid.
    pub fn payload_str(&self) -> Option<&str> {
        self.payload.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }
}

/// Unwrap a raw frame. Never fails: anything that is not a `Response`
/// envelope passes through as a successful, envelope-less payload.
pub fn unwrap(raw: &Bytes) -> Unwrapped {
    match codec::decode(raw) {
        Ok(Envelope::Response(resp)) => {
            let (payload, error_message) = if resp.success {
                let payload =
                    (!resp.message.is_empty()).then(|| Bytes::from(resp.message.into_bytes()));
                (payload, None)
            } else {
                (None, Some(resp.message))
            };
            Unwrapped { has_envelope: true, success: resp.success, payload, error_message }
        }
        _ => Unwrapped {
            has_envelope: false,
            success: true,
            payload: Some(raw.clone()),
            error_message: None,
        },
    }
}

#[cfg(test)]
#[path = "unwrap_tests.rs"]
mod tests;
