// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary envelope codec for the chat wire protocol.
//!
//! Every WebSocket binary frame carries exactly one protobuf `MessageWrapper`:
//! a `type` discriminator string plus a oneof body. The discriminator and the
//! populated body must agree; [`decode`] rejects frames where they do not.
//!
//! Numeric identifiers inside `Chat`/`GroupChat` (`user_id`, `timestamp`)
//! travel as decimal strings for compatibility with the existing backend.

use std::fmt;

use bytes::Bytes;
use prost::Message;

use crate::error::ErrorCode;

/// Error returned by [`decode`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw bytes are not a valid protobuf `MessageWrapper`.
    #[error("failed to decode envelope: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The wrapper carried no body at all.
    #[error("envelope has no payload (type {0:?})")]
    MissingPayload(String),
    /// The discriminator string is not a known message kind.
    #[error("unknown envelope type: {0:?}")]
    UnknownKind(String),
    /// The discriminator and the populated body disagree.
    #[error("envelope type {declared} does not match {actual} payload")]
    KindMismatch { declared: MsgKind, actual: MsgKind },
}

impl CodecError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::Codec
    }
}

/// Wire message kinds, one per envelope variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgKind {
    Login,
    Logout,
    Heartbeat,
    Chat,
    GroupChat,
    PresenceCheck,
    Response,
}

impl MsgKind {
    /// Discriminator string used on the wire.
    pub fn wire(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Heartbeat => "heartbeat",
            Self::Chat => "chat",
            Self::GroupChat => "groupChat",
            Self::PresenceCheck => "check",
            Self::Response => "response",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "login" => Some(Self::Login),
            "logout" => Some(Self::Logout),
            "heartbeat" => Some(Self::Heartbeat),
            "chat" => Some(Self::Chat),
            "groupChat" => Some(Self::GroupChat),
            "check" => Some(Self::PresenceCheck),
            "response" => Some(Self::Response),
            _ => None,
        }
    }
}

impl fmt::Display for MsgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire())
    }
}

// ---------------------------------------------------------------------------
// Payload variants
// ---------------------------------------------------------------------------

/// Sent once after the handshake; `target_client_id` carries the session token.
#[derive(Clone, PartialEq, Message)]
pub struct Login {
    #[prost(string, tag = "1")]
    pub target_client_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Logout {
    #[prost(string, tag = "1")]
    pub user_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Heartbeat {
    /// Milliseconds since the Unix epoch.
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
}

/// Direct message.
#[derive(Clone, PartialEq, Message)]
pub struct Chat {
    #[prost(string, tag = "1")]
    pub target_client_id: String,
    #[prost(string, tag = "2")]
    pub content: String,
    #[prost(string, tag = "3")]
    pub user_id: String,
    #[prost(string, tag = "4")]
    pub timestamp: String,
}

/// Group message. No timestamp on the wire; receivers stamp arrival time.
#[derive(Clone, PartialEq, Message)]
pub struct GroupChat {
    #[prost(string, tag = "1")]
    pub target_client_id: String,
    #[prost(string, tag = "2")]
    pub content: String,
    #[prost(string, tag = "3")]
    pub user_id: String,
}

/// Asks whether a peer is online.
#[derive(Clone, PartialEq, Message)]
pub struct PresenceCheck {
    #[prost(string, tag = "1")]
    pub target_client_id: String,
}

/// Server reply. `message` is the error text when `success` is false and an
/// inline payload (JSON or plain string) when it is true.
#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(string, tag = "3")]
    pub client_id: String,
    #[prost(bool, tag = "4")]
    pub online: bool,
}

/// The tagged union carried by every frame.
#[derive(Clone, PartialEq, prost::Oneof)]
pub enum Envelope {
    #[prost(message, tag = "2")]
    Login(Login),
    #[prost(message, tag = "3")]
    Logout(Logout),
    #[prost(message, tag = "4")]
    Heartbeat(Heartbeat),
    #[prost(message, tag = "5")]
    Chat(Chat),
    #[prost(message, tag = "6")]
    GroupChat(GroupChat),
    #[prost(message, tag = "7")]
    PresenceCheck(PresenceCheck),
    #[prost(message, tag = "8")]
    Response(Response),
}

#[derive(Clone, PartialEq, Message)]
struct MessageWrapper {
    #[prost(string, tag = "1")]
    r#type: String,
    #[prost(oneof = "Envelope", tags = "2, 3, 4, 5, 6, 7, 8")]
    body: Option<Envelope>,
}

impl Envelope {
    pub fn kind(&self) -> MsgKind {
        match self {
            Self::Login(_) => MsgKind::Login,
            Self::Logout(_) => MsgKind::Logout,
            Self::Heartbeat(_) => MsgKind::Heartbeat,
            Self::Chat(_) => MsgKind::Chat,
            Self::GroupChat(_) => MsgKind::GroupChat,
            Self::PresenceCheck(_) => MsgKind::PresenceCheck,
            Self::Response(_) => MsgKind::Response,
        }
    }

    pub fn login(token: &str) -> Self {
        Self::Login(Login { target_client_id: token.to_owned() })
    }

    pub fn logout(user_id: &str) -> Self {
        Self::Logout(Logout { user_id: user_id.to_owned() })
    }

    pub fn heartbeat(now_ms: i64) -> Self {
        Self::Heartbeat(Heartbeat { timestamp: now_ms })
    }

    pub fn chat(target: &str, content: &str, user_id: i64, timestamp_ms: i64) -> Self {
        Self::Chat(Chat {
            target_client_id: target.to_owned(),
            content: content.to_owned(),
            user_id: user_id.to_string(),
            timestamp: timestamp_ms.to_string(),
        })
    }

    pub fn group_chat(target: &str, content: &str, user_id: i64) -> Self {
        Self::GroupChat(GroupChat {
            target_client_id: target.to_owned(),
            content: content.to_owned(),
            user_id: user_id.to_string(),
        })
    }

    pub fn presence_check(target: &str) -> Self {
        Self::PresenceCheck(PresenceCheck { target_client_id: target.to_owned() })
    }

    /// Build the outbound payload for an explicitly chosen kind.
    ///
    /// `target` is the addressee (or the token for `Login`, the user id for
    /// `Logout`); `content` is ignored by kinds that carry no text.
    pub fn build(kind: MsgKind, target: &str, content: &str, user_id: i64, now_ms: i64) -> Self {
        match kind {
            MsgKind::Login => Self::login(target),
            MsgKind::Logout => Self::logout(target),
            MsgKind::Heartbeat => Self::heartbeat(now_ms),
            MsgKind::Chat => Self::chat(target, content, user_id, now_ms),
            MsgKind::GroupChat => Self::group_chat(target, content, user_id),
            MsgKind::PresenceCheck => Self::presence_check(target),
            MsgKind::Response => Self::Response(Response {
                success: true,
                message: content.to_owned(),
                ..Default::default()
            }),
        }
    }
}

/// Serialize an envelope into one frame payload. The discriminator is always
/// derived from the variant, so the two cannot disagree on the way out.
pub fn encode(envelope: &Envelope) -> Bytes {
    let wire = MessageWrapper {
        r#type: envelope.kind().wire().to_owned(),
        body: Some(envelope.clone()),
    };
    Bytes::from(wire.encode_to_vec())
}

/// Parse one frame payload.
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let wire = MessageWrapper::decode(bytes)?;
    let body = wire.body.ok_or_else(|| CodecError::MissingPayload(wire.r#type.clone()))?;
    let declared =
        MsgKind::from_wire(&wire.r#type).ok_or_else(|| CodecError::UnknownKind(wire.r#type))?;
    let actual = body.kind();
    if declared != actual {
        return Err(CodecError::KindMismatch { declared, actual });
    }
    Ok(body)
}

/// Encode a raw wrapper with an arbitrary discriminator. Only used to build
/// malformed frames in tests.
#[doc(hidden)]
pub fn encode_with_type(type_str: &str, body: Option<Envelope>) -> Bytes {
    let wire = MessageWrapper { r#type: type_str.to_owned(), body };
    Bytes::from(wire.encode_to_vec())
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
