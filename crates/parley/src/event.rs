// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::error::ErrorCode;
use crate::store::{GroupMessage, Message};

/// A one-line, user-facing prompt. Never fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub code: ErrorCode,
    pub message: String,
}

/// Emitted by the message store after every append.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    DirectAppended(Message),
    GroupAppended(GroupMessage),
}
