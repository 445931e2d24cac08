// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the account/contacts REST service.
//!
//! Every endpoint answers with a `{code, data, message}` JSON envelope where
//! `code == 0` means success.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::store::Message;

pub const LOGIN: &str = "/user/login";
pub const REGISTER: &str = "/user/register";
pub const VALIDATE_TOKEN: &str = "/user/validateToken";
pub const FRIEND_GET: &str = "/friend/get";
pub const GROUP_GET: &str = "/group/get";
pub const FRIEND_ADD: &str = "/friend/add";
pub const GROUP_ADD: &str = "/user/addgroup";
pub const USER_DETAIL: &str = "/user/get";
pub const GROUP_DETAIL: &str = "/group/getDetail";
pub const OFFLINE: &str = "/message/getOfflineMessage";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request rejected (code {code}): {message}")]
    Business { code: i64, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// A friend, or a group rendered as a contact (negative id).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Contact {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

impl From<Group> for Contact {
    fn from(group: Group) -> Self {
        Self { id: -group.id, username: group.name }
    }
}

/// Offline message as served by the backlog endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfflineMessage {
    sender_id: i64,
    message: String,
    #[serde(default)]
    sender: bool,
    timestamp: i64,
    #[serde(default)]
    message_id: String,
}

impl From<OfflineMessage> for Message {
    fn from(m: OfflineMessage) -> Self {
        Message::new(m.sender_id, m.message, m.sender, m.timestamp, true, Some(m.message_id))
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    code: Option<i64>,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self) -> Result<Option<T>, ApiError> {
        match self.code {
            Some(0) => Ok(self.data),
            code => Err(ApiError::Business {
                code: code.unwrap_or(-1),
                message: self.message.unwrap_or_default(),
            }),
        }
    }

    fn require(self) -> Result<T, ApiError> {
        self.into_data()?.ok_or_else(|| ApiError::Decode("missing data".to_owned()))
    }
}

#[derive(Serialize)]
struct LoginBody<'a> {
    id: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddFriendBody<'a> {
    friend_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddGroupBody<'a> {
    group_id: &'a str,
}

/// REST client bound to one base URL and (optionally) one bearer token.
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let client = Client::builder().timeout(Duration::from_secs(10)).build().unwrap_or_default();
        Self { base_url: base_url.into().trim_end_matches('/').to_owned(), token, client }
    }

    /// Return a client that authenticates with `token`.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn read<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        let bytes = self.apply_auth(req).send().await?.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Exchange credentials for a session token.
    pub async fn login(&self, id: &str, password: &str) -> Result<String, ApiError> {
        let req = self.client.post(self.url(LOGIN)).json(&LoginBody { id, password });
        self.read::<serde_json::Value>(req).await?.require().map(json_to_string)
    }

    /// Create an account; returns the new numeric user id.
    pub async fn register(&self, username: &str, password: &str) -> Result<i64, ApiError> {
        let req = self
            .client
            .post(self.url(REGISTER))
            .timeout(Duration::from_secs(20))
            .json(&RegisterBody { username, password });
        self.read(req).await?.require()
    }

    /// Whether the current token is still accepted.
    pub async fn validate_token(&self) -> Result<bool, ApiError> {
        let req = self.client.get(self.url(VALIDATE_TOKEN));
        Ok(self.read::<bool>(req).await?.into_data()?.unwrap_or(false))
    }

    pub async fn fetch_friends(&self) -> Result<Vec<Contact>, ApiError> {
        let req = self
            .client
            .post(self.url(FRIEND_GET))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{}");
        Ok(self.read(req).await?.into_data()?.unwrap_or_default())
    }

    /// Joined groups, as contacts with negated ids.
    pub async fn fetch_groups(&self) -> Result<Vec<Contact>, ApiError> {
        let req = self.client.get(self.url(GROUP_GET));
        let groups: Vec<Group> = self.read(req).await?.into_data()?.unwrap_or_default();
        Ok(groups.into_iter().map(Contact::from).collect())
    }

    pub async fn add_friend(&self, friend_id: &str) -> Result<bool, ApiError> {
        let req = self.client.post(self.url(FRIEND_ADD)).json(&AddFriendBody { friend_id });
        self.read_flag(req).await
    }

    pub async fn add_group(&self, group_id: &str) -> Result<bool, ApiError> {
        let req = self.client.post(self.url(GROUP_ADD)).json(&AddGroupBody { group_id });
        self.read_flag(req).await
    }

    pub async fn get_user_detail(&self, user_id: &str) -> Result<Contact, ApiError> {
        let req = self.client.get(self.url(USER_DETAIL)).query(&[("id", user_id)]);
        self.read_flexible(req).await
    }

    /// Group details, rendered as a contact.
    pub async fn get_group_detail(&self, group_id: &str) -> Result<Contact, ApiError> {
        let req = self.client.get(self.url(GROUP_DETAIL)).query(&[("id", group_id)]);
        self.read_flexible(req).await
    }

    /// Messages queued while this user was offline. All are marked sent.
    pub async fn get_offline_messages(&self) -> Result<Vec<Message>, ApiError> {
        let req = self.client.get(self.url(OFFLINE));
        let backlog: Vec<OfflineMessage> = self.read(req).await?.into_data()?.unwrap_or_default();
        Ok(backlog.into_iter().map(Message::from).collect())
    }

    /// Accept a bare `true`/`false` body or an envelope whose data is a bool.
    async fn read_flag(&self, req: reqwest::RequestBuilder) -> Result<bool, ApiError> {
        let text = self.apply_auth(req).send().await?.text().await?;
        match text.trim().to_ascii_lowercase().as_str() {
            "true" => return Ok(true),
            "false" => return Ok(false),
            _ => {}
        }
        let envelope: ApiEnvelope<bool> =
            serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(envelope.into_data()?.unwrap_or(false))
    }

    /// Accept either an envelope or the bare object.
    async fn read_flexible(&self, req: reqwest::RequestBuilder) -> Result<Contact, ApiError> {
        let bytes = self.apply_auth(req).send().await?.bytes().await?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))?;
        let body = if value.get("code").is_some() && value.get("data").is_some() {
            let envelope: ApiEnvelope<serde_json::Value> =
                serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))?;
            envelope.require()?
        } else {
            value
        };
        serde_json::from_value(body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn json_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
