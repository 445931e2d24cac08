// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::extract::Query;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::*;

async fn spawn(router: Router) -> anyhow::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(format!("http://{addr}"))
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

fn backend() -> Router {
    Router::new()
        .route(
            LOGIN,
            post(|Json(body): Json<Value>| async move {
                if body["id"] == "7" && body["password"] == "pw" {
                    Json(json!({"code": 0, "data": "tok-7", "message": "ok"}))
                } else {
                    Json(json!({"code": 1001, "data": null, "message": "bad credentials"}))
                }
            }),
        )
        .route(
            REGISTER,
            post(|Json(body): Json<Value>| async move {
                if body["username"] == "ann" {
                    Json(json!({"code": 0, "data": 31}))
                } else {
                    Json(json!({"code": 3, "message": "username required"}))
                }
            }),
        )
        .route(
            VALIDATE_TOKEN,
            get(|headers: HeaderMap| async move {
                let valid = bearer(&headers).as_deref() == Some("tok-7");
                Json(json!({"code": 0, "data": valid}))
            }),
        )
        .route(
            FRIEND_GET,
            post(|| async {
                Json(json!({
                    "code": 0,
                    "data": [{"id": 2, "username": "bob"}, {"id": 3, "username": "cy"}]
                }))
            }),
        )
        .route(
            GROUP_GET,
            get(|| async { Json(json!({"code": 0, "data": [{"id": 10, "name": "team"}]})) }),
        )
        .route(
            FRIEND_ADD,
            post(|Json(body): Json<Value>| async move {
                if body["friendId"] == "2" {
                    "true".to_owned()
                } else {
                    json!({"code": 2, "data": false, "message": "no such user"}).to_string()
                }
            }),
        )
        .route(
            GROUP_ADD,
            post(|Json(body): Json<Value>| async move {
                Json(json!({"code": 0, "data": body["groupId"] == "10"}))
            }),
        )
        .route(
            USER_DETAIL,
            get(|Query(q): Query<std::collections::HashMap<String, String>>| async move {
                let id: i64 = q.get("id").and_then(|v| v.parse().ok()).unwrap_or(0);
                Json(json!({"code": 0, "data": {"id": id, "username": "bob"}}))
            }),
        )
        .route(GROUP_DETAIL, get(|| async { Json(json!({"id": -10, "username": "team"})) }))
        .route(
            OFFLINE,
            get(|| async {
                Json(json!({"code": 0, "data": [
                    {"senderId": 2, "message": "while you were out", "receiverId": 7,
                     "timestamp": 1_700_000_000_000_i64, "messageId": "srv-1"},
                    {"senderId": 3, "message": "ping", "timestamp": 1_700_000_060_000_i64}
                ]}))
            }),
        )
}

#[tokio::test]
async fn login_returns_token() -> anyhow::Result<()> {
    let base = spawn(backend()).await?;
    let api = ApiClient::new(base, None);
    assert_eq!(api.login("7", "pw").await?, "tok-7");
    Ok(())
}

#[tokio::test]
async fn login_failure_is_business_error() -> anyhow::Result<()> {
    let base = spawn(backend()).await?;
    let api = ApiClient::new(base, None);
    match api.login("7", "nope").await {
        Err(ApiError::Business { code, message }) => {
            assert_eq!(code, 1001);
            assert_eq!(message, "bad credentials");
        }
        other => anyhow::bail!("expected business error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn register_returns_new_id() -> anyhow::Result<()> {
    let base = spawn(backend()).await?;
    assert_eq!(ApiClient::new(base, None).register("ann", "pw").await?, 31);
    Ok(())
}

#[tokio::test]
async fn validate_token_sends_bearer() -> anyhow::Result<()> {
    let base = spawn(backend()).await?;
    assert!(ApiClient::new(base.clone(), None).with_token("tok-7").validate_token().await?);
    assert!(!ApiClient::new(base, Some("stale".into())).validate_token().await?);
    Ok(())
}

#[tokio::test]
async fn contacts_merge_friends_and_negated_groups() -> anyhow::Result<()> {
    let base = spawn(backend()).await?;
    let api = ApiClient::new(base, Some("tok-7".into()));
    let friends = api.fetch_friends().await?;
    let groups = api.fetch_groups().await?;
    assert_eq!(friends.len(), 2);
    assert_eq!(groups, vec![Contact { id: -10, username: "team".into() }]);
    Ok(())
}

#[tokio::test]
async fn add_friend_accepts_bare_and_enveloped_answers() -> anyhow::Result<()> {
    let base = spawn(backend()).await?;
    let api = ApiClient::new(base, Some("tok-7".into()));
    assert!(api.add_friend("2").await?);
    assert!(matches!(api.add_friend("99").await, Err(ApiError::Business { code: 2, .. })));
    assert!(api.add_group("10").await?);
    assert!(!api.add_group("11").await?);
    Ok(())
}

#[tokio::test]
async fn details_accept_enveloped_or_bare_objects() -> anyhow::Result<()> {
    let base = spawn(backend()).await?;
    let api = ApiClient::new(base, Some("tok-7".into()));
    assert_eq!(api.get_user_detail("2").await?, Contact { id: 2, username: "bob".into() });
    assert_eq!(api.get_group_detail("10").await?, Contact { id: -10, username: "team".into() });
    Ok(())
}

#[tokio::test]
async fn offline_messages_are_marked_sent() -> anyhow::Result<()> {
    let base = spawn(backend()).await?;
    let api = ApiClient::new(format!("{base}/"), Some("tok-7".into()));
    let backlog = api.get_offline_messages().await?;
    assert_eq!(backlog.len(), 2);
    assert!(backlog.iter().all(|m| m.is_sent.get() && !m.sender));
    assert_eq!(backlog[0].message_id, "srv-1");
    assert_eq!(
        backlog[1].message_id,
        crate::store::direct_message_id(3, "ping", 1_700_000_060_000)
    );
    Ok(())
}

#[tokio::test]
async fn unreachable_backend_is_http_error() {
    let api = ApiClient::new("http://127.0.0.1:1", None);
    assert!(matches!(api.validate_token().await, Err(ApiError::Http(_))));
}
