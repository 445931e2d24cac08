// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-oriented terminal driver for the `parley` binary.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::config::Config;
use crate::event::{Notice, StoreEvent};
use crate::session::{Session, SessionState};
use crate::store::MessageStore;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `@<id> <text>`
    Direct { peer: i64, text: String },
    /// `#<gid> <text>`
    Group { group: i64, text: String },
    /// `?<id>`
    Presence { target: String },
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> anyhow::Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let mut chars = line.chars();
    let sigil = chars.next().unwrap_or_default();
    let rest = chars.as_str();
    let (id, text) = match rest.split_once(char::is_whitespace) {
        Some((id, text)) => (id, text.trim()),
        None => (rest, ""),
    };
    let command = match sigil {
        '@' | '#' => {
            if text.is_empty() {
                anyhow::bail!("usage: {sigil}<id> <text>");
            }
            let n: i64 = id.parse().map_err(|_| anyhow::anyhow!("invalid id: {id:?}"))?;
            if sigil == '@' {
                Command::Direct { peer: n, text: text.to_owned() }
            } else {
                Command::Group { group: n, text: text.to_owned() }
            }
        }
        '?' if !id.is_empty() => Command::Presence { target: id.to_owned() },
        _ => anyhow::bail!("expected @<id> <text>, #<gid> <text>, or ?<id>"),
    };
    Ok(Some(command))
}

/// Connect, print traffic, and forward stdin commands until EOF, Ctrl-C, or
/// the connection drops.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(MessageStore::new());
    let mut events = store.subscribe();

    let api = ApiClient::new(&config.api_url, Some(config.token.clone()));
    match api.get_offline_messages().await {
        Ok(backlog) => {
            info!(count = backlog.len(), "offline messages loaded");
            store.extend_direct(backlog);
        }
        Err(e) => warn!(err = %e, "offline messages unavailable"),
    }

    let session = Session::new(config, Arc::clone(&store));
    let mut notices = session.subscribe_notices();
    let mut state = session.subscribe_state();
    session.connect().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(line) => dispatch(&session, &line).await,
                None => break,
            },
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "store events lagged"),
                Err(RecvError::Closed) => break,
            },
            notice = notices.recv() => match notice {
                Ok(Notice { code, message }) => eprintln!("[{code}] {message}"),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = state.wait_for(|s| *s == SessionState::ShuttingDown) => break,
        }
    }

    session.shutdown().await;
    Ok(())
}

async fn dispatch(session: &Session, line: &str) {
    let command = match parse_command(line) {
        Ok(Some(command)) => command,
        Ok(None) => return,
        Err(e) => {
            eprintln!("{e}");
            return;
        }
    };
    match command {
        Command::Direct { peer, text } => {
            let (_, outcome) = session.send_chat(peer, &text).await;
            if !outcome.success {
                eprintln!("not delivered to {peer}");
            }
        }
        Command::Group { group, text } => {
            let (_, outcome) = session.send_group_chat(group, &text).await;
            if !outcome.success {
                eprintln!("not delivered to group {group}");
            }
        }
        Command::Presence { target } => match session.check_presence(&target).await {
            Some(true) => println!("{target} is online"),
            Some(false) => println!("{target} is offline"),
            None => eprintln!("presence check for {target} failed"),
        },
    }
}

fn print_event(event: &StoreEvent) {
    match event {
        StoreEvent::DirectAppended(m) if !m.sender => println!("<{}> {}", m.sender_id, m.text),
        StoreEvent::GroupAppended(m) if !m.sender_name.is_empty() => {
            println!("#{} <{}> {}", m.group_id, m.sender_id, m.text)
        }
        _ => {}
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
