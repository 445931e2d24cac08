// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::Session;

/// Send a heartbeat every interval and mirror the result into the session's
/// connected flag. The flag is advisory; failures never tear down the session.
pub(crate) fn spawn(session: Session, cancel: CancellationToken) {
    let period = session.config().heartbeat_interval();
    let limit = session.config().heartbeat_timeout();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await; // Consume the immediate first tick.

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            let ok = tokio::select! {
                _ = cancel.cancelled() => break,
                ok = session.heartbeat(limit) => ok,
            };
            session.set_connected(ok);
        }
        tracing::debug!("heartbeat stopped");
    });
}
