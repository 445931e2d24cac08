// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::*;

const TS: i64 = 1_700_000_000_000;

#[yare::parameterized(
    empty    = { "", 0 },
    ascii    = { "hello", 99_162_322 },
    collide1 = { "Aa", 2112 },
    collide2 = { "BB", 2112 },
    astral   = { "😀", 1_772_899 },
    cjk      = { "你好", 652_829 },
)]
fn java_hash_matches_jvm(input: &str, expected: i32) {
    assert_eq!(java_hash(input), expected);
}

#[test]
fn direct_id_is_stable() {
    assert_eq!(direct_message_id(7, "hi", TS), "1609844804");
    assert_eq!(group_message_id(-3, 7, "hi", TS), "716513374");
}

#[test]
fn ids_collide_within_a_minute() {
    let minute_start = TS - TS % 60_000;
    assert_eq!(
        direct_message_id(7, "hi", minute_start),
        direct_message_id(7, "hi", minute_start + 59_999)
    );
    assert_ne!(
        direct_message_id(7, "hi", minute_start),
        direct_message_id(7, "hi", minute_start + 60_000)
    );
}

#[test]
fn negative_timestamps_bucket_downwards() {
    assert_eq!(direct_message_id(7, "hi", -1), "-1218173054");
}

#[test]
fn explicit_id_wins_and_empty_id_is_derived() {
    let m = Message::new(1, "x", false, TS, true, Some("server-id".into()));
    assert_eq!(m.message_id, "server-id");
    let m = Message::new(1, "x", false, TS, true, Some(String::new()));
    assert_eq!(m.message_id, direct_message_id(1, "x", TS));
}

#[test]
fn outgoing_starts_unsent_and_flag_is_shared() {
    let m = Message::outgoing(5, "yo", TS);
    assert!(m.sender);
    assert!(!m.is_sent.get());

    let copy = m.clone();
    let mut rx = copy.is_sent.subscribe();
    m.is_sent.set(true);
    assert!(copy.is_sent.get());
    assert!(rx.has_changed().unwrap_or(false));
}

#[test]
fn incoming_is_marked_sent() {
    let m = Message::incoming(5, "yo", TS);
    assert!(!m.sender);
    assert!(m.is_sent.get());
}

#[test]
fn conversations_filter_by_peer_and_group() {
    let store = MessageStore::new();
    store.append(Message::incoming(1, "a", TS));
    store.append(Message::outgoing(2, "b", TS));
    store.append(Message::incoming(1, "c", TS + 1));
    store.append_group(GroupMessage::new(10, UNKNOWN_SENDER, "g1", 3, TS, true, None));
    store.append_group(GroupMessage::new(11, UNKNOWN_SENDER, "g2", 3, TS, true, None));

    let texts: Vec<_> = store.conversation(1).into_iter().map(|m| m.text).collect();
    assert_eq!(texts, vec!["a", "c"]);
    assert_eq!(store.direct().len(), 3);
    assert_eq!(store.group_conversation(11).len(), 1);
    assert_eq!(store.group().len(), 2);
}

#[tokio::test]
async fn appends_are_broadcast() -> anyhow::Result<()> {
    let store = MessageStore::new();
    let mut events = store.subscribe();
    store.extend_direct(vec![Message::incoming(1, "a", TS), Message::incoming(2, "b", TS)]);
    store.append_group(GroupMessage::new(10, "ann", "g", 3, TS, true, None));

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(match events.recv().await? {
            StoreEvent::DirectAppended(m) => m.text,
            StoreEvent::GroupAppended(m) => format!("#{}", m.text),
        });
    }
    assert_eq!(seen, vec!["a", "b", "#g"]);
    Ok(())
}

proptest! {
    #[test]
    fn ids_depend_only_on_the_minute(
        sender in 1..1_000_000_i64,
        group in -1_000_000..-1_i64,
        text in ".{0,40}",
        bucket in 0..60_000_000_i64,
        a in 0..60_000_i64,
        b in 0..60_000_i64,
    ) {
        let (ts_a, ts_b) = (bucket * 60_000 + a, bucket * 60_000 + b);
        prop_assert_eq!(
            direct_message_id(sender, &text, ts_a),
            direct_message_id(sender, &text, ts_b)
        );
        prop_assert_eq!(
            group_message_id(group, sender, &text, ts_a),
            group_message_id(group, sender, &text, ts_b)
        );
    }

    #[test]
    fn ids_change_across_a_minute_boundary(
        sender in 1..1_000_000_i64,
        group in -1_000_000..-1_i64,
        text in ".{0,40}",
        bucket in 0..60_000_000_i64,
    ) {
        let last = bucket * 60_000 + 59_999;
        let next = last + 1;
        prop_assert_ne!(
            direct_message_id(sender, &text, last),
            direct_message_id(sender, &text, next)
        );
        prop_assert_ne!(
            group_message_id(group, sender, &text, last),
            group_message_id(group, sender, &text, next)
        );
    }
}
