//! End-to-end sync scenarios exercised through the full engine: store,
//! core, pump, router, and mock transport wired by bootstrap.

use std::sync::Arc;
use wearsync_engine::{
    bootstrap_with_store, now_ms, BusEventKind, Engine, MockTransport, RecordingAlarms,
    SyncConfig,
};
use wearsync_store::{outbox, Store};
use wearsync_types::{
    NewTask, OpEnvelope, OutboxState, Snapshot, SnapshotTask, TaskDelta, TaskId,
};

struct Rig {
    engine: Engine,
    transport: Arc<MockTransport>,
    #[allow(dead_code)]
    alarms: Arc<RecordingAlarms>,
}

async fn rig() -> Rig {
    let store = Store::in_memory().await.unwrap();
    let transport = Arc::new(MockTransport::new());
    let alarms = Arc::new(RecordingAlarms::new());
    let engine = bootstrap_with_store(
        SyncConfig::default(),
        store,
        transport.clone(),
        alarms.clone(),
    )
    .await
    .unwrap();
    Rig {
        engine,
        transport,
        alarms,
    }
}

async fn outbox_entries(engine: &Engine) -> Vec<wearsync_types::OutboxEntry> {
    let mut conn = engine.store().acquire().await.unwrap();
    outbox::list_pending_in_order(&mut conn).await.unwrap()
}

/// Scenario 1: concurrent title/notes edit.
///
/// A local title edit and a newer remote notes edit on the same task
/// must both survive: per-field LWW keeps the local title and applies
/// the remote notes.
#[tokio::test]
async fn concurrent_title_and_notes_edits_merge_per_field() {
    let r = rig().await;
    let core = r.engine.core();

    let task = core
        .create_task(NewTask {
            title: "A".into(),
            notes: Some("n1".into()),
            ..NewTask::default()
        })
        .await
        .unwrap();

    core.update_title(&task.id, "B").await.unwrap();
    let local_title_ts = core.get_task(&task.id).await.unwrap().unwrap().title_updated_at;

    // Remote notes edit with a strictly newer notes timestamp.
    let remote_ts = now_ms() + 5_000;
    let payload = serde_json::json!({
        "taskId": task.id.as_str(),
        "opType": "UPDATE",
        "notes": "n2",
        "notesUpdatedAt": remote_ts,
    });
    r.engine
        .router()
        .on_event(
            BusEventKind::Changed,
            "/outbox/phone/op-notes",
            &serde_json::to_vec(&payload).unwrap(),
        )
        .await
        .unwrap();

    let merged = core.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(merged.title, "B");
    assert_eq!(merged.title_updated_at, local_title_ts);
    assert_eq!(merged.notes.as_deref(), Some("n2"));
    assert_eq!(merged.notes_updated_at, remote_ts);

    // The local title change is still queued for the peer.
    let kinds: Vec<_> = outbox_entries(&r.engine)
        .await
        .iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![wearsync_types::OpKind::Create, wearsync_types::OpKind::Update]
    );
}

/// Scenario 2: a tombstone beats an older update, and both ops land in
/// the idempotency log.
#[tokio::test]
async fn tombstone_beats_older_update() {
    let r = rig().await;
    let core = r.engine.core();
    let id = TaskId::from("T");

    core.apply_inbound(
        "op-a",
        &id,
        &TaskDelta {
            title: Some("A2".into()),
            title_updated_at: Some(20),
            ..TaskDelta::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(core.active_tasks().await.unwrap().len(), 1);

    core.apply_inbound(
        "op-b",
        &id,
        &TaskDelta {
            deleted: Some(true),
            ..TaskDelta::default()
        },
    )
    .await
    .unwrap();

    assert!(core.active_tasks().await.unwrap().is_empty());
    let tombstone = core.get_task(&id).await.unwrap().unwrap();
    assert!(tombstone.deleted);

    let mut conn = r.engine.store().acquire().await.unwrap();
    assert!(wearsync_store::processed::is_processed(&mut conn, "op-a")
        .await
        .unwrap());
    assert!(wearsync_store::processed::is_processed(&mut conn, "op-b")
        .await
        .unwrap());
}

/// Scenario 3: duplicate inbound delivery is a no-op the second time.
#[tokio::test]
async fn duplicate_inbound_delivery_is_idempotent() {
    let r = rig().await;
    let payload = br#"{"taskId":"T","opType":"UPDATE","title":"Z","titleUpdatedAt":30}"#;

    for _ in 0..2 {
        r.engine
            .router()
            .on_event(BusEventKind::Changed, "/outbox/phone/X", payload)
            .await
            .unwrap();
    }

    let task = r
        .engine
        .core()
        .get_task(&TaskId::from("T"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.title, "Z");
    assert_eq!(task.title_updated_at, 30);

    // Both deliveries were acked as success.
    let acks = r.transport.puts_with_prefix("/ack/phone/X");
    assert_eq!(acks.len(), 2);
    for ack in acks {
        let value: serde_json::Value = serde_json::from_slice(&ack.payload).unwrap();
        assert_eq!(value["success"], true);
    }
}

/// Scenario 4: peer-id late binding. A snapshot arrives for a
/// still-unacked local create; the dirty task is located by title and
/// linked instead of duplicated.
#[tokio::test]
async fn snapshot_late_binds_peer_id_to_dirty_create() {
    let r = rig().await;
    let core = r.engine.core();

    let task = core.create_task(NewTask::titled("Milk")).await.unwrap();
    assert_eq!(outbox_entries(&r.engine).await.len(), 1, "CREATE queued");

    let snapshot = Snapshot {
        snapshot_timestamp: now_ms(),
        tasks: vec![SnapshotTask {
            id: TaskId::from("phone-row"),
            title: Some("Milk".into()),
            title_updated_at: Some(now_ms() + 1_000),
            phone_id: Some(42),
            ..SnapshotTask::default()
        }],
    };
    r.engine
        .router()
        .on_event(
            BusEventKind::Changed,
            "/snapshot/tasks",
            &snapshot.to_bytes().unwrap(),
        )
        .await
        .unwrap();

    let active = core.active_tasks().await.unwrap();
    assert_eq!(active.len(), 1, "single merged row remains");
    assert_eq!(active[0].id, task.id);
    assert_eq!(active[0].peer_id, Some(wearsync_types::PeerId::new(42)));
}

/// Scenario 5: stuck send recovery. A SENDING entry older than the
/// threshold is reset and resent on the next maintenance tick.
#[tokio::test]
async fn stuck_send_is_reset_and_resent() {
    let r = rig().await;
    let op_id = {
        let mut conn = r.engine.store().acquire().await.unwrap();
        let op_id = outbox::insert(
            &mut conn,
            &TaskId::from("T"),
            wearsync_types::OpKind::Update,
            &TaskDelta {
                title: Some("B".into()),
                title_updated_at: Some(20),
                ..TaskDelta::default()
            }
            .to_bytes()
            .unwrap(),
            10,
        )
        .await
        .unwrap();
        outbox::mark_sending(&mut conn, op_id, now_ms() - 6 * 60 * 1000)
            .await
            .unwrap();
        op_id
    };

    r.engine.sync_now().await.unwrap();

    let mut conn = r.engine.store().acquire().await.unwrap();
    let entry = outbox::get(&mut conn, op_id).await.unwrap().unwrap();
    assert_eq!(entry.state, OutboxState::Sent);
    assert_eq!(entry.attempts, 2);

    let puts = r.transport.puts_with_prefix("/outbox/watch/");
    assert_eq!(puts.len(), 1);
    let envelope = OpEnvelope::from_bytes(&puts[0].payload).unwrap();
    assert_eq!(envelope.op_id, op_id);
}

/// Scenario 6: snapshot after reconnect. Dirty local edits merge
/// per-field, a peer deletion removes its task from the active list, and
/// the dirty outbox still drains afterwards.
#[tokio::test]
async fn snapshot_after_reconnect_merges_and_keeps_outbox() {
    let r = rig().await;
    let core = r.engine.core();

    // Three dirty local tasks.
    let kept = core.create_task(NewTask::titled("Kept")).await.unwrap();
    let edited = core.create_task(NewTask::titled("Edited")).await.unwrap();
    let doomed = core.create_task(NewTask::titled("Doomed")).await.unwrap();

    // Reconnect: ask for a snapshot.
    r.engine.request_sync().await.unwrap();
    assert_eq!(r.transport.puts_with_prefix("/sync/request").len(), 1);

    // The snapshot carries five entries: the three local tasks (one with
    // a newer title), one deletion, and two phone-only tasks.
    let newer = now_ms() + 10_000;
    let snapshot = Snapshot {
        snapshot_timestamp: newer,
        tasks: vec![
            SnapshotTask {
                id: kept.id.clone(),
                title: Some("Kept".into()),
                title_updated_at: Some(1),
                phone_id: Some(1),
                ..SnapshotTask::default()
            },
            SnapshotTask {
                id: edited.id.clone(),
                title: Some("Edited on phone".into()),
                title_updated_at: Some(newer),
                phone_id: Some(2),
                ..SnapshotTask::default()
            },
            SnapshotTask {
                id: doomed.id.clone(),
                deleted: Some(true),
                phone_id: Some(3),
                ..SnapshotTask::default()
            },
            SnapshotTask {
                id: TaskId::from("phone-a"),
                title: Some("Phone only A".into()),
                title_updated_at: Some(5),
                phone_id: Some(4),
                due_date: Some(newer + 1_000_000),
                ..SnapshotTask::default()
            },
            SnapshotTask {
                id: TaskId::from("phone-b"),
                title: Some("Phone only B".into()),
                title_updated_at: Some(5),
                phone_id: Some(5),
                ..SnapshotTask::default()
            },
        ],
    };
    r.engine
        .router()
        .on_event(
            BusEventKind::Changed,
            "/snapshot/tasks",
            &snapshot.to_bytes().unwrap(),
        )
        .await
        .unwrap();

    let active = core.active_tasks().await.unwrap();
    assert_eq!(active.len(), 4, "three local minus one deleted, plus two");

    let kept_now = core.get_task(&kept.id).await.unwrap().unwrap();
    assert_eq!(kept_now.title, "Kept", "older snapshot title lost the merge");
    assert_eq!(kept_now.peer_id, Some(wearsync_types::PeerId::new(1)));

    let edited_now = core.get_task(&edited.id).await.unwrap().unwrap();
    assert_eq!(edited_now.title, "Edited on phone");

    let doomed_now = core.get_task(&doomed.id).await.unwrap().unwrap();
    assert!(doomed_now.deleted, "peer deletion tombstones the local task");

    // First import derives the reminder from the due date.
    let phone_a = core.get_task(&TaskId::from("phone-a")).await.unwrap().unwrap();
    assert!(phone_a.reminder);

    // The three CREATE ops are still queued and drain to the bus.
    let pending = outbox_entries(&r.engine).await;
    assert_eq!(pending.len(), 3);
    r.engine.drain_outbox().await.unwrap();
    assert_eq!(r.transport.puts_with_prefix("/outbox/watch/").len(), 3);
    assert!(outbox_entries(&r.engine).await.is_empty());
}

/// Outbox FIFO per task: ops on the same task reach the bus in creation
/// order even across multiple drains.
#[tokio::test]
async fn outbox_is_fifo_per_task() {
    let r = rig().await;
    let core = r.engine.core();

    let task = core.create_task(NewTask::titled("One")).await.unwrap();
    core.update_title(&task.id, "Two").await.unwrap();
    core.set_completed(&task.id, true).await.unwrap();

    r.engine.drain_outbox().await.unwrap();

    let puts = r.transport.puts_with_prefix("/outbox/watch/");
    let kinds: Vec<_> = puts
        .iter()
        .map(|p| OpEnvelope::from_bytes(&p.payload).unwrap().op_type)
        .collect();
    assert_eq!(
        kinds,
        vec![
            wearsync_types::OpKind::Create,
            wearsync_types::OpKind::Update,
            wearsync_types::OpKind::Complete
        ]
    );
    let timestamps: Vec<_> = puts
        .iter()
        .map(|p| OpEnvelope::from_bytes(&p.payload).unwrap().timestamp)
        .collect();
    let mut sorted = timestamps.clone();
    sorted.sort();
    assert_eq!(timestamps, sorted);
}

/// The full ack round trip: drain, peer ack arrives, entry is ACKED, the
/// ack bus entry is cleaned up, and maintenance purges the row.
#[tokio::test]
async fn ack_round_trip_and_purge() {
    let r = rig().await;
    let core = r.engine.core();

    let task = core.create_task(NewTask::titled("Milk")).await.unwrap();
    r.engine.drain_outbox().await.unwrap();

    let put = r.transport.last_put().unwrap();
    let envelope = OpEnvelope::from_bytes(&put.payload).unwrap();

    let ack_path = format!("/ack/watch/{}", envelope.op_id);
    r.engine
        .router()
        .on_event(
            BusEventKind::Changed,
            &ack_path,
            br#"{"success":true,"timestamp":1}"#,
        )
        .await
        .unwrap();

    assert_eq!(r.transport.deletes(), vec![ack_path]);
    let synced = core.get_task(&task.id).await.unwrap().unwrap();
    assert!(!synced.dirty);

    r.engine.sync_now().await.unwrap();
    let mut conn = r.engine.store().acquire().await.unwrap();
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(remaining, 0, "acked entries are purged by maintenance");
}
