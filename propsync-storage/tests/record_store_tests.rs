use propsync_types::now_utc;
use pretty_assertions::assert_eq;
use propsync_storage::{Database, RecordStore, Registry};
use propsync_types::{Fingerprint, SourceRecord, SyncState, TargetRecord};
use serde_json::json;

struct Fixture {
    _db: Database,
    records: RecordStore,
    source_id: propsync_types::SourceId,
    target_id: propsync_types::TargetId,
}

fn setup() -> Fixture {
    let db = Database::open_in_memory().unwrap();
    let registry = Registry::new(&db);
    let tenant = registry.create_tenant("acme", "k").unwrap();
    let source = registry.create_source(tenant.id, "feed", "json_feed", None).unwrap();
    let target = registry.create_target(tenant.id, "portal", "portal", None).unwrap();
    Fixture {
        records: RecordStore::new(&db),
        _db: db,
        source_id: source.id,
        target_id: target.id,
    }
}

// ── Source records ───────────────────────────────────────────────

#[test]
fn insert_and_get_source_record() {
    let fx = setup();
    let record = SourceRecord::new(fx.source_id, "P-1", json!({"price": 100}));
    fx.records.insert_source_record(&record).unwrap();

    let loaded = fx.records.get_source_record(fx.source_id, "P-1").unwrap().unwrap();
    assert_eq!(loaded, record);
}

#[test]
fn get_missing_source_record_is_none() {
    let fx = setup();
    assert!(fx.records.get_source_record(fx.source_id, "P-404").unwrap().is_none());
}

#[test]
fn external_id_is_unique_within_source() {
    let fx = setup();
    fx.records
        .insert_source_record(&SourceRecord::new(fx.source_id, "P-1", json!({"a": 1})))
        .unwrap();
    let dup = SourceRecord::new(fx.source_id, "P-1", json!({"a": 2}));
    assert!(fx.records.insert_source_record(&dup).is_err());
}

#[test]
fn overwrite_source_record_replaces_content() {
    let fx = setup();
    let record = SourceRecord::new(fx.source_id, "P-1", json!({"price": 100}));
    fx.records.insert_source_record(&record).unwrap();

    let new_doc = json!({"price": 120});
    let new_fp = Fingerprint::of(&new_doc);
    std::thread::sleep(std::time::Duration::from_millis(2));
    fx.records
        .overwrite_source_record(record.id, &new_doc, &new_fp, now_utc())
        .unwrap();

    let loaded = fx.records.get_source_record(fx.source_id, "P-1").unwrap().unwrap();
    assert_eq!(loaded.document, new_doc);
    assert_eq!(loaded.fingerprint, new_fp);
    assert_eq!(loaded.created_at, record.created_at);
    assert!(loaded.updated_at > record.updated_at);
}

#[test]
fn list_source_records_is_scoped_and_ordered() {
    let fx = setup();
    for eid in ["P-2", "P-1", "P-3"] {
        fx.records
            .insert_source_record(&SourceRecord::new(fx.source_id, eid, json!({"id": eid})))
            .unwrap();
    }
    let listed = fx.records.list_source_records(fx.source_id).unwrap();
    let ids: Vec<&str> = listed.iter().map(|r| r.external_id.as_str()).collect();
    assert_eq!(ids, vec!["P-1", "P-2", "P-3"]);
}

// ── Target records ───────────────────────────────────────────────

#[test]
fn insert_and_get_target_record() {
    let fx = setup();
    let source = SourceRecord::new(fx.source_id, "P-1", json!({"price": 100}));
    let target = TargetRecord::from_source(fx.target_id, &source);
    fx.records.insert_target_record(&target).unwrap();

    let loaded = fx.records.get_target_record(fx.target_id, "P-1").unwrap().unwrap();
    assert_eq!(loaded, target);
    assert_eq!(loaded.source_record_id, Some(source.id));
}

#[test]
fn sync_state_round_trips_through_storage() {
    let fx = setup();
    let source = SourceRecord::new(fx.source_id, "P-1", json!({"price": 100}));
    let target = TargetRecord::from_source(fx.target_id, &source);
    fx.records.insert_target_record(&target).unwrap();

    let diverged = SyncState::Diverged {
        note: "manual changes detected".to_string(),
        detected_at: now_utc(),
    };
    fx.records.set_sync_state(target.id, &diverged).unwrap();

    let loaded = fx.records.get_target_record_by_id(target.id).unwrap().unwrap();
    assert_eq!(loaded.sync_state, diverged);

    fx.records.set_sync_state(target.id, &SyncState::Synced).unwrap();
    let loaded = fx.records.get_target_record_by_id(target.id).unwrap().unwrap();
    assert_eq!(loaded.sync_state, SyncState::Synced);
}

#[test]
fn overwrite_target_record_keeps_sync_state() {
    let fx = setup();
    let source = SourceRecord::new(fx.source_id, "P-1", json!({"price": 100}));
    let target = TargetRecord::from_source(fx.target_id, &source);
    fx.records.insert_target_record(&target).unwrap();

    let new_source = SourceRecord::new(fx.source_id, "P-1", json!({"price": 200}));
    fx.records
        .overwrite_target_record(
            target.id,
            &new_source.document,
            &new_source.fingerprint,
            new_source.id,
            now_utc(),
        )
        .unwrap();

    let loaded = fx.records.get_target_record_by_id(target.id).unwrap().unwrap();
    assert_eq!(loaded.document, json!({"price": 200}));
    assert_eq!(loaded.source_record_id, Some(new_source.id));
    assert_eq!(loaded.sync_state, SyncState::Synced);
}

#[test]
fn apply_manual_edit_keeps_state_and_changes_content() {
    let fx = setup();
    let source = SourceRecord::new(fx.source_id, "P-1", json!({"price": 100}));
    let target = TargetRecord::from_source(fx.target_id, &source);
    fx.records.insert_target_record(&target).unwrap();

    let edited = json!({"price": 99, "note": "hand-tuned"});
    fx.records
        .apply_manual_edit(target.id, &edited, &Fingerprint::of(&edited), now_utc())
        .unwrap();

    let loaded = fx.records.get_target_record_by_id(target.id).unwrap().unwrap();
    assert_eq!(loaded.document, edited);
    // A manual edit alone does not flip the state; detection happens later.
    assert_eq!(loaded.sync_state, SyncState::Synced);
}

#[test]
fn list_target_records_is_scoped_ordered_and_carries_state() {
    let fx = setup();
    for eid in ["P-2", "P-1", "P-3"] {
        let source = SourceRecord::new(fx.source_id, eid, json!({"id": eid}));
        fx.records
            .insert_target_record(&TargetRecord::from_source(fx.target_id, &source))
            .unwrap();
    }
    let diverged = SyncState::Diverged {
        note: "manual changes detected".to_string(),
        detected_at: now_utc(),
    };
    let flagged = fx.records.get_target_record(fx.target_id, "P-2").unwrap().unwrap();
    fx.records.set_sync_state(flagged.id, &diverged).unwrap();

    let listed = fx.records.list_target_records(fx.target_id).unwrap();
    let ids: Vec<&str> = listed.iter().map(|r| r.external_id.as_str()).collect();
    assert_eq!(ids, vec!["P-1", "P-2", "P-3"]);
    assert_eq!(listed[1].sync_state, diverged);
    assert_eq!(listed[0].sync_state, SyncState::Synced);

    // Records under a different target are invisible.
    assert!(fx.records.list_target_records(propsync_types::TargetId::new()).unwrap().is_empty());
}

#[test]
fn overwrite_missing_record_is_not_found() {
    let fx = setup();
    let doc = json!({});
    let err = fx
        .records
        .overwrite_source_record(propsync_types::RecordId::new(), &doc, &Fingerprint::of(&doc), now_utc())
        .unwrap_err();
    assert!(matches!(err, propsync_storage::StorageError::NotFound(_)));
}

// ── Unit of work ─────────────────────────────────────────────────

#[test]
fn dropped_unit_of_work_rolls_back() {
    let fx = setup();
    {
        let uow = fx._db.begin().unwrap();
        fx.records
            .insert_source_record(&SourceRecord::new(fx.source_id, "P-1", json!({"a": 1})))
            .unwrap();
        drop(uow); // no commit
    }
    assert!(fx.records.get_source_record(fx.source_id, "P-1").unwrap().is_none());
}

#[test]
fn committed_unit_of_work_persists() {
    let fx = setup();
    let uow = fx._db.begin().unwrap();
    fx.records
        .insert_source_record(&SourceRecord::new(fx.source_id, "P-1", json!({"a": 1})))
        .unwrap();
    uow.commit().unwrap();

    assert!(fx.records.get_source_record(fx.source_id, "P-1").unwrap().is_some());
}
