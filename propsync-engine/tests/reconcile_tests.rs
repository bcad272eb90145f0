use pretty_assertions::assert_eq;
use propsync_engine::{
    ConflictGuard, EngineError, ImportEngine, PairLocks, ReconciliationEngine,
};
use propsync_storage::{Database, RecordStore, Registry, RunStore, SnapshotStore, Source, Target};
use propsync_types::{now_utc, Fingerprint, RunStats, RunStatus, SourceId, TenantId};
use serde_json::json;

fn setup() -> (Database, TenantId, Source, Target) {
    tracing_subscriber::fmt().with_test_writer().try_init().ok();
    let db = Database::open_in_memory().unwrap();
    let registry = Registry::new(&db);
    let tenant = registry.create_tenant("acme", "key").unwrap();
    let source = registry
        .create_source(tenant.id, "mls-feed", "json_feed", None)
        .unwrap();
    let target = registry
        .create_target(tenant.id, "portal", "listing_portal", None)
        .unwrap();
    (db, tenant.id, source, target)
}

fn stats(created: u64, updated: u64, skipped: u64, warnings: u64) -> RunStats {
    RunStats {
        created,
        updated,
        skipped,
        warnings,
    }
}

// ── Decision matrix ──────────────────────────────────────────────

#[test]
fn new_source_records_are_created_on_the_target() {
    let (db, tenant_id, source, target) = setup();
    ImportEngine::new(&db, tenant_id)
        .import(source.id, vec![json!({"id": "prop-1", "price": 100_000})])
        .unwrap();

    let run = ReconciliationEngine::new(&db, tenant_id)
        .run(source.id, target.id)
        .unwrap();

    assert_eq!(run.stats, stats(1, 0, 0, 0));
    assert_eq!(run.status, RunStatus::Success);

    let records = RecordStore::new(&db);
    let created = records.get_target_record(target.id, "prop-1").unwrap().unwrap();
    let origin = records.get_source_record(source.id, "prop-1").unwrap().unwrap();
    assert_eq!(created.fingerprint, origin.fingerprint);
    assert_eq!(created.source_record_id, Some(origin.id));
}

#[test]
fn unchanged_records_are_skipped_on_the_second_run() {
    let (db, tenant_id, source, target) = setup();
    ImportEngine::new(&db, tenant_id)
        .import(source.id, vec![json!({"id": "prop-1", "price": 100_000})])
        .unwrap();
    let engine = ReconciliationEngine::new(&db, tenant_id);

    let first = engine.run(source.id, target.id).unwrap();
    let second = engine.run(source.id, target.id).unwrap();

    assert_eq!(first.stats, stats(1, 0, 0, 0));
    assert_eq!(second.stats, stats(0, 0, 1, 0));
    assert_eq!(second.status, RunStatus::Success);
}

#[test]
fn changed_source_content_is_snapshotted_then_applied() {
    let (db, tenant_id, source, target) = setup();
    let importer = ImportEngine::new(&db, tenant_id);
    let engine = ReconciliationEngine::new(&db, tenant_id);
    let v1 = json!({"id": "prop-1", "price": 100_000});
    let v2 = json!({"id": "prop-1", "price": 120_000});

    importer.import(source.id, vec![v1.clone()]).unwrap();
    engine.run(source.id, target.id).unwrap();
    importer.import(source.id, vec![v2.clone()]).unwrap();
    let run = engine.run(source.id, target.id).unwrap();

    assert_eq!(run.stats, stats(0, 1, 0, 0));
    let records = RecordStore::new(&db);
    let record = records.get_target_record(target.id, "prop-1").unwrap().unwrap();
    assert_eq!(record.document, v2);
    assert_eq!(record.fingerprint, Fingerprint::of(&v2));

    // The target's pre-update content was captured before the overwrite.
    let snapshots = SnapshotStore::new(&db).list_for_record(record.id).unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].document, v1);
}

#[test]
fn manual_edits_block_the_update_and_mark_the_run_partial() {
    let (db, tenant_id, source, target) = setup();
    let importer = ImportEngine::new(&db, tenant_id);
    let engine = ReconciliationEngine::new(&db, tenant_id);
    let records = RecordStore::new(&db);

    importer
        .import(source.id, vec![json!({"id": "prop-1", "price": 100_000})])
        .unwrap();
    engine.run(source.id, target.id).unwrap();

    // A human adjusts the target copy directly, and the edit is flagged.
    let record = records.get_target_record(target.id, "prop-1").unwrap().unwrap();
    let edited = json!({"id": "prop-1", "price": 110_000, "note": "negotiated"});
    records
        .apply_manual_edit(record.id, &edited, &Fingerprint::of(&edited), now_utc())
        .unwrap();
    ConflictGuard::new(&db).mark_manual(record.id, now_utc()).unwrap();

    // The source moves too; the run must not clobber the manual edit.
    importer
        .import(source.id, vec![json!({"id": "prop-1", "price": 95_000})])
        .unwrap();
    let run = engine.run(source.id, target.id).unwrap();

    assert_eq!(run.stats, stats(0, 0, 1, 1));
    assert_eq!(run.status, RunStatus::Partial);

    let record = records.get_target_record(target.id, "prop-1").unwrap().unwrap();
    assert_eq!(record.document, edited);
    let note = record.sync_state.note().unwrap();
    assert!(note.contains("manual modifications"), "note: {note}");
}

#[test]
fn mixed_batches_accumulate_all_four_counters() {
    let (db, tenant_id, source, target) = setup();
    let importer = ImportEngine::new(&db, tenant_id);
    let engine = ReconciliationEngine::new(&db, tenant_id);
    let records = RecordStore::new(&db);

    importer
        .import(
            source.id,
            vec![
                json!({"id": "unchanged", "price": 1}),
                json!({"id": "updated", "price": 2}),
                json!({"id": "conflicted", "price": 3}),
            ],
        )
        .unwrap();
    engine.run(source.id, target.id).unwrap();

    let conflicted = records.get_target_record(target.id, "conflicted").unwrap().unwrap();
    let edited = json!({"id": "conflicted", "price": 99});
    records
        .apply_manual_edit(conflicted.id, &edited, &Fingerprint::of(&edited), now_utc())
        .unwrap();
    ConflictGuard::new(&db).mark_manual(conflicted.id, now_utc()).unwrap();

    importer
        .import(
            source.id,
            vec![
                json!({"id": "updated", "price": 20}),
                json!({"id": "conflicted", "price": 30}),
                json!({"id": "brand-new", "price": 4}),
            ],
        )
        .unwrap();
    let run = engine.run(source.id, target.id).unwrap();

    // created: brand-new; updated: updated; skipped: unchanged + conflicted.
    assert_eq!(run.stats, stats(1, 1, 2, 1));
    assert_eq!(run.status, RunStatus::Partial);
}

// ── Audit log ────────────────────────────────────────────────────

#[test]
fn a_run_row_is_appended_even_for_an_empty_source() {
    let (db, tenant_id, source, target) = setup();

    let run = ReconciliationEngine::new(&db, tenant_id)
        .run(source.id, target.id)
        .unwrap();

    assert_eq!(run.stats, RunStats::default());
    assert_eq!(run.status, RunStatus::Success);
    let listed = RunStore::new(&db).list_for_tenant(tenant_id, 10).unwrap();
    assert_eq!(listed, vec![run]);
}

// ── Preconditions ────────────────────────────────────────────────

#[test]
fn unknown_source_fails_before_any_side_effect() {
    let (db, tenant_id, _source, target) = setup();

    let err = ReconciliationEngine::new(&db, tenant_id)
        .run(SourceId::new(), target.id)
        .unwrap_err();

    assert!(matches!(err, EngineError::NotFound(_)));
    assert!(RunStore::new(&db).list_for_tenant(tenant_id, 10).unwrap().is_empty());
}

#[test]
fn pairs_of_other_tenants_are_invisible() {
    let (db, _tenant_id, source, target) = setup();
    let other = Registry::new(&db).create_tenant("rival", "key2").unwrap();

    let err = ReconciliationEngine::new(&db, other.id)
        .run(source.id, target.id)
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

// ── Concurrency ──────────────────────────────────────────────────

#[test]
fn concurrent_runs_on_the_same_pair_both_complete() {
    let (db, tenant_id, source, target) = setup();
    ImportEngine::new(&db, tenant_id)
        .import(source.id, vec![json!({"id": "prop-1", "price": 1})])
        .unwrap();

    let locks = PairLocks::new();
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let engine = ReconciliationEngine::with_locks(&db, tenant_id, locks.clone());
            std::thread::spawn(move || engine.run(source.id, target.id).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // One run created the record, the other skipped it; both were logged.
    let runs = RunStore::new(&db).list_for_tenant(tenant_id, 10).unwrap();
    assert_eq!(runs.len(), 2);
    let totals = runs.iter().fold((0, 0), |(c, s), run| {
        (c + run.stats.created, s + run.stats.skipped)
    });
    assert_eq!(totals, (1, 1));
}
