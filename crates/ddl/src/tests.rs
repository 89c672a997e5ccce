//! End-to-end CREATE TABLE scenarios over a committed catalog.

use catalog::{CatalogStore, IndexType, TableState};
use common::{ConstraintValidity, SessionData, SqlError, SqlResult, TableName};
use expr::Expr;
use parser::{
    ColumnDef, CreateTable, IndexDef, IndexElem, InterleaveDef, ShardedDef, TableDef,
    UniqueConstraintDef, parse_create_table,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use testsupport::prelude::*;
use types::SqlType;

use crate::{
    CancelToken, CreateTableOutcome, RefusePartitioning, SessionContext, create_table,
};

fn exec(
    store: &mut CatalogStore,
    ctx: &SessionContext,
    stmt: &CreateTable,
) -> SqlResult<CreateTableOutcome> {
    let mut txn = store.begin();
    let outcome = create_table(
        &mut txn,
        ctx,
        &RefusePartitioning,
        stmt,
        None,
        &CancelToken::new(),
    )?;
    txn.commit()?;
    Ok(outcome)
}

fn exec_sql(
    store: &mut CatalogStore,
    ctx: &SessionContext,
    sql: &str,
) -> SqlResult<CreateTableOutcome> {
    let stmt = parse_create_table(sql)?;
    exec(store, ctx, &stmt)
}

#[test]
fn foreign_keys_within_one_transaction_go_public() {
    let mut store = CatalogStore::new();
    let ctx = SessionContext::default();
    let parent_stmt = parse_create_table("CREATE TABLE parent (a INT8 PRIMARY KEY)").unwrap();
    let child_stmt = parse_create_table(
        "CREATE TABLE child (id INT8 PRIMARY KEY, pa INT8 REFERENCES parent (a))",
    )
    .unwrap();

    let mut txn = store.begin();
    let cancel = CancelToken::new();
    let parent = create_table(&mut txn, &ctx, &RefusePartitioning, &parent_stmt, None, &cancel)
        .unwrap();
    let child = create_table(&mut txn, &ctx, &RefusePartitioning, &child_stmt, None, &cancel)
        .unwrap();
    txn.commit().unwrap();

    let parent = store.table_by_id(parent.table_id).unwrap();
    let child = store.table_by_id(child.table_id).unwrap();
    // Both references resolve within the transaction, so the child is live
    // immediately and the constraint needs no validation pass.
    assert_eq!(child.state, TableState::Public);
    assert_eq!(child.outbound_fks.len(), 1);
    assert_eq!(child.outbound_fks[0].validity, ConstraintValidity::Validated);
    assert_eq!(parent.inbound_fks, child.outbound_fks);
}

#[test]
fn referencing_a_committed_table_parks_the_child_in_add_state() {
    let mut store = seeded_store();
    let ctx = SessionContext::default();
    let outcome = exec_sql(
        &mut store,
        &ctx,
        "CREATE TABLE receipts (id INT8 PRIMARY KEY, cid INT8 REFERENCES customers (cid))",
    )
    .unwrap();

    let child = store.table_by_id(outcome.table_id).unwrap();
    assert_eq!(child.state, TableState::Add);

    // The referenced table picked up the back reference and a version bump.
    let customers = store
        .lookup_table(
            catalog::DEFAULT_DATABASE_ID,
            catalog::PUBLIC_SCHEMA_ID,
            "customers",
        )
        .unwrap();
    let customers = store.table_by_id(customers).unwrap();
    assert_eq!(customers.inbound_fks, child.outbound_fks);
    assert_eq!(customers.version, 2);
}

#[test]
fn temporary_tables_cannot_reference_permanent_ones() {
    let mut store = seeded_store();
    let ctx = SessionContext {
        session: SessionData::builder().temp_tables_enabled(true).build(),
        ..SessionContext::default()
    };
    let err = exec_sql(
        &mut store,
        &ctx,
        "CREATE TEMPORARY TABLE scratch (id INT8 PRIMARY KEY, cid INT8 REFERENCES customers (cid))",
    )
    .unwrap_err();
    assert!(matches!(err, SqlError::InvalidForeignKey(_)));

    // The failed statement committed nothing.
    assert!(
        store
            .tables()
            .all(|t| t.name != "scratch" && t.inbound_fks.is_empty())
    );
}

#[test]
fn failed_cascading_action_commits_nothing() {
    let mut store = seeded_store();
    let ctx = SessionContext::default();
    let err = exec_sql(
        &mut store,
        &ctx,
        "CREATE TABLE receipts (id INT8 PRIMARY KEY, \
         cid INT8 NOT NULL REFERENCES customers (cid) ON DELETE SET NULL)",
    )
    .unwrap_err();
    assert!(matches!(err, SqlError::InvalidForeignKey(_)));
    assert!(store.tables().all(|t| t.inbound_fks.is_empty()));
}

#[test]
fn hash_sharded_primary_key_end_to_end() {
    let mut store = CatalogStore::new();
    let ctx = SessionContext {
        session: SessionData::builder()
            .hash_sharded_indexes_enabled(true)
            .build(),
        ..SessionContext::default()
    };
    let mut pk = IndexDef::on(vec![IndexElem::asc("id")]);
    pk.sharded = Some(ShardedDef {
        shard_buckets: Expr::int(4),
    });
    let stmt = CreateTable {
        name: TableName::new("events"),
        defs: vec![
            TableDef::Column(ColumnDef::new("id", SqlType::Int8)),
            TableDef::Unique(UniqueConstraintDef {
                index: pk,
                primary_key: true,
                without_index: false,
            }),
        ],
        ..CreateTable::default()
    };
    let outcome = exec(&mut store, &ctx, &stmt).unwrap();
    let tbl = store.table_by_id(outcome.table_id).unwrap();

    // The shard column is hidden, computed, and leads the primary key.
    let shard = tbl.column_by_name("id_shard_4").unwrap();
    assert!(shard.hidden);
    assert!(!shard.nullable);
    assert_eq!(shard.ty, SqlType::Int4);
    assert_eq!(
        shard.compute_expr.as_deref(),
        Some("mod(fnv32(COALESCE(id::STRING, '')), 4)")
    );
    assert_eq!(
        tbl.primary_index.column_names,
        vec!["id_shard_4".to_string(), "id".to_string()]
    );
    assert_eq!(tbl.primary_index.sharded.as_ref().unwrap().shard_buckets, 4);

    // The bucket-range check rides along as a hidden constraint.
    let check = tbl
        .checks
        .iter()
        .find(|c| c.name == "check_id_shard_4")
        .expect("hidden shard check");
    assert!(check.hidden);
    assert_eq!(check.expr, "id_shard_4 IN (0, 1, 2, 3)");

    // The shard column shares a family with the column it hashes.
    let family = tbl
        .families
        .iter()
        .find(|f| f.column_names.contains(&"id".to_string()))
        .unwrap();
    assert!(family.column_names.contains(&"id_shard_4".to_string()));
}

fn interleaved_child_stmt(name: &str) -> CreateTable {
    CreateTable {
        name: TableName::new(name),
        defs: vec![
            TableDef::Column(ColumnDef::new("cid", SqlType::Int8)),
            TableDef::Column(ColumnDef::new("oid", SqlType::Int8)),
            TableDef::Unique(UniqueConstraintDef {
                index: IndexDef::on(vec![IndexElem::asc("cid"), IndexElem::asc("oid")]),
                primary_key: true,
                without_index: false,
            }),
        ],
        interleave: Some(InterleaveDef {
            parent: TableName::new("customers"),
            fields: vec!["cid".into()],
        }),
        ..CreateTable::default()
    }
}

#[test]
fn interleaved_child_created_with_its_parent_goes_public() {
    let mut store = CatalogStore::new();
    let ctx = SessionContext::default();
    let parent_stmt = parse_create_table("CREATE TABLE customers (cid INT8 PRIMARY KEY)").unwrap();
    let child_stmt = interleaved_child_stmt("orders");

    let mut txn = store.begin();
    let cancel = CancelToken::new();
    let parent = create_table(&mut txn, &ctx, &RefusePartitioning, &parent_stmt, None, &cancel)
        .unwrap();
    let child = create_table(&mut txn, &ctx, &RefusePartitioning, &child_stmt, None, &cancel)
        .unwrap();
    txn.commit().unwrap();

    let parent = store.table_by_id(parent.table_id).unwrap();
    let child = store.table_by_id(child.table_id).unwrap();
    assert_eq!(child.state, TableState::Public);
    assert_eq!(child.primary_index.interleave.len(), 1);
    assert_eq!(child.primary_index.interleave[0].table_id, parent.id);
    assert_eq!(parent.primary_index.interleaved_by.len(), 1);
    assert_eq!(parent.primary_index.interleaved_by[0].table_id, child.id);
}

#[test]
fn interleaved_child_of_a_committed_parent_stays_in_add_state() {
    let mut store = seeded_store();
    let ctx = SessionContext::default();
    let outcome = exec(&mut store, &ctx, &interleaved_child_stmt("order_lines")).unwrap();

    let child = store.table_by_id(outcome.table_id).unwrap();
    assert_eq!(child.state, TableState::Add);
    // The parent back-reference is written regardless of publication.
    let customers = store
        .lookup_table(
            catalog::DEFAULT_DATABASE_ID,
            catalog::PUBLIC_SCHEMA_ID,
            "customers",
        )
        .unwrap();
    let customers = store.table_by_id(customers).unwrap();
    assert_eq!(customers.primary_index.interleaved_by[0].table_id, child.id);
}

#[test]
fn sequence_backed_default_commits_the_dependency() {
    let mut store = seeded_store();
    let ctx = SessionContext::default();
    let outcome = exec_sql(
        &mut store,
        &ctx,
        "CREATE TABLE invoices (id INT8 PRIMARY KEY DEFAULT nextval('order_seq'))",
    )
    .unwrap();

    let tbl = store.table_by_id(outcome.table_id).unwrap();
    assert_eq!(tbl.state, TableState::Public);
    let seq_id = tbl.column_by_name("id").unwrap().uses_sequence_ids[0];
    let seq = store.table_by_id(seq_id).unwrap();
    assert_eq!(seq.name, "order_seq");
    assert_eq!(seq.depended_on_by, vec![tbl.id]);
}

#[test]
fn inverted_index_on_geometry_records_srid() {
    let mut store = CatalogStore::new();
    let ctx = SessionContext::default();
    let mut inverted = IndexDef::on(vec![IndexElem::asc("geom")]);
    inverted.inverted = true;
    let stmt = CreateTable {
        name: TableName::new("shapes"),
        defs: vec![
            TableDef::Column(ColumnDef::new("id", SqlType::Int8).primary_key()),
            TableDef::Column(ColumnDef::new("geom", SqlType::Geometry { srid: 4326 })),
            TableDef::Index(inverted),
        ],
        ..CreateTable::default()
    };
    let outcome = exec(&mut store, &ctx, &stmt).unwrap();

    let tbl = store.table_by_id(outcome.table_id).unwrap();
    let idx = &tbl.indexes[0];
    assert_eq!(idx.index_type, IndexType::Inverted);
    assert_eq!(
        idx.geo_config,
        Some(catalog::GeoConfig::Geometry { srid: 4326 })
    );
}

proptest! {
    #[test]
    fn allocate_ids_is_idempotent(mut tbl in arb_table_descriptor()) {
        tbl.allocate_ids().unwrap();
        let once = tbl.clone();
        tbl.allocate_ids().unwrap();
        prop_assert_eq!(once, tbl);
    }
}
