//! Multi-pass assembly of a table descriptor from a parsed CREATE TABLE
//! statement. Columns land first, then indexes and constraints, with id
//! allocation pivoting the build from name-based to id-based resolution.

use catalog::{
    CheckConstraint, Map, SchemaResolver, TableDescriptor, Transaction,
    generate_unique_constraint_name,
};
use common::{ConstraintValidity, DescId, SqlError, SqlResult, TableName};
use expr::{Expr, dequalify_column_refs};
use parser::{
    CheckConstraintDef, ColumnDef, ComputedDef, CreateTable, ForeignKeyDef, IndexDef, IndexElem,
    LikeOptSet, Locality, Nullability, OnCommit, ShardedDef, TableDef, UniqueConstraintDef,
    parse_expr_text,
};
use types::SqlType;

use crate::SessionContext;
use crate::column::{build_column, validate_column_type};
use crate::fk::{FkSelfResolver, FkTableState, ValidationBehavior, resolve_fk};
use crate::index::{apply_index_sharding, build_index};
use crate::interleave::add_interleave;
use crate::partition::PartitioningHook;

/// A fully assembled descriptor plus every other descriptor the statement
/// touched: FK-referenced tables gaining inbound constraints and sequences
/// gaining dependency back-references. The executor writes them all in the
/// same transaction.
#[derive(Debug)]
pub struct BuiltTable {
    pub desc: TableDescriptor,
    pub affected: Map<DescId, TableDescriptor>,
}

/// Expand every `LIKE <table>` entry in a definition list into the concrete
/// column, check, and index definitions it stands for. Hidden columns and
/// hidden checks never carry over.
pub fn replace_like_table_defs(
    resolver: &dyn SchemaResolver,
    database_id: DescId,
    defs: &[TableDef],
) -> SqlResult<Vec<TableDef>> {
    let mut out = Vec::with_capacity(defs.len());
    for def in defs {
        let TableDef::Like(like) = def else {
            out.push(def.clone());
            continue;
        };
        let opts = LikeOptSet::from_options(&like.options);
        let source_id = resolver
            .resolve_table_id(database_id, &like.name)?
            .ok_or_else(|| SqlError::UndefinedTable(like.name.to_string()))?;
        let source = resolver.table(source_id)?;

        for col in &source.columns {
            if col.hidden {
                continue;
            }
            let mut def = ColumnDef::new(&col.name, col.ty.clone());
            if !col.nullable {
                def.nullability = Nullability::NotNull;
            }
            if opts.defaults {
                if let Some(text) = &col.default_expr {
                    def.default_expr = Some(parse_expr_text(text)?);
                }
            }
            if opts.generated {
                if let Some(text) = &col.compute_expr {
                    def.computed = Some(ComputedDef {
                        expr: parse_expr_text(text)?,
                        virtual_: false,
                    });
                }
            }
            out.push(TableDef::Column(def));
        }
        if opts.constraints {
            for check in &source.checks {
                if check.hidden {
                    continue;
                }
                out.push(TableDef::Check(CheckConstraintDef {
                    name: Some(check.name.clone()),
                    expr: parse_expr_text(&check.expr)?,
                    hidden: false,
                }));
            }
        }
        if opts.indexes {
            let pk = &source.primary_index;
            // A primary key over a single hidden column is the synthesized
            // rowid; the copy gets its own.
            let synthesized_pk = pk.column_names.len() == 1
                && source
                    .find_column_by_name(&pk.column_names[0])
                    .is_some_and(|c| c.hidden);
            if !synthesized_pk {
                out.push(TableDef::Unique(UniqueConstraintDef {
                    index: index_def_from_descriptor(pk),
                    primary_key: true,
                    without_index: false,
                }));
            }
            for idx in &source.indexes {
                let def = index_def_from_descriptor(idx);
                if idx.unique {
                    out.push(TableDef::Unique(UniqueConstraintDef {
                        index: def,
                        primary_key: false,
                        without_index: false,
                    }));
                } else {
                    out.push(TableDef::Index(def));
                }
            }
        }
    }
    Ok(out)
}

fn index_def_from_descriptor(idx: &catalog::IndexDescriptor) -> IndexDef {
    let columns = idx
        .column_names
        .iter()
        .zip(&idx.directions)
        .map(|(name, dir)| IndexElem {
            column: name.clone(),
            direction: *dir,
        })
        .collect();
    let mut def = IndexDef::on(columns);
    def.storing = idx.store_column_names.clone();
    def.inverted = idx.index_type == catalog::IndexType::Inverted;
    def
}

/// Storage parameters accepted and ignored for PostgreSQL compatibility.
const IGNORED_STORAGE_PARAMS: &[&str] = &["fillfactor", "autovacuum_enabled"];

/// Build the descriptor for a plain CREATE TABLE statement. The transaction
/// is only read from; all writes stay in the returned [`BuiltTable`] until
/// the executor commits them.
pub fn new_table_desc(
    txn: &Transaction<'_>,
    ctx: &SessionContext,
    hook: &dyn PartitioningHook,
    stmt: &CreateTable,
    id: DescId,
    schema_id: DescId,
) -> SqlResult<BuiltTable> {
    for (param, _) in &stmt.storage_params {
        // PostgreSQL heap-tuning parameters have no meaning here and are
        // accepted for compatibility.
        if !IGNORED_STORAGE_PARAMS.contains(&param.as_str()) {
            return Err(SqlError::FeatureNotSupported(format!(
                "storage parameter \"{param}\" is not supported"
            )));
        }
    }
    if stmt.on_commit == OnCommit::PreserveRows && !stmt.persistence.is_temporary() {
        return Err(SqlError::Syntax(
            "ON COMMIT can only be used on temporary tables".into(),
        ));
    }

    let defs = replace_like_table_defs(txn, ctx.database_id, &stmt.defs)?;

    let mut tbl = TableDescriptor::new(id, ctx.database_id, schema_id, &stmt.name.table);
    tbl.temporary = stmt.persistence.is_temporary();
    let mut affected: Map<DescId, TableDescriptor> = Map::default();

    // Pass 1: columns and families. Index, check, and FK definitions are
    // queued; defaults and computed expressions wait for the full column set.
    let mut primary: Option<IndexDef> = None;
    let mut primary_sharded: Option<ShardedDef> = None;
    let mut explicit_null: Vec<String> = Vec::new();
    let mut deferred_defaults: Vec<(String, Expr)> = Vec::new();
    let mut deferred_computed: Vec<(String, Expr)> = Vec::new();
    let mut index_defs: Vec<(IndexDef, bool)> = Vec::new();
    let mut pending_checks: Vec<CheckConstraintDef> = Vec::new();
    let mut fk_defs: Vec<ForeignKeyDef> = Vec::new();
    let mut column_families: Vec<(String, String)> = Vec::new();

    for def in &defs {
        match def {
            TableDef::Column(col) => {
                validate_column_type(&col.ty, &ctx.settings)?;
                if tbl.find_column_by_name(&col.name).is_some() {
                    return Err(SqlError::DuplicateObject(format!(
                        "duplicate column name: \"{}\"",
                        col.name
                    )));
                }
                let desc = build_column(col, &ctx.settings)?;
                if col.primary_key {
                    set_primary_key(
                        &mut primary,
                        &tbl.name,
                        IndexDef::on(vec![IndexElem::asc(&col.name)]),
                    )?;
                    primary_sharded = col.sharded.clone();
                } else if col.sharded.is_some() {
                    return Err(SqlError::Syntax(
                        "USING HASH is only valid on primary key and index definitions".into(),
                    ));
                }
                if col.unique {
                    index_defs.push((IndexDef::on(vec![IndexElem::asc(&col.name)]), true));
                }
                if let Some(expr) = &col.default_expr {
                    deferred_defaults.push((col.name.clone(), expr.clone()));
                }
                if let Some(computed) = &col.computed {
                    deferred_computed.push((col.name.clone(), computed.expr.clone()));
                }
                if let Some(fk) = &col.references {
                    fk_defs.push(fk.clone());
                }
                if col.nullability == Nullability::Null {
                    explicit_null.push(col.name.clone());
                }
                if let Some(family) = &col.family {
                    column_families.push((col.name.clone(), family.clone()));
                }
                tbl.columns.push(desc);
            }
            TableDef::Family(fam) => {
                let name = fam
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("fam_{}", tbl.families.len()));
                tbl.add_family(name, fam.columns.clone());
            }
            TableDef::Index(def) => index_defs.push((def.clone(), false)),
            TableDef::Unique(u) if u.primary_key => {
                set_primary_key(&mut primary, &tbl.name, u.index.clone())?;
                primary_sharded = u.index.sharded.clone();
            }
            TableDef::Unique(u) => {
                if u.without_index {
                    return Err(SqlError::FeatureNotSupported(
                        "unique constraints without an index are not supported".into(),
                    ));
                }
                index_defs.push((u.index.clone(), true));
            }
            TableDef::Check(def) => pending_checks.push(def.clone()),
            TableDef::ForeignKey(def) => fk_defs.push(def.clone()),
            TableDef::Like(_) => {
                return Err(SqlError::AssertionFailed(
                    "LIKE definitions must be expanded before assembly".into(),
                ));
            }
        }
    }

    if primary.is_none() && ctx.session.require_explicit_primary_keys {
        return Err(SqlError::InvalidTableDefinition(format!(
            "no primary key specified for table {} (require_explicit_primary_keys = true)",
            tbl.name
        )));
    }

    // Computed expressions are stored dequalified; table qualifiers go stale
    // the moment the table is renamed.
    let column_names: Vec<String> = tbl.columns.iter().map(|c| c.name.clone()).collect();
    for (name, expr) in &deferred_computed {
        let deq = dequalify_column_refs(expr, &tbl.name, &column_names)?;
        tbl.column_mut_by_name(name)?.compute_expr = Some(deq.to_string());
    }

    // Pass 2: the primary index, then secondary indexes.
    if let Some(pk_def) = &primary {
        for elem in &pk_def.columns {
            tbl.column_by_name(&elem.column)?;
            if explicit_null.contains(&elem.column) {
                return Err(SqlError::InvalidSchemaDefinition(format!(
                    "column \"{}\" is in a primary index and cannot be null",
                    elem.column
                )));
            }
        }
        tbl.primary_index.column_names = pk_def.columns.iter().map(|e| e.column.clone()).collect();
        tbl.primary_index.directions = pk_def.columns.iter().map(|e| e.direction).collect();
        tbl.primary_index.unique = true;
        if let Some(name) = &pk_def.name {
            tbl.primary_index.name = name.clone();
        }
        for elem in &pk_def.columns {
            tbl.column_mut_by_name(&elem.column)?.nullable = false;
        }
        if let Some(sharded) = &primary_sharded {
            let mut pk = tbl.primary_index.clone();
            apply_index_sharding(&mut tbl, &mut pk, sharded, &ctx.session, &mut pending_checks)?;
            tbl.primary_index = pk;
        }
    }

    for (def, unique) in &index_defs {
        if let Some(name) = &def.name {
            if tbl.find_index_by_name(name).is_some() {
                return Err(SqlError::DuplicateObject(format!(
                    "duplicate index name: \"{name}\""
                )));
            }
        }
        let mut idx = build_index(def, &tbl, &ctx.session)?;
        idx.unique = *unique;
        if let Some(sharded) = &def.sharded {
            apply_index_sharding(&mut tbl, &mut idx, sharded, &ctx.session, &mut pending_checks)?;
        }
        if let Some(spec) = &def.partition_by {
            hook.create_partitioning(&tbl, &mut idx, spec)?;
        }
        tbl.indexes.push(idx);
    }

    // Explicit per-column FAMILY clauses, then shard columns join the family
    // of the first key column they hash.
    for (col, family) in &column_families {
        match tbl.families.iter_mut().find(|f| f.name == *family) {
            Some(f) => f.column_names.push(col.clone()),
            None => {
                tbl.add_family(family.clone(), vec![col.clone()]);
            }
        }
    }
    assign_shard_columns_to_families(&mut tbl);

    // Pivot: every column and index gets its permanent id. Name-based
    // resolution below here is a convenience, not a requirement.
    tbl.allocate_ids()?;

    if let Some(def) = &stmt.interleave {
        add_interleave(txn, ctx.database_id, &mut tbl, def)?;
    }
    if let Some(spec) = &stmt.partition_by {
        if tbl.primary_index.is_sharded() {
            return Err(SqlError::InvalidSchemaDefinition(
                "sharded indexes don't support partitioning".into(),
            ));
        }
        let mut pk = tbl.primary_index.clone();
        hook.create_partitioning(&tbl, &mut pk, spec)?;
        tbl.primary_index = pk;
    }

    // Defaults bind now, recording which sequences each one draws from.
    for (name, expr) in &deferred_defaults {
        let mut sequence_ids = Vec::new();
        collect_sequence_deps(txn, ctx.database_id, expr, &mut sequence_ids)?;
        for seq_id in &sequence_ids {
            if !affected.contains_key(seq_id) {
                let seq = txn.get_table(*seq_id)?;
                if !seq.is_sequence() {
                    return Err(SqlError::InvalidTableDefinition(format!(
                        "\"{}\" is not a sequence",
                        seq.name
                    )));
                }
                affected.insert(*seq_id, seq);
            }
            if let Some(seq) = affected.get_mut(seq_id) {
                if !seq.depended_on_by.contains(&tbl.id) {
                    seq.depended_on_by.push(tbl.id);
                }
            }
        }
        let col = tbl.column_mut_by_name(name)?;
        col.uses_sequence_ids = sequence_ids;
        col.default_expr = Some(expr.to_string());
    }

    // Checks, including the hidden shard-range checks queued above.
    let column_names: Vec<String> = tbl.columns.iter().map(|c| c.name.clone()).collect();
    for def in &pending_checks {
        let deq = dequalify_column_refs(&def.expr, &tbl.name, &column_names)?;
        let mut column_ids = Vec::new();
        let referenced = deq.referenced_columns();
        for col_name in &referenced {
            let col = tbl.column_by_name(col_name)?;
            if !column_ids.contains(&col.id) {
                column_ids.push(col.id);
            }
        }
        let name = match &def.name {
            Some(name) => {
                if tbl.constraint_name_in_use(name) {
                    return Err(SqlError::DuplicateObject(format!(
                        "duplicate constraint name: \"{name}\""
                    )));
                }
                name.clone()
            }
            None => {
                let base = format!("check_{}", referenced.join("_"));
                generate_unique_constraint_name(&base, |n| tbl.constraint_name_in_use(n))
            }
        };
        tbl.checks.push(CheckConstraint {
            name,
            expr: deq.to_string(),
            validity: ConstraintValidity::Validated,
            column_ids,
            hidden: def.hidden,
        });
    }

    // Foreign keys resolve through a resolver that knows the table being
    // built by name, so self-references land on this very descriptor.
    let resolver: &dyn SchemaResolver = txn;
    let self_resolver = FkSelfResolver::new(resolver, tbl.id, stmt.name.clone());
    for def in &fk_defs {
        resolve_fk(
            &self_resolver,
            &ctx.settings,
            ctx.database_id,
            &mut tbl,
            def,
            &mut affected,
            FkTableState::NewTable,
            ValidationBehavior::Default,
        )?;
    }

    // Computed columns may reference only stored, non-computed columns.
    for (name, expr) in &deferred_computed {
        for col_name in expr.referenced_columns() {
            let col = tbl.column_by_name(&col_name)?;
            if col.is_computed() {
                return Err(SqlError::InvalidTableDefinition(format!(
                    "computed column \"{name}\" cannot reference other computed columns"
                )));
            }
        }
    }

    // Second allocation picks up anything added since the pivot (FK auto
    // indexes and the like); it is strictly additive.
    tbl.allocate_ids()?;

    if let Some(locality) = &stmt.locality {
        let db = txn.database(ctx.database_id)?;
        if !db.is_multi_region() {
            return Err(SqlError::InvalidTableDefinition(format!(
                "cannot set LOCALITY on table \"{}\": database \"{}\" is not multi-region \
                 enabled",
                tbl.name, db.name
            )));
        }
        if let Locality::RegionalByTable {
            region: Some(region),
        } = locality
        {
            if !db.regions.contains(region) {
                return Err(SqlError::InvalidTableDefinition(format!(
                    "region \"{region}\" has not been added to database \"{}\"",
                    db.name
                )));
            }
        }
        tbl.locality = Some(match locality {
            Locality::Global => catalog::LocalityConfig::Global,
            Locality::RegionalByTable { region } => catalog::LocalityConfig::RegionalByTable {
                region: region.clone(),
            },
            Locality::RegionalByRow => catalog::LocalityConfig::RegionalByRow,
        });
    }

    Ok(BuiltTable {
        desc: tbl,
        affected,
    })
}

/// Build the descriptor for CREATE TABLE AS. Column names and types come
/// from the source query's schema; the statement's own definition list may
/// only designate the primary key.
pub fn new_table_desc_if_as(
    txn: &Transaction<'_>,
    ctx: &SessionContext,
    hook: &dyn PartitioningHook,
    stmt: &CreateTable,
    id: DescId,
    schema_id: DescId,
    source_schema: &[(String, SqlType)],
) -> SqlResult<BuiltTable> {
    let mut pk_columns: Vec<String> = Vec::new();
    for def in &stmt.defs {
        match def {
            TableDef::Column(col) => {
                if source_schema.iter().all(|(name, _)| name != &col.name) {
                    return Err(SqlError::UndefinedColumn(col.name.clone()));
                }
                if col.primary_key {
                    pk_columns.push(col.name.clone());
                }
            }
            TableDef::Unique(u) if u.primary_key => {
                for elem in &u.index.columns {
                    if source_schema.iter().all(|(name, _)| name != &elem.column) {
                        return Err(SqlError::UndefinedColumn(elem.column.clone()));
                    }
                    pk_columns.push(elem.column.clone());
                }
            }
            _ => {
                return Err(SqlError::Syntax(
                    "CREATE TABLE AS can only designate columns and a primary key".into(),
                ));
            }
        }
    }

    let mut synth = stmt.clone();
    synth.defs = source_schema
        .iter()
        .map(|(name, ty)| {
            let mut def = ColumnDef::new(name, ty.clone());
            def.primary_key = pk_columns.contains(name);
            TableDef::Column(def)
        })
        .collect();

    let mut built = new_table_desc(txn, ctx, hook, &synth, id, schema_id)?;
    if let Some(source) = &stmt.as_source {
        built.desc.create_query = Some(source.query.clone());
    }
    Ok(built)
}

fn set_primary_key(
    primary: &mut Option<IndexDef>,
    table_name: &str,
    def: IndexDef,
) -> SqlResult<()> {
    if primary.is_some() {
        return Err(SqlError::InvalidSchemaDefinition(format!(
            "multiple primary keys for table \"{table_name}\" are not allowed"
        )));
    }
    *primary = Some(def);
    Ok(())
}

/// A shard column that no explicit family claims lives beside the first key
/// column it hashes.
fn assign_shard_columns_to_families(tbl: &mut TableDescriptor) {
    let shard_cols: Vec<(String, String)> = tbl
        .all_indexes()
        .filter_map(|idx| idx.sharded.as_ref())
        .filter(|s| !s.column_names.is_empty())
        .map(|s| (s.name.clone(), s.column_names[0].clone()))
        .collect();
    for (shard, first_key) in shard_cols {
        if tbl
            .families
            .iter()
            .any(|f| f.column_names.contains(&shard))
        {
            continue;
        }
        if let Some(family) = tbl
            .families
            .iter_mut()
            .find(|f| f.column_names.contains(&first_key))
        {
            family.column_names.push(shard);
        }
    }
}

/// Walk a default expression for `nextval('<sequence>')` calls and resolve
/// each named sequence to its descriptor id.
fn collect_sequence_deps(
    resolver: &dyn SchemaResolver,
    database_id: DescId,
    expr: &Expr,
    out: &mut Vec<DescId>,
) -> SqlResult<()> {
    match expr {
        Expr::Func { name, args } => {
            if name == "nextval" {
                if let Some(Expr::Literal(types::Value::Text(seq_name))) = args.first() {
                    let name = parse_qualified_name(seq_name);
                    let id = resolver
                        .resolve_table_id(database_id, &name)?
                        .ok_or_else(|| SqlError::UndefinedTable(seq_name.clone()))?;
                    if !out.contains(&id) {
                        out.push(id);
                    }
                }
            }
            for arg in args {
                collect_sequence_deps(resolver, database_id, arg, out)?;
            }
        }
        Expr::Coalesce(args) => {
            for arg in args {
                collect_sequence_deps(resolver, database_id, arg, out)?;
            }
        }
        Expr::Cast { expr, .. } | Expr::Unary { expr, .. } => {
            collect_sequence_deps(resolver, database_id, expr, out)?;
        }
        Expr::Binary { left, right, .. } => {
            collect_sequence_deps(resolver, database_id, left, out)?;
            collect_sequence_deps(resolver, database_id, right, out)?;
        }
        Expr::InTuple { expr, list } => {
            collect_sequence_deps(resolver, database_id, expr, out)?;
            for item in list {
                collect_sequence_deps(resolver, database_id, item, out)?;
            }
        }
        Expr::Literal(_) | Expr::Column { .. } => {}
    }
    Ok(())
}

fn parse_qualified_name(name: &str) -> TableName {
    match name.split_once('.') {
        Some((schema, table)) => TableName {
            schema: Some(schema.to_string()),
            table: table.to_string(),
        },
        None => TableName::new(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::RefusePartitioning;
    use catalog::{CatalogStore, SequenceOpts, TableState};
    use common::SessionData;
    use parser::parse_create_table;
    use pretty_assertions::assert_eq;

    fn build(store: &mut CatalogStore, sql: &str) -> SqlResult<BuiltTable> {
        build_with_ctx(store, sql, &SessionContext::default())
    }

    fn build_with_ctx(
        store: &mut CatalogStore,
        sql: &str,
        ctx: &SessionContext,
    ) -> SqlResult<BuiltTable> {
        let stmt = parse_create_table(sql)?;
        let txn = store.begin();
        new_table_desc(
            &txn,
            ctx,
            &RefusePartitioning,
            &stmt,
            DescId(50),
            catalog::PUBLIC_SCHEMA_ID,
        )
    }

    #[test]
    fn columns_families_and_primary_key() {
        let mut store = CatalogStore::new();
        let built = build(
            &mut store,
            "CREATE TABLE kv (k INT8 PRIMARY KEY, v STRING NOT NULL)",
        )
        .unwrap();
        let tbl = built.desc;

        assert_eq!(tbl.columns.len(), 2);
        assert_eq!(tbl.primary_index.name, "primary");
        assert_eq!(tbl.primary_index.column_names, vec!["k".to_string()]);
        assert!(tbl.primary_index.unique);
        assert!(!tbl.column_by_name("k").unwrap().nullable);
        assert!(!tbl.column_by_name("v").unwrap().nullable);
        // One default family holding everything.
        assert_eq!(tbl.families.len(), 1);
        assert_eq!(
            tbl.families[0].column_names,
            vec!["k".to_string(), "v".to_string()]
        );
        assert_eq!(tbl.state, TableState::Public);
        assert!(built.affected.is_empty());
        tbl.validate().unwrap();
    }

    #[test]
    fn missing_primary_key_synthesizes_rowid() {
        let mut store = CatalogStore::new();
        let built = build(&mut store, "CREATE TABLE logs (msg STRING)").unwrap();
        let tbl = built.desc;

        let rowid = tbl.column_by_name("rowid").unwrap();
        assert!(rowid.hidden);
        assert_eq!(rowid.default_expr.as_deref(), Some("unique_rowid()"));
        assert_eq!(tbl.primary_index.column_names, vec!["rowid".to_string()]);
    }

    #[test]
    fn explicit_primary_keys_can_be_required() {
        let mut store = CatalogStore::new();
        let ctx = SessionContext {
            session: SessionData::builder()
                .require_explicit_primary_keys(true)
                .build(),
            ..SessionContext::default()
        };
        let err = build_with_ctx(&mut store, "CREATE TABLE logs (msg STRING)", &ctx).unwrap_err();
        assert!(matches!(err, SqlError::InvalidTableDefinition(_)));
    }

    #[test]
    fn multiple_primary_keys_are_rejected() {
        let mut store = CatalogStore::new();
        let err = build(
            &mut store,
            "CREATE TABLE t (a INT8 PRIMARY KEY, b INT8, PRIMARY KEY (b))",
        )
        .unwrap_err();
        assert!(matches!(err, SqlError::InvalidSchemaDefinition(_)));
    }

    #[test]
    fn explicitly_null_primary_key_column_fails() {
        let mut store = CatalogStore::new();
        let err = build(&mut store, "CREATE TABLE t (a INT8 NULL, PRIMARY KEY (a))").unwrap_err();
        assert!(matches!(err, SqlError::InvalidSchemaDefinition(_)));
    }

    #[test]
    fn unique_column_becomes_a_unique_index() {
        let mut store = CatalogStore::new();
        let built = build(
            &mut store,
            "CREATE TABLE users (id INT8 PRIMARY KEY, email STRING UNIQUE)",
        )
        .unwrap();
        let tbl = built.desc;

        assert_eq!(tbl.indexes.len(), 1);
        let idx = &tbl.indexes[0];
        assert!(idx.unique);
        assert_eq!(idx.column_names, vec!["email".to_string()]);
        // Secondary indexes carry the primary key for row addressing.
        assert_eq!(idx.extra_column_ids, tbl.primary_index.column_ids);
    }

    #[test]
    fn checks_get_names_ids_and_dequalified_exprs() {
        let mut store = CatalogStore::new();
        let built = build(
            &mut store,
            "CREATE TABLE t (a INT8 PRIMARY KEY, b INT8, CHECK (t.b > 0), \
             CONSTRAINT positive_a CHECK (a > 0))",
        )
        .unwrap();
        let tbl = built.desc;

        assert_eq!(tbl.checks.len(), 2);
        assert_eq!(tbl.checks[0].name, "check_b");
        assert_eq!(tbl.checks[0].expr, "b > 0");
        assert_eq!(tbl.checks[0].validity, ConstraintValidity::Validated);
        assert_eq!(
            tbl.checks[0].column_ids,
            vec![tbl.column_by_name("b").unwrap().id]
        );
        assert_eq!(tbl.checks[1].name, "positive_a");
    }

    #[test]
    fn check_referencing_unknown_column_fails() {
        let mut store = CatalogStore::new();
        let err = build(
            &mut store,
            "CREATE TABLE t (a INT8 PRIMARY KEY, CHECK (missing > 0))",
        )
        .unwrap_err();
        assert!(matches!(err, SqlError::UndefinedColumn(_)));
    }

    #[test]
    fn default_with_nextval_records_sequence_dependency() {
        let mut store = CatalogStore::new();
        let seq_id = {
            let mut txn = store.begin();
            let id = txn.generate_unique_id();
            let mut seq =
                TableDescriptor::new(id, catalog::DEFAULT_DATABASE_ID, catalog::PUBLIC_SCHEMA_ID, "order_seq");
            seq.sequence_opts = Some(SequenceOpts {
                start: 1,
                increment: 1,
            });
            seq.allocate_ids().unwrap();
            txn.write_table(seq);
            txn.commit().unwrap();
            id
        };

        let built = build(
            &mut store,
            "CREATE TABLE orders (id INT8 PRIMARY KEY DEFAULT nextval('order_seq'))",
        )
        .unwrap();

        let col = built.desc.column_by_name("id").unwrap();
        assert_eq!(col.default_expr.as_deref(), Some("nextval('order_seq')"));
        assert_eq!(col.uses_sequence_ids, vec![seq_id]);
        let seq = built.affected.get(&seq_id).expect("sequence in affected set");
        assert_eq!(seq.depended_on_by, vec![DescId(50)]);
    }

    #[test]
    fn default_referencing_unknown_sequence_fails() {
        let mut store = CatalogStore::new();
        let err = build(
            &mut store,
            "CREATE TABLE t (id INT8 PRIMARY KEY DEFAULT nextval('no_such_seq'))",
        )
        .unwrap_err();
        assert!(matches!(err, SqlError::UndefinedTable(_)));
    }

    #[test]
    fn computed_columns_cannot_chain() {
        let mut store = CatalogStore::new();
        let err = build(
            &mut store,
            "CREATE TABLE t (a INT8 PRIMARY KEY, \
             b INT8 GENERATED ALWAYS AS (a + 1) STORED, \
             c INT8 GENERATED ALWAYS AS (b + 1) STORED)",
        )
        .unwrap_err();
        assert!(matches!(err, SqlError::InvalidTableDefinition(_)));
    }

    #[test]
    fn storage_parameters_accept_postgres_heap_tuning() {
        let mut store = CatalogStore::new();
        let build_with_params = |store: &mut CatalogStore, params: Vec<(String, String)>| {
            let stmt = CreateTable {
                name: TableName::new("t"),
                defs: vec![TableDef::Column(ColumnDef::new("a", SqlType::Int8))],
                storage_params: params,
                ..CreateTable::default()
            };
            let txn = store.begin();
            new_table_desc(
                &txn,
                &SessionContext::default(),
                &RefusePartitioning,
                &stmt,
                DescId(50),
                catalog::PUBLIC_SCHEMA_ID,
            )
        };

        // fillfactor has no meaning here but is accepted for compatibility.
        build_with_params(&mut store, vec![("fillfactor".into(), "70".into())]).unwrap();

        let err = build_with_params(&mut store, vec![("toast_tuple_target".into(), "128".into())])
            .unwrap_err();
        assert!(matches!(err, SqlError::FeatureNotSupported(_)));
    }

    #[test]
    fn partitioning_is_refused_without_the_capability() {
        let mut store = CatalogStore::new();
        let stmt = CreateTable {
            name: TableName::new("t"),
            defs: vec![TableDef::Column(
                ColumnDef::new("region", SqlType::String).primary_key(),
            )],
            partition_by: Some(parser::PartitionBy {
                columns: vec!["region".into()],
                partitions: Vec::new(),
            }),
            ..CreateTable::default()
        };
        let txn = store.begin();
        let err = new_table_desc(
            &txn,
            &SessionContext::default(),
            &RefusePartitioning,
            &stmt,
            DescId(50),
            catalog::PUBLIC_SCHEMA_ID,
        )
        .unwrap_err();
        assert!(matches!(err, SqlError::FeatureNotSupported(_)));
    }

    #[test]
    fn locality_requires_a_multi_region_database() {
        let mut store = CatalogStore::new();
        let stmt = CreateTable {
            name: TableName::new("t"),
            defs: vec![TableDef::Column(
                ColumnDef::new("a", SqlType::Int8).primary_key(),
            )],
            locality: Some(Locality::Global),
            ..CreateTable::default()
        };
        let txn = store.begin();
        let err = new_table_desc(
            &txn,
            &SessionContext::default(),
            &RefusePartitioning,
            &stmt,
            DescId(50),
            catalog::PUBLIC_SCHEMA_ID,
        )
        .unwrap_err();
        assert!(matches!(err, SqlError::InvalidTableDefinition(_)));
    }

    #[test]
    fn locality_region_must_exist_in_the_database() {
        let mut store = CatalogStore::new();
        {
            let db = store
                .database_mut(catalog::DEFAULT_DATABASE_ID)
                .unwrap();
            db.regions = vec!["us-east1".into()];
            db.primary_region = Some("us-east1".into());
        }
        let stmt = CreateTable {
            name: TableName::new("t"),
            defs: vec![TableDef::Column(
                ColumnDef::new("a", SqlType::Int8).primary_key(),
            )],
            locality: Some(Locality::RegionalByTable {
                region: Some("eu-west1".into()),
            }),
            ..CreateTable::default()
        };
        let txn = store.begin();
        let err = new_table_desc(
            &txn,
            &SessionContext::default(),
            &RefusePartitioning,
            &stmt,
            DescId(50),
            catalog::PUBLIC_SCHEMA_ID,
        )
        .unwrap_err();
        assert!(matches!(err, SqlError::InvalidTableDefinition(_)));

        let stmt = CreateTable {
            locality: Some(Locality::RegionalByTable {
                region: Some("us-east1".into()),
            }),
            ..stmt
        };
        let txn = store.begin();
        let built = new_table_desc(
            &txn,
            &SessionContext::default(),
            &RefusePartitioning,
            &stmt,
            DescId(50),
            catalog::PUBLIC_SCHEMA_ID,
        )
        .unwrap();
        assert_eq!(
            built.desc.locality,
            Some(catalog::LocalityConfig::RegionalByTable {
                region: Some("us-east1".into())
            })
        );
    }

    #[test]
    fn like_expands_columns_defaults_and_indexes() {
        let mut store = CatalogStore::new();
        let source = {
            let built = build(
                &mut store,
                "CREATE TABLE src (id INT8 PRIMARY KEY, v STRING DEFAULT 'x', \
                 CHECK (id > 0))",
            )
            .unwrap();
            built.desc
        };
        {
            let mut txn = store.begin();
            txn.write_table(source);
            txn.commit().unwrap();
        }

        let txn = store.begin();
        let like = TableDef::Like(parser::LikeTableDef {
            name: TableName::new("src"),
            options: vec![parser::LikeTableOption {
                opt: parser::LikeOpt::All,
                excluded: false,
            }],
        });
        let defs =
            replace_like_table_defs(&txn, catalog::DEFAULT_DATABASE_ID, &[like]).unwrap();

        let columns: Vec<&ColumnDef> = defs
            .iter()
            .filter_map(|d| match d {
                TableDef::Column(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[1].default_expr, Some(Expr::string("x")));
        assert!(defs.iter().any(|d| matches!(d, TableDef::Check(_))));
        assert!(defs.iter().any(
            |d| matches!(d, TableDef::Unique(u) if u.primary_key && u.index.columns[0].column == "id")
        ));
    }

    #[test]
    fn ctas_takes_columns_from_the_source_schema() {
        let mut store = CatalogStore::new();
        let stmt = parse_create_table(
            "CREATE TABLE squares AS SELECT n, n_squared FROM numbers",
        )
        .unwrap();
        let schema = vec![
            ("n".to_string(), SqlType::Int8),
            ("n_squared".to_string(), SqlType::Int8),
        ];
        let txn = store.begin();
        let built = new_table_desc_if_as(
            &txn,
            &SessionContext::default(),
            &RefusePartitioning,
            &stmt,
            DescId(50),
            catalog::PUBLIC_SCHEMA_ID,
            &schema,
        )
        .unwrap();
        let tbl = built.desc;

        assert_eq!(tbl.columns.len(), 3); // n, n_squared, rowid
        assert_eq!(
            tbl.create_query.as_deref(),
            Some("SELECT n, n_squared FROM numbers")
        );
        assert_eq!(tbl.primary_index.column_names, vec!["rowid".to_string()]);
    }

    #[test]
    fn ctas_primary_key_must_name_source_columns() {
        let mut store = CatalogStore::new();
        let mut stmt =
            parse_create_table("CREATE TABLE squares AS SELECT n FROM numbers").unwrap();
        stmt.defs = vec![TableDef::Unique(UniqueConstraintDef {
            index: IndexDef::on(vec![IndexElem::asc("missing")]),
            primary_key: true,
            without_index: false,
        })];
        let schema = vec![("n".to_string(), SqlType::Int8)];
        let txn = store.begin();
        let err = new_table_desc_if_as(
            &txn,
            &SessionContext::default(),
            &RefusePartitioning,
            &stmt,
            DescId(50),
            catalog::PUBLIC_SCHEMA_ID,
            &schema,
        )
        .unwrap_err();
        assert!(matches!(err, SqlError::UndefinedColumn(col) if col == "missing"));
    }
}
