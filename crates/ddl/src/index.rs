use catalog::{
    GeoConfig, IndexDescriptor, IndexType, ShardDescriptor, TableDescriptor,
    generate_unique_constraint_name,
};
use common::{Direction, Row, SessionData, SqlError, SqlResult};
use expr::{EvalContext, dequalify_column_refs};
use parser::{CheckConstraintDef, IndexDef, ShardedDef};
use types::TypeFamily;

use crate::column::{make_shard_check_constraint, make_shard_column_desc};

/// Build a secondary index descriptor from its definition. Sharding is
/// applied separately since it mutates the owning table.
pub fn build_index(
    def: &IndexDef,
    tbl: &TableDescriptor,
    session: &SessionData,
) -> SqlResult<IndexDescriptor> {
    if def.columns.is_empty() {
        return Err(SqlError::InvalidSchemaDefinition(
            "index must contain at least one column".into(),
        ));
    }
    if def.interleave.is_some() {
        return Err(SqlError::FeatureNotSupported(
            "interleaved secondary indexes cannot be created via CREATE TABLE".into(),
        ));
    }

    let column_names: Vec<String> = def.columns.iter().map(|e| e.column.clone()).collect();
    for name in &column_names {
        tbl.column_by_name(name)?;
    }

    let name = match &def.name {
        Some(name) => name.clone(),
        None => {
            let base = format!("{}_{}_idx", tbl.name, column_names.join("_"));
            generate_unique_constraint_name(&base, |n| tbl.find_index_by_name(n).is_some())
        }
    };

    let mut idx = IndexDescriptor::new(name);
    idx.directions = def.columns.iter().map(|e| e.direction).collect();
    idx.column_names = column_names;
    idx.store_column_names = def.storing.clone();

    if def.inverted {
        if def.columns.len() > 1 && !session.enable_multi_column_inverted_indexes {
            return Err(SqlError::FeatureNotSupported(
                "inverted indexes on multiple columns are disabled; enable them with \
                 SET enable_multi_column_inverted_indexes = true"
                    .into(),
            ));
        }
        idx.index_type = IndexType::Inverted;
        // The geo configuration derives from the inverted column's type.
        let inverted_name = idx.column_names.last().cloned().unwrap_or_default();
        let inverted_col = tbl.column_by_name(&inverted_name)?;
        idx.geo_config = match inverted_col.ty.family() {
            TypeFamily::Geometry => Some(GeoConfig::Geometry {
                srid: inverted_col.ty.geo_srid_or_zero(),
            }),
            TypeFamily::Geography => Some(GeoConfig::Geography),
            _ => None,
        };
    }

    if let Some(predicate) = &def.predicate {
        let column_names: Vec<String> = tbl.columns.iter().map(|c| c.name.clone()).collect();
        let dequalified = dequalify_column_refs(predicate, &tbl.name, &column_names)?;
        idx.predicate = Some(dequalified.to_string());
    }

    Ok(idx)
}

/// Evaluate and bounds-check a `BUCKET_COUNT` expression.
pub fn eval_shard_buckets(sharded: &ShardedDef) -> SqlResult<u32> {
    let eval = EvalContext::new(&[]);
    let value = eval.eval(&sharded.shard_buckets, &Row::new(Vec::new()))?;
    let buckets = value.as_int().ok_or_else(|| {
        SqlError::InvalidSchemaDefinition("BUCKET_COUNT must be an integer".into())
    })?;
    if buckets < 2 {
        return Err(SqlError::InvalidSchemaDefinition(
            "BUCKET_COUNT must be greater than 1".into(),
        ));
    }
    u32::try_from(buckets).map_err(|_| {
        SqlError::InvalidSchemaDefinition("BUCKET_COUNT is out of range".into())
    })
}

/// Turn an index into a hash-sharded index: synthesize the hidden shard
/// column on the table, prepend it to the index key, and queue the hidden
/// bucket-range check. The shard column is shared when several indexes
/// shard over the same columns and bucket count.
pub fn apply_index_sharding(
    tbl: &mut TableDescriptor,
    idx: &mut IndexDescriptor,
    sharded: &ShardedDef,
    session: &SessionData,
    pending_checks: &mut Vec<CheckConstraintDef>,
) -> SqlResult<()> {
    if !session.hash_sharded_indexes_enabled {
        return Err(SqlError::FeatureNotSupported(
            "hash sharded indexes require the experimental_enable_hash_sharded_indexes \
             session variable"
                .into(),
        ));
    }
    if idx.is_interleaved() {
        return Err(SqlError::InvalidSchemaDefinition(
            "interleaved indexes cannot also be hash sharded".into(),
        ));
    }
    if idx.partitioning.is_some() {
        return Err(SqlError::InvalidSchemaDefinition(
            "sharded indexes don't support partitioning".into(),
        ));
    }

    let buckets = eval_shard_buckets(sharded)?;
    let key_columns = idx.column_names.clone();
    let shard_col = make_shard_column_desc(&key_columns, buckets);

    match tbl.find_column_by_name(&shard_col.name) {
        None => {
            let check = make_shard_check_constraint(&shard_col, buckets);
            if !pending_checks.iter().any(|c| c.name == check.name) {
                pending_checks.push(check);
            }
            tbl.columns.push(shard_col.clone());
        }
        Some(existing) if existing.compute_expr == shard_col.compute_expr => {
            // Another index already shards over the same key; share it.
        }
        Some(_) => {
            return Err(SqlError::DuplicateObject(format!(
                "column \"{}\" conflicts with the shard column of a hash-sharded index",
                shard_col.name
            )));
        }
    }

    idx.sharded = Some(ShardDescriptor {
        name: shard_col.name.clone(),
        shard_buckets: buckets,
        column_names: key_columns,
    });
    idx.column_names.insert(0, shard_col.name);
    idx.directions.insert(0, Direction::Asc);
    Ok(())
}
