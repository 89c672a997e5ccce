use catalog::Transaction;
use common::{DescId, ObjectKind, SqlError, SqlResult, TableName};
use parser::Persistence;

use crate::SessionContext;

/// Built-in type aliases reserved in the public schema. A table may not
/// shadow one of these names.
const TYPE_ALIAS_NAMES: &[&str] = &[
    "bool", "bytes", "date", "decimal", "float4", "float8", "int2", "int4", "int8",
    "int2vector", "oidvector", "string", "timestamp", "timestamptz", "geometry",
    "geography", "box2d",
];

/// Name of the session's lazily-created temporary schema.
const TEMP_SCHEMA_NAME: &str = "pg_temp";

/// Resolve the target schema for a CREATE TABLE, enforcing privilege,
/// temp-table gating, and name-collision rules. Returns the schema id the
/// new descriptor will live under.
pub fn resolve_create_target(
    txn: &mut Transaction,
    ctx: &SessionContext,
    name: &TableName,
    persistence: Persistence,
) -> SqlResult<DescId> {
    let schema = if persistence.is_temporary() {
        if !ctx.session.temp_tables_enabled {
            return Err(SqlError::FeatureNotSupported(
                "temporary tables are disabled; enable them with \
                 SET experimental_enable_temp_tables = true"
                    .into(),
            ));
        }
        match txn.schema_by_name(ctx.database_id, TEMP_SCHEMA_NAME) {
            Some(schema) => schema,
            None => {
                let id = txn.create_schema(ctx.database_id, TEMP_SCHEMA_NAME, true)?;
                txn.schema(id)?
            }
        }
    } else {
        let schema_name = name.schema_or_default();
        txn.schema_by_name(ctx.database_id, schema_name)
            .ok_or_else(|| {
                SqlError::InvalidSchemaDefinition(format!(
                    "cannot create \"{}\": unknown schema \"{schema_name}\"",
                    name.table
                ))
            })?
    };

    if !schema.can_create(&ctx.session.user) {
        return Err(SqlError::InsufficientPrivilege(format!(
            "user {} does not have CREATE privilege on schema {}",
            ctx.session.user, schema.name
        )));
    }

    if schema.name == "public" && TYPE_ALIAS_NAMES.contains(&name.table.as_str()) {
        return Err(SqlError::AlreadyExists {
            kind: ObjectKind::TypeAlias,
            name: name.table.clone(),
        });
    }

    if let Some(existing) = txn.lookup_table(ctx.database_id, schema.id, &name.table) {
        let kind = if txn.get_table(existing)?.is_sequence() {
            ObjectKind::Sequence
        } else {
            ObjectKind::Table
        };
        return Err(SqlError::AlreadyExists {
            kind,
            name: name.table.clone(),
        });
    }

    Ok(schema.id)
}
