use catalog::ColumnDescriptor;
use common::{ClusterSettings, SqlError, SqlResult, VersionGate};
use expr::Expr;
use parser::{CheckConstraintDef, ColumnDef, Nullability};
use types::{SqlType, TypeFamily};

/// Version gate a type family must clear before columns of that family can
/// be created, if any. Fixed at compile time.
fn minimum_type_usage_gate(family: TypeFamily) -> Option<VersionGate> {
    match family {
        TypeFamily::Geometry | TypeFamily::Geography => Some(VersionGate::GeospatialTypes),
        TypeFamily::Box2d => Some(VersionGate::Box2dType),
        _ => None,
    }
}

/// Check that a column type is usable: legacy vector types are rejected
/// outright, and gated families require the cluster version to be active.
/// Array types gate on their element family.
pub fn validate_column_type(ty: &SqlType, settings: &ClusterSettings) -> SqlResult<()> {
    if ty.is_vector() {
        return Err(SqlError::FeatureNotSupported(format!(
            "VECTOR column types are unsupported (column type {ty})"
        )));
    }
    if let Some(gate) = minimum_type_usage_gate(ty.gating_family()) {
        if !settings.version.is_active(gate) {
            return Err(SqlError::FeatureNotSupported(format!(
                "type {ty} is not supported until the cluster version upgrade is finalized"
            )));
        }
    }
    Ok(())
}

/// Build a column descriptor from its definition. Default and computed
/// expressions are handled by the assembler in later passes; this only
/// records shape and nullability.
pub fn build_column(def: &ColumnDef, settings: &ClusterSettings) -> SqlResult<ColumnDescriptor> {
    validate_column_type(&def.ty, settings)?;
    if let Some(computed) = &def.computed {
        if computed.virtual_ {
            return Err(SqlError::FeatureNotSupported(
                "virtual computed columns are unimplemented".into(),
            ));
        }
        if def.default_expr.is_some() {
            return Err(SqlError::InvalidTableDefinition(format!(
                "computed column \"{}\" cannot also have a DEFAULT expression",
                def.name
            )));
        }
    }
    let mut col = ColumnDescriptor::new(def.name.clone(), def.ty.clone());
    col.nullable = !matches!(def.nullability, Nullability::NotNull);
    col.hidden = def.hidden;
    Ok(col)
}

/// Deterministic name for a shard column over the given key columns.
pub fn shard_column_name(col_names: &[String], buckets: u32) -> String {
    format!("{}_shard_{buckets}", col_names.join("_"))
}

/// The shard bucket expression: `mod(fnv32(COALESCE(a::STRING, '')) + ..., buckets)`.
/// Same inputs always serialize to the byte-identical string; the expression
/// is persisted textually, so determinism matters.
pub fn make_hash_shard_compute_expr(col_names: &[String], buckets: u32) -> Expr {
    let mut terms = col_names.iter().map(|name| {
        Expr::func(
            "fnv32",
            vec![Expr::Coalesce(vec![
                Expr::Cast {
                    expr: Box::new(Expr::column(name.clone())),
                    ty: SqlType::String,
                },
                Expr::string(""),
            ])],
        )
    });
    // col_names is validated non-empty by the caller.
    let first = terms.next().unwrap_or_else(|| Expr::int(0));
    let sum = terms.fold(first, |acc, term| Expr::Binary {
        left: Box::new(acc),
        op: expr::BinaryOp::Plus,
        right: Box::new(term),
    });
    Expr::func("mod", vec![sum, Expr::int(i64::from(buckets))])
}

/// Synthesize the hidden computed INT4 column backing a hash-sharded index.
pub fn make_shard_column_desc(col_names: &[String], buckets: u32) -> ColumnDescriptor {
    let mut col = ColumnDescriptor::new(shard_column_name(col_names, buckets), SqlType::Int4);
    col.nullable = false;
    col.hidden = true;
    col.compute_expr = Some(make_hash_shard_compute_expr(col_names, buckets).to_string());
    col
}

/// The hidden check restricting a shard column to `[0, buckets)`, rendered
/// as `shard_col IN (0, 1, ..., buckets-1)`. Returned as a definition so it
/// resolves through the same pass as user-declared checks.
pub fn make_shard_check_constraint(
    shard_col: &ColumnDescriptor,
    buckets: u32,
) -> CheckConstraintDef {
    CheckConstraintDef {
        name: Some(format!("check_{}", shard_col.name)),
        expr: Expr::InTuple {
            expr: Box::new(Expr::column(shard_col.name.clone())),
            list: (0..buckets).map(|b| Expr::int(i64::from(b))).collect(),
        },
        hidden: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ClusterVersion;
    use pretty_assertions::assert_eq;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn shard_expression_is_deterministic() {
        let expr = make_hash_shard_compute_expr(&names(&["a", "b"]), 4);
        assert_eq!(
            expr.to_string(),
            "mod(fnv32(COALESCE(a::STRING, '')) + fnv32(COALESCE(b::STRING, '')), 4)"
        );
        // Byte-identical on repeated construction.
        assert_eq!(
            make_hash_shard_compute_expr(&names(&["a", "b"]), 4).to_string(),
            expr.to_string()
        );
    }

    #[test]
    fn shard_column_is_hidden_not_null_int4() {
        let col = make_shard_column_desc(&names(&["k"]), 8);
        assert_eq!(col.name, "k_shard_8");
        assert_eq!(col.ty, SqlType::Int4);
        assert!(col.hidden);
        assert!(!col.nullable);
        assert_eq!(
            col.compute_expr.as_deref(),
            Some("mod(fnv32(COALESCE(k::STRING, '')), 8)")
        );
    }

    #[test]
    fn shard_check_enumerates_buckets() {
        let col = make_shard_column_desc(&names(&["k"]), 4);
        let check = make_shard_check_constraint(&col, 4);
        assert!(check.hidden);
        assert_eq!(check.name.as_deref(), Some("check_k_shard_4"));
        assert_eq!(check.expr.to_string(), "k_shard_4 IN (0, 1, 2, 3)");
    }

    #[test]
    fn geo_types_are_version_gated() {
        let old = ClusterSettings::builder()
            .version(ClusterVersion(0))
            .build();
        let err = validate_column_type(&SqlType::Geometry { srid: 0 }, &old).unwrap_err();
        assert!(matches!(err, SqlError::FeatureNotSupported(_)));
        // Arrays gate on their element family.
        let err = validate_column_type(
            &SqlType::Array(Box::new(SqlType::Geography)),
            &old,
        )
        .unwrap_err();
        assert!(matches!(err, SqlError::FeatureNotSupported(_)));

        validate_column_type(&SqlType::Geometry { srid: 0 }, &ClusterSettings::default())
            .unwrap();
    }

    #[test]
    fn vector_types_are_rejected() {
        let err =
            validate_column_type(&SqlType::Int2Vector, &ClusterSettings::default()).unwrap_err();
        assert!(matches!(err, SqlError::FeatureNotSupported(_)));
    }

    #[test]
    fn not_null_columns_lose_nullability() {
        let def = ColumnDef::new("a", SqlType::Int4).not_null();
        let col = build_column(&def, &ClusterSettings::default()).unwrap();
        assert!(!col.nullable);
    }
}
