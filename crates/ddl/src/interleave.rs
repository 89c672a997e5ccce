use catalog::{
    InterleaveAncestor, InterleaveRef, SchemaResolver, TableDescriptor, TableState, Transaction,
};
use common::{DescId, SqlError, SqlResult};
use parser::InterleaveDef;

/// Record the parent/child interleave relationship on the child's primary
/// index. The child is parked in Add state; the parent's back-reference and
/// the flip to Public happen in [`finalize_interleave`] once the child
/// descriptor has an id the parent can point at.
pub fn add_interleave(
    resolver: &dyn SchemaResolver,
    database_id: DescId,
    tbl: &mut TableDescriptor,
    def: &InterleaveDef,
) -> SqlResult<()> {
    if tbl.primary_index.is_sharded() {
        return Err(SqlError::InvalidSchemaDefinition(
            "interleaved indexes cannot also be hash sharded".into(),
        ));
    }

    let parent_id = resolver
        .resolve_table_id(database_id, &def.parent)?
        .ok_or_else(|| SqlError::UndefinedTable(def.parent.to_string()))?;
    let parent = resolver.table(parent_id)?;
    let parent_pk = &parent.primary_index;

    if def.fields.len() != parent_pk.column_names.len() {
        return Err(SqlError::InvalidSchemaDefinition(format!(
            "declared interleaved columns ({}) must match the parent's primary index ({})",
            def.fields.join(", "),
            parent_pk.column_names.join(", ")
        )));
    }
    if tbl.primary_index.column_names.len() < def.fields.len() {
        return Err(SqlError::InvalidSchemaDefinition(format!(
            "declared interleaved columns ({}) must be a prefix of the primary key columns \
             being interleaved ({})",
            def.fields.join(", "),
            tbl.primary_index.column_names.join(", ")
        )));
    }
    for (i, field) in def.fields.iter().enumerate() {
        let child_name = &tbl.primary_index.column_names[i];
        if field != child_name {
            return Err(SqlError::InvalidSchemaDefinition(format!(
                "declared interleaved columns ({}) must be a prefix of the primary key columns \
                 being interleaved ({})",
                def.fields.join(", "),
                tbl.primary_index.column_names.join(", ")
            )));
        }
        let child_col = tbl.column_by_name(child_name)?;
        let parent_col = parent.column_by_name(&parent_pk.column_names[i])?;
        if !child_col.ty.identical(&parent_col.ty) {
            return Err(SqlError::InvalidSchemaDefinition(format!(
                "type of column \"{child_name}\" ({}) does not match type of parent column \
                 \"{}\" ({})",
                child_col.ty, parent_col.name, parent_col.ty
            )));
        }
        if tbl.primary_index.directions[i] != parent_pk.directions[i] {
            return Err(SqlError::InvalidSchemaDefinition(format!(
                "declared interleaved column \"{child_name}\" must have the same sort direction \
                 as the parent column \"{}\"",
                parent_col.name
            )));
        }
    }

    // The new ancestry is the parent's own chain plus the parent itself.
    // Each entry shares only the key columns not already covered higher up.
    let ancestor_prefix: u32 = parent_pk.interleave.iter().map(|a| a.shared_prefix_len).sum();
    let mut ancestors = parent_pk.interleave.clone();
    ancestors.push(InterleaveAncestor {
        table_id: parent.id,
        index_id: parent_pk.id,
        shared_prefix_len: parent_pk.column_names.len() as u32 - ancestor_prefix,
    });
    tbl.primary_index.interleave = ancestors;
    tbl.state = TableState::Add;
    Ok(())
}

/// Write the parent-side back-reference for an interleaved child and, when
/// `publish` is set, flip the child out of Add state. The parent write
/// always happens, the child write only on a state change.
pub fn finalize_interleave(
    txn: &mut Transaction<'_>,
    child_id: DescId,
    publish: bool,
) -> SqlResult<()> {
    let mut child = txn.get_table(child_id)?;
    let Some(ancestor) = child.primary_index.last_ancestor().cloned() else {
        return Ok(());
    };

    let mut parent = txn.get_table(ancestor.table_id)?;
    let backref = InterleaveRef {
        table_id: child_id,
        index_id: child.primary_index.id,
    };
    if parent.primary_index.id == ancestor.index_id {
        parent.primary_index.interleaved_by.push(backref);
    } else {
        let idx = parent
            .indexes
            .iter_mut()
            .find(|idx| idx.id == ancestor.index_id)
            .ok_or_else(|| {
                SqlError::AssertionFailed(format!(
                    "interleave ancestor index {} not found on parent table",
                    ancestor.index_id
                ))
            })?;
        idx.interleaved_by.push(backref);
    }
    txn.write_table(parent);

    if publish && child.state == TableState::Add {
        child.state = TableState::Public;
        txn.write_table(child);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::{CatalogStore, ColumnDescriptor};
    use common::{Direction, TableName};
    use types::SqlType;

    struct StaticResolver {
        tables: Vec<TableDescriptor>,
    }

    impl SchemaResolver for StaticResolver {
        fn resolve_table_id(
            &self,
            _database_id: DescId,
            name: &TableName,
        ) -> SqlResult<Option<DescId>> {
            Ok(self
                .tables
                .iter()
                .find(|t| t.name == name.table)
                .map(|t| t.id))
        }

        fn table(&self, id: DescId) -> SqlResult<TableDescriptor> {
            self.tables
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or_else(|| SqlError::AssertionFailed(format!("no table with id {}", id.0)))
        }
    }

    fn table(id: u64, name: &str, cols: &[(&str, SqlType)], pk: &[&str]) -> TableDescriptor {
        let mut tbl = TableDescriptor::new(DescId(id), DescId(1), DescId(2), name);
        for (col_name, ty) in cols {
            let mut col = ColumnDescriptor::new(*col_name, ty.clone());
            col.nullable = false;
            tbl.columns.push(col);
        }
        tbl.primary_index.column_names = pk.iter().map(|c| c.to_string()).collect();
        tbl.primary_index.directions = vec![Direction::Asc; pk.len()];
        tbl.allocate_ids().unwrap();
        tbl
    }

    fn interleave_def(parent: &str, fields: &[&str]) -> InterleaveDef {
        InterleaveDef {
            parent: TableName::new(parent),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn child_records_ancestor_and_enters_add_state() {
        let parent = table(10, "customers", &[("cid", SqlType::Int8)], &["cid"]);
        let resolver = StaticResolver {
            tables: vec![parent],
        };
        let mut child = table(
            11,
            "orders",
            &[("cid", SqlType::Int8), ("oid", SqlType::Int8)],
            &["cid", "oid"],
        );

        add_interleave(&resolver, DescId(1), &mut child, &interleave_def("customers", &["cid"]))
            .unwrap();

        assert_eq!(child.state, TableState::Add);
        assert_eq!(
            child.primary_index.interleave,
            vec![InterleaveAncestor {
                table_id: DescId(10),
                index_id: 1,
                shared_prefix_len: 1,
            }]
        );
    }

    #[test]
    fn grandchild_inherits_the_full_ancestor_chain() {
        let parent = table(10, "customers", &[("cid", SqlType::Int8)], &["cid"]);
        let mut middle = table(
            11,
            "orders",
            &[("cid", SqlType::Int8), ("oid", SqlType::Int8)],
            &["cid", "oid"],
        );
        let resolver = StaticResolver {
            tables: vec![parent],
        };
        add_interleave(&resolver, DescId(1), &mut middle, &interleave_def("customers", &["cid"]))
            .unwrap();

        let resolver = StaticResolver {
            tables: vec![resolver.tables.into_iter().next().unwrap(), middle],
        };
        let mut leaf = table(
            12,
            "items",
            &[
                ("cid", SqlType::Int8),
                ("oid", SqlType::Int8),
                ("iid", SqlType::Int8),
            ],
            &["cid", "oid", "iid"],
        );
        add_interleave(
            &resolver,
            DescId(1),
            &mut leaf,
            &interleave_def("orders", &["cid", "oid"]),
        )
        .unwrap();

        let chain = &leaf.primary_index.interleave;
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].table_id, DescId(10));
        assert_eq!(chain[0].shared_prefix_len, 1);
        assert_eq!(chain[1].table_id, DescId(11));
        // orders has a 2-column key but shares 1 with customers already.
        assert_eq!(chain[1].shared_prefix_len, 1);
    }

    #[test]
    fn field_count_must_match_parent_primary_key() {
        let parent = table(
            10,
            "customers",
            &[("cid", SqlType::Int8), ("region", SqlType::String)],
            &["cid", "region"],
        );
        let resolver = StaticResolver {
            tables: vec![parent],
        };
        let mut child = table(
            11,
            "orders",
            &[("cid", SqlType::Int8), ("oid", SqlType::Int8)],
            &["cid", "oid"],
        );
        let err =
            add_interleave(&resolver, DescId(1), &mut child, &interleave_def("customers", &["cid"]))
                .unwrap_err();
        assert!(matches!(err, SqlError::InvalidSchemaDefinition(_)));
    }

    #[test]
    fn fields_must_prefix_child_primary_key_by_name() {
        let parent = table(10, "customers", &[("cid", SqlType::Int8)], &["cid"]);
        let resolver = StaticResolver {
            tables: vec![parent],
        };
        let mut child = table(
            11,
            "orders",
            &[("oid", SqlType::Int8), ("cid", SqlType::Int8)],
            &["oid", "cid"],
        );
        let err =
            add_interleave(&resolver, DescId(1), &mut child, &interleave_def("customers", &["cid"]))
                .unwrap_err();
        assert!(matches!(err, SqlError::InvalidSchemaDefinition(_)));
    }

    #[test]
    fn column_types_must_be_identical_not_merely_equivalent() {
        let parent = table(10, "customers", &[("cid", SqlType::Int8)], &["cid"]);
        let resolver = StaticResolver {
            tables: vec![parent],
        };
        // INT4 is equivalent to INT8 for FK purposes but not identical.
        let mut child = table(
            11,
            "orders",
            &[("cid", SqlType::Int4), ("oid", SqlType::Int8)],
            &["cid", "oid"],
        );
        let err =
            add_interleave(&resolver, DescId(1), &mut child, &interleave_def("customers", &["cid"]))
                .unwrap_err();
        assert!(matches!(err, SqlError::InvalidSchemaDefinition(_)));
    }

    #[test]
    fn sharded_primary_keys_cannot_be_interleaved() {
        let parent = table(10, "customers", &[("cid", SqlType::Int8)], &["cid"]);
        let resolver = StaticResolver {
            tables: vec![parent],
        };
        let mut child = table(
            11,
            "orders",
            &[("cid", SqlType::Int8), ("oid", SqlType::Int8)],
            &["cid", "oid"],
        );
        child.primary_index.sharded = Some(catalog::ShardDescriptor {
            name: "cid_shard_4".into(),
            shard_buckets: 4,
            column_names: vec!["cid".into()],
        });
        let err =
            add_interleave(&resolver, DescId(1), &mut child, &interleave_def("customers", &["cid"]))
                .unwrap_err();
        assert!(matches!(err, SqlError::InvalidSchemaDefinition(_)));
    }

    #[test]
    fn finalize_writes_backref_then_publishes() {
        let mut store = CatalogStore::new();
        let parent = table(10, "customers", &[("cid", SqlType::Int8)], &["cid"]);
        let mut child = table(
            11,
            "orders",
            &[("cid", SqlType::Int8), ("oid", SqlType::Int8)],
            &["cid", "oid"],
        );
        let resolver = StaticResolver {
            tables: vec![parent.clone()],
        };
        add_interleave(&resolver, DescId(1), &mut child, &interleave_def("customers", &["cid"]))
            .unwrap();

        let mut txn = store.begin();
        txn.write_table(parent);
        txn.write_table(child);
        finalize_interleave(&mut txn, DescId(11), true).unwrap();

        let parent = txn.get_table(DescId(10)).unwrap();
        assert_eq!(
            parent.primary_index.interleaved_by,
            vec![InterleaveRef {
                table_id: DescId(11),
                index_id: 1,
            }]
        );
        let child = txn.get_table(DescId(11)).unwrap();
        assert_eq!(child.state, TableState::Public);
        txn.commit().unwrap();
        assert!(store.table_by_id(DescId(11)).unwrap().state == TableState::Public);
    }

    #[test]
    fn finalize_without_publish_leaves_child_in_add_state() {
        let mut store = CatalogStore::new();
        let parent = table(10, "customers", &[("cid", SqlType::Int8)], &["cid"]);
        let mut child = table(
            11,
            "orders",
            &[("cid", SqlType::Int8), ("oid", SqlType::Int8)],
            &["cid", "oid"],
        );
        let resolver = StaticResolver {
            tables: vec![parent.clone()],
        };
        add_interleave(&resolver, DescId(1), &mut child, &interleave_def("customers", &["cid"]))
            .unwrap();

        let mut txn = store.begin();
        txn.write_table(parent);
        txn.write_table(child);
        finalize_interleave(&mut txn, DescId(11), false).unwrap();

        assert_eq!(txn.get_table(DescId(11)).unwrap().state, TableState::Add);
        assert_eq!(
            txn.get_table(DescId(10))
                .unwrap()
                .primary_index
                .interleaved_by
                .len(),
            1
        );
    }
}
