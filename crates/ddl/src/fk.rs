use catalog::{
    ForeignKeyConstraint, IndexDescriptor, Map, Mutation, SchemaResolver, TableDescriptor,
    TableState, generate_unique_constraint_name,
};
use common::{
    ClusterSettings, ColumnId, ConstraintValidity, DescId, Direction, ForeignKeyAction, SqlError,
    SqlResult, TableName, VersionGate,
};
use parser::ForeignKeyDef;

/// How the table owning the new constraint relates to existing data.
/// Governs whether a missing origin index may be auto-created and what
/// validity the constraint starts with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FkTableState {
    NewTable,
    EmptyTable,
    NonEmptyTable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationBehavior {
    Default,
    SkipValidation,
}

/// Resolver decorator that resolves the in-progress table's own declared
/// name to its id. For the duration of one build, the new table shadows any
/// committed object with the same name.
pub struct FkSelfResolver<'a> {
    inner: &'a dyn SchemaResolver,
    new_table_id: DescId,
    new_table_name: TableName,
}

impl<'a> FkSelfResolver<'a> {
    pub fn new(
        inner: &'a dyn SchemaResolver,
        new_table_id: DescId,
        new_table_name: TableName,
    ) -> Self {
        Self {
            inner,
            new_table_id,
            new_table_name,
        }
    }
}

impl SchemaResolver for FkSelfResolver<'_> {
    fn resolve_table_id(&self, database_id: DescId, name: &TableName) -> SqlResult<Option<DescId>> {
        if name.table == self.new_table_name.table
            && name.schema_or_default() == self.new_table_name.schema_or_default()
        {
            return Ok(Some(self.new_table_id));
        }
        self.inner.resolve_table_id(database_id, name)
    }

    fn table(&self, id: DescId) -> SqlResult<TableDescriptor> {
        if id == self.new_table_id {
            // Callers handle the in-progress table directly; reaching here
            // means a copy would have diverged from the build.
            return Err(SqlError::AssertionFailed(
                "in-progress table must not be fetched through the resolver".into(),
            ));
        }
        self.inner.table(id)
    }
}

/// Resolve one foreign-key definition against the table being built (or
/// altered) and the referenced table, recording the constraint on both
/// sides. Referenced tables other than the origin itself are deduped into
/// `affected`, so repeated references share a single mutable copy that the
/// executor persists once.
#[allow(clippy::too_many_arguments)]
pub fn resolve_fk(
    resolver: &dyn SchemaResolver,
    settings: &ClusterSettings,
    database_id: DescId,
    tbl: &mut TableDescriptor,
    def: &ForeignKeyDef,
    affected: &mut Map<DescId, TableDescriptor>,
    table_state: FkTableState,
    behavior: ValidationBehavior,
) -> SqlResult<()> {
    // Step 1: resolve origin columns, rejecting duplicates.
    let mut origin_ids: Vec<ColumnId> = Vec::with_capacity(def.from_cols.len());
    let mut origin_cols = Vec::with_capacity(def.from_cols.len());
    for name in &def.from_cols {
        let col = tbl.column_by_name(name)?;
        if origin_ids.contains(&col.id) {
            return Err(SqlError::InvalidForeignKey(format!(
                "foreign key contains duplicate column \"{name}\""
            )));
        }
        origin_ids.push(col.id);
        origin_cols.push((
            col.name.clone(),
            col.nullable,
            col.default_expr.is_some(),
            col.ty.clone(),
        ));
    }

    // Step 2: resolve the target through a resolver that sees uncommitted
    // descriptors, so self- and forward references find the right object.
    let target_id = resolver
        .resolve_table_id(database_id, &def.table)?
        .ok_or_else(|| SqlError::UndefinedTable(def.table.to_string()))?;
    let is_self = target_id == tbl.id;

    // Step 4 (dedupe): reuse the copy already in `affected` if present.
    if !is_self && !affected.contains_key(&target_id) {
        let target = resolver.table(target_id)?;
        affected.insert(target_id, target);
    }

    // Steps 3 and 5: checks that read the target. For self-references the
    // target aliases the in-progress table itself.
    let (referenced_ids, target_name) = {
        let target: &TableDescriptor = if is_self {
            &*tbl
        } else {
            affected.get(&target_id).ok_or_else(|| {
                SqlError::AssertionFailed("referenced table missing from backref map".into())
            })?
        };

        if target.parent_id != tbl.parent_id && !settings.allow_cross_database_fks {
            return Err(SqlError::InvalidForeignKey(format!(
                "foreign key references to a table in a different database are not allowed \
                 (referenced table \"{}\")",
                target.name
            )));
        }
        if target.temporary != tbl.temporary {
            return Err(SqlError::InvalidForeignKey(
                "constraints on temporary tables may reference only temporary tables".into(),
            ));
        }

        // Unspecified referenced columns default to the target's primary key.
        let referenced_names: Vec<String> = if def.to_cols.is_empty() {
            target.primary_index.column_names.clone()
        } else {
            def.to_cols.clone()
        };
        if referenced_names.len() != def.from_cols.len() {
            return Err(SqlError::Syntax(format!(
                "{} columns must reference exactly {} columns in referenced table \"{}\"",
                def.from_cols.len(),
                referenced_names.len(),
                target.name
            )));
        }

        let mut referenced_ids = Vec::with_capacity(referenced_names.len());
        for (name, (origin_name, _, _, origin_ty)) in referenced_names.iter().zip(&origin_cols) {
            let col = target.column_by_name(name)?;
            if !origin_ty.equivalent(&col.ty) {
                return Err(SqlError::DatatypeMismatch(format!(
                    "type of \"{origin_name}\" ({origin_ty}) does not match foreign key \
                     \"{}\".\"{name}\" ({})",
                    target.name, col.ty
                )));
            }
            referenced_ids.push(col.id);
        }

        // The referenced side always needs a unique constraint over exactly
        // the referenced columns.
        if target.find_fk_referenced_index(&referenced_ids).is_none() {
            return Err(SqlError::ForeignKeyViolation(format!(
                "there is no unique constraint matching given keys for referenced table \
                 \"{}\"",
                target.name
            )));
        }
        (referenced_ids, target.name.clone())
    };

    // A brand-new table with an external forward reference cannot go public
    // until the reference is resolvable outside this transaction.
    if !is_self && table_state == FkTableState::NewTable {
        tbl.state = TableState::Add;
    }

    // Step 6: unique constraint name.
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
            let base = format!("fk_{}_ref_{}", def.from_cols[0], target_name);
            generate_unique_constraint_name(&base, |n| tbl.constraint_name_in_use(n))
        }
    };

    // Step 7: cascading actions must be satisfiable.
    let set_null = def.on_delete == ForeignKeyAction::SetNull
        || def.on_update == ForeignKeyAction::SetNull;
    let set_default = def.on_delete == ForeignKeyAction::SetDefault
        || def.on_update == ForeignKeyAction::SetDefault;
    for (origin_name, nullable, has_default, _) in &origin_cols {
        if set_null && !nullable {
            return Err(SqlError::InvalidForeignKey(format!(
                "cannot add a SET NULL cascading action on column \"{origin_name}\" which \
                 has a NOT NULL constraint"
            )));
        }
        if set_default && !nullable && !has_default {
            return Err(SqlError::InvalidForeignKey(format!(
                "cannot add a SET DEFAULT cascading action on column \"{origin_name}\" which \
                 has a NOT NULL constraint and no DEFAULT expression"
            )));
        }
    }

    // Step 8: below the gate, the origin side needs a supporting index too.
    if !settings.version.is_active(VersionGate::NoOriginFkIndexes)
        && tbl.find_fk_origin_index(&origin_ids).is_none()
    {
        match table_state {
            FkTableState::NewTable | FkTableState::EmptyTable => {
                add_index_for_fk(tbl, &def.from_cols, &name, table_state)?;
            }
            FkTableState::NonEmptyTable => {
                return Err(SqlError::ForeignKeyViolation(format!(
                    "foreign key requires an existing index on columns {}",
                    def.from_cols.join(", ")
                )));
            }
        }
    }

    // Step 9: validity tag.
    let validity = match table_state {
        FkTableState::NewTable => ConstraintValidity::Validated,
        _ => match behavior {
            ValidationBehavior::SkipValidation => ConstraintValidity::Unvalidated,
            ValidationBehavior::Default => ConstraintValidity::Validating,
        },
    };

    // Step 10: record the constraint on both sides.
    let fk = ForeignKeyConstraint {
        name,
        origin_table_id: tbl.id,
        origin_column_ids: origin_ids,
        referenced_table_id: target_id,
        referenced_column_ids: referenced_ids,
        validity,
        on_delete: def.on_delete,
        on_update: def.on_update,
        match_method: def.match_method,
    };
    match table_state {
        FkTableState::NewTable => tbl.outbound_fks.push(fk.clone()),
        _ => tbl.mutations.push(Mutation::AddForeignKey(fk.clone())),
    }
    if is_self {
        tbl.inbound_fks.push(fk);
    } else {
        affected
            .get_mut(&target_id)
            .ok_or_else(|| {
                SqlError::AssertionFailed("referenced table missing from backref map".into())
            })?
            .inbound_fks
            .push(fk);
    }
    Ok(())
}

/// Synthesize an ascending, non-unique index over the FK origin columns.
/// The only path where an index and its supporting constraint arrive in the
/// same operation.
fn add_index_for_fk(
    tbl: &mut TableDescriptor,
    cols: &[String],
    constraint_name: &str,
    table_state: FkTableState,
) -> SqlResult<()> {
    let base = format!("{}_auto_index_{constraint_name}", tbl.name);
    let name = generate_unique_constraint_name(&base, |n| tbl.find_index_by_name(n).is_some());
    let mut idx = IndexDescriptor::new(name);
    idx.column_names = cols.to_vec();
    idx.directions = vec![Direction::Asc; cols.len()];
    match table_state {
        FkTableState::NewTable => tbl.indexes.push(idx),
        _ => tbl.mutations.push(Mutation::AddIndex(idx)),
    }
    // Assign the new index its id so the caller's finders can see it.
    tbl.allocate_ids()
}
