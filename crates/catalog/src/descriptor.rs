use common::{
    ColumnId, ConstraintValidity, DescId, Direction, FamilyId, ForeignKeyAction, IndexId,
    MatchMethod, SqlError, SqlResult,
};
use serde::{Deserialize, Serialize};
use types::SqlType;

/// Name given to the primary index and the default column family.
pub const PRIMARY_NAME: &str = "primary";

/// Lifecycle state of a table descriptor. Tables in `Add` are written but
/// not yet visible to other transactions; the schema-change machinery flips
/// them to `Public` once their forward references are resolvable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableState {
    Add,
    #[default]
    Public,
    Drop,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// 0 until `allocate_ids` assigns a permanent id.
    pub id: ColumnId,
    pub name: String,
    pub ty: SqlType,
    pub nullable: bool,
    /// Serialized default expression, re-bound lazily once column ids exist.
    pub default_expr: Option<String>,
    /// Serialized compute expression for computed and shard columns.
    pub compute_expr: Option<String>,
    pub hidden: bool,
    /// Sequences this column's default expression draws values from.
    pub uses_sequence_ids: Vec<DescId>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            id: 0,
            name: name.into(),
            ty,
            nullable: true,
            default_expr: None,
            compute_expr: None,
            hidden: false,
            uses_sequence_ids: Vec::new(),
        }
    }

    pub fn is_computed(&self) -> bool {
        self.compute_expr.is_some()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    #[default]
    Forward,
    Inverted,
}

/// Geo configuration for inverted indexes over spatial columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoConfig {
    /// Derived from the indexed geometry column's SRID.
    Geometry { srid: i32 },
    /// Geography columns always index under the default S2 covering.
    Geography,
}

/// Hash-sharding metadata attached to an index backed by a hidden computed
/// shard column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShardDescriptor {
    /// Name of the synthesized shard column.
    pub name: String,
    pub shard_buckets: u32,
    /// The user columns the shard value is computed over.
    pub column_names: Vec<String>,
}

/// One entry in an interleave ancestor chain. `shared_prefix_len` counts the
/// key columns this ancestor contributes beyond those contributed by its own
/// ancestors; summed along the chain it equals the parent's PK width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterleaveAncestor {
    pub table_id: DescId,
    pub index_id: IndexId,
    pub shared_prefix_len: u32,
}

/// List partitioning attached to an index, produced by the partitioning
/// capability. Values are stored as serialized expressions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartitioningDescriptor {
    /// Number of leading index columns the partitions range over.
    pub num_columns: u32,
    pub partitions: Vec<ListPartitionDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListPartitionDescriptor {
    pub name: String,
    pub values: Vec<String>,
}

/// Back-reference from an ancestor index to a child interleaved within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterleaveRef {
    pub table_id: DescId,
    pub index_id: IndexId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// 0 until `allocate_ids` assigns a permanent id.
    pub id: IndexId,
    pub name: String,
    pub unique: bool,
    pub column_names: Vec<String>,
    pub directions: Vec<Direction>,
    /// Filled from `column_names` during id allocation.
    pub column_ids: Vec<ColumnId>,
    /// Primary-key columns appended to secondary indexes for row addressing.
    pub extra_column_ids: Vec<ColumnId>,
    /// Covering (stored) columns.
    pub store_column_names: Vec<String>,
    pub index_type: IndexType,
    pub geo_config: Option<GeoConfig>,
    pub sharded: Option<ShardDescriptor>,
    pub partitioning: Option<PartitioningDescriptor>,
    /// Serialized partial-index predicate.
    pub predicate: Option<String>,
    /// Ancestor chain; non-empty means this index is interleaved.
    pub interleave: Vec<InterleaveAncestor>,
    /// Children physically nested within this index.
    pub interleaved_by: Vec<InterleaveRef>,
}

impl IndexDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            unique: false,
            column_names: Vec::new(),
            directions: Vec::new(),
            column_ids: Vec::new(),
            extra_column_ids: Vec::new(),
            store_column_names: Vec::new(),
            index_type: IndexType::Forward,
            geo_config: None,
            sharded: None,
            partitioning: None,
            predicate: None,
            interleave: Vec::new(),
            interleaved_by: Vec::new(),
        }
    }

    pub fn is_sharded(&self) -> bool {
        self.sharded.is_some()
    }

    pub fn is_interleaved(&self) -> bool {
        !self.interleave.is_empty()
    }

    /// The ancestor that owns the back-reference for this interleave chain.
    pub fn last_ancestor(&self) -> Option<&InterleaveAncestor> {
        self.interleave.last()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FamilyDescriptor {
    pub id: FamilyId,
    pub name: String,
    pub column_names: Vec<String>,
    pub column_ids: Vec<ColumnId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckConstraint {
    pub name: String,
    /// Serialized, dequalified expression.
    pub expr: String,
    pub validity: ConstraintValidity,
    /// Ids of the columns the expression references.
    pub column_ids: Vec<ColumnId>,
    /// Hidden checks are synthesized (shard bucket ranges), not user-declared.
    pub hidden: bool,
}

/// A foreign-key constraint. The same value lives in the origin table's
/// `outbound_fks` and the referenced table's `inbound_fks`; both descriptors
/// must be written in the same transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyConstraint {
    pub name: String,
    pub origin_table_id: DescId,
    pub origin_column_ids: Vec<ColumnId>,
    pub referenced_table_id: DescId,
    pub referenced_column_ids: Vec<ColumnId>,
    pub validity: ConstraintValidity,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
    pub match_method: MatchMethod,
}

/// A pending structural change on an existing table, queued until an
/// asynchronous schema change publishes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    AddIndex(IndexDescriptor),
    AddForeignKey(ForeignKeyConstraint),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceOpts {
    pub start: i64,
    pub increment: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalityConfig {
    Global,
    RegionalByTable { region: Option<String> },
    RegionalByRow,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub id: DescId,
    /// Owning database.
    pub parent_id: DescId,
    pub parent_schema_id: DescId,
    pub name: String,
    pub state: TableState,
    pub version: u64,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_index: IndexDescriptor,
    pub indexes: Vec<IndexDescriptor>,
    pub families: Vec<FamilyDescriptor>,
    pub checks: Vec<CheckConstraint>,
    pub outbound_fks: Vec<ForeignKeyConstraint>,
    pub inbound_fks: Vec<ForeignKeyConstraint>,
    pub mutations: Vec<Mutation>,
    pub locality: Option<LocalityConfig>,
    /// Original query text for tables created via CREATE TABLE AS.
    pub create_query: Option<String>,
    pub temporary: bool,
    /// Present iff this descriptor is a sequence.
    pub sequence_opts: Option<SequenceOpts>,
    /// Tables whose column defaults draw from this descriptor (sequences).
    pub depended_on_by: Vec<DescId>,
    pub next_column_id: ColumnId,
    pub next_index_id: IndexId,
    pub next_family_id: FamilyId,
}

impl TableDescriptor {
    pub fn new(
        id: DescId,
        parent_id: DescId,
        parent_schema_id: DescId,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            parent_id,
            parent_schema_id,
            name: name.into(),
            state: TableState::Public,
            version: 0,
            columns: Vec::new(),
            primary_index: IndexDescriptor::new(""),
            indexes: Vec::new(),
            families: Vec::new(),
            checks: Vec::new(),
            outbound_fks: Vec::new(),
            inbound_fks: Vec::new(),
            mutations: Vec::new(),
            locality: None,
            create_query: None,
            temporary: false,
            sequence_opts: None,
            depended_on_by: Vec::new(),
            next_column_id: 1,
            // Index id 1 is reserved for the primary index.
            next_index_id: 2,
            next_family_id: 1,
        }
    }

    pub fn is_sequence(&self) -> bool {
        self.sequence_opts.is_some()
    }

    pub fn find_column_by_name(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_by_name(&self, name: &str) -> SqlResult<&ColumnDescriptor> {
        self.find_column_by_name(name)
            .ok_or_else(|| SqlError::UndefinedColumn(name.to_string()))
    }

    pub fn column_mut_by_name(&mut self, name: &str) -> SqlResult<&mut ColumnDescriptor> {
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| SqlError::UndefinedColumn(name.to_string()))
    }

    pub fn find_column_by_id(&self, id: ColumnId) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn column_by_id(&self, id: ColumnId) -> SqlResult<&ColumnDescriptor> {
        self.find_column_by_id(id).ok_or_else(|| {
            SqlError::AssertionFailed(format!("column id {id} not found in table \"{}\"", self.name))
        })
    }

    /// All physical indexes: primary, secondary, and pending index mutations.
    pub fn all_indexes(&self) -> impl Iterator<Item = &IndexDescriptor> {
        std::iter::once(&self.primary_index)
            .chain(self.indexes.iter())
            .chain(self.mutations.iter().filter_map(|m| match m {
                Mutation::AddIndex(idx) => Some(idx),
                Mutation::AddForeignKey(_) => None,
            }))
    }

    pub fn find_index_by_name(&self, name: &str) -> Option<&IndexDescriptor> {
        self.all_indexes().find(|i| i.name == name)
    }

    /// Whether a name is already taken by a constraint or index on this
    /// table. Auto-generated constraint names must avoid all of these.
    pub fn constraint_name_in_use(&self, name: &str) -> bool {
        self.checks.iter().any(|c| c.name == name)
            || self.outbound_fks.iter().any(|fk| fk.name == name)
            || self.inbound_fks.iter().any(|fk| fk.name == name)
            || self
                .mutations
                .iter()
                .any(|m| matches!(m, Mutation::AddForeignKey(fk) if fk.name == name))
            || self.find_index_by_name(name).is_some()
    }

    /// Find an index usable as the origin side of a foreign key: its key
    /// columns must start with exactly the FK origin columns.
    pub fn find_fk_origin_index(&self, origin_col_ids: &[ColumnId]) -> Option<&IndexDescriptor> {
        self.all_indexes()
            .find(|idx| idx.column_ids.len() >= origin_col_ids.len()
                && idx.column_ids[..origin_col_ids.len()] == *origin_col_ids)
    }

    /// Find an index usable as the referenced side of a foreign key: it must
    /// be unique over exactly the referenced columns, in any key order.
    pub fn find_fk_referenced_index(
        &self,
        referenced_col_ids: &[ColumnId],
    ) -> Option<&IndexDescriptor> {
        self.all_indexes().find(|idx| {
            idx.unique
                && idx.column_ids.len() == referenced_col_ids.len()
                && referenced_col_ids
                    .iter()
                    .all(|id| idx.column_ids.contains(id))
        })
    }

    pub fn add_family(&mut self, name: impl Into<String>, column_names: Vec<String>) -> FamilyId {
        // Family 0 is the default "primary" family, created on first use.
        let id = if self.families.is_empty() {
            0
        } else {
            let id = self.next_family_id;
            self.next_family_id += 1;
            id
        };
        self.families.push(FamilyDescriptor {
            id,
            name: name.into(),
            column_names,
            column_ids: Vec::new(),
        });
        id
    }

    /// Assign permanent ids to columns, indexes, and families, synthesizing
    /// the hidden `rowid` primary key when none was declared.
    ///
    /// Strictly additive: elements that already carry a nonzero id keep it,
    /// so running this twice is a no-op the second time. Derived id lists
    /// (index column ids, family column ids) are recomputed from names.
    pub fn allocate_ids(&mut self) -> SqlResult<()> {
        if self.version == 0 {
            self.version = 1;
        }
        self.ensure_primary_key();

        for col in &mut self.columns {
            if col.id == 0 {
                col.id = self.next_column_id;
                self.next_column_id += 1;
            }
        }

        if self.primary_index.id == 0 {
            self.primary_index.id = 1;
        }
        self.primary_index.unique = true;

        let ids_for = |columns: &[ColumnDescriptor], names: &[String]| -> SqlResult<Vec<ColumnId>> {
            names
                .iter()
                .map(|n| {
                    columns
                        .iter()
                        .find(|c| &c.name == n)
                        .map(|c| c.id)
                        .ok_or_else(|| {
                            SqlError::AssertionFailed(format!(
                                "index references unknown column \"{n}\""
                            ))
                        })
                })
                .collect()
        };

        self.primary_index.column_ids = ids_for(&self.columns, &self.primary_index.column_names)?;
        let pk_ids = self.primary_index.column_ids.clone();

        let columns = self.columns.clone();
        let mut next_index_id = self.next_index_id;
        let mut fill_secondary = |idx: &mut IndexDescriptor| -> SqlResult<()> {
            if idx.id == 0 {
                idx.id = next_index_id;
                next_index_id += 1;
            }
            idx.column_ids = ids_for(&columns, &idx.column_names)?;
            idx.extra_column_ids = pk_ids
                .iter()
                .copied()
                .filter(|id| !idx.column_ids.contains(id))
                .collect();
            Ok(())
        };
        for idx in &mut self.indexes {
            fill_secondary(idx)?;
        }
        for m in &mut self.mutations {
            if let Mutation::AddIndex(idx) = m {
                fill_secondary(idx)?;
            }
        }
        self.next_index_id = next_index_id;

        self.allocate_families()?;
        Ok(())
    }

    /// When no primary key was declared, synthesize the hidden `rowid`
    /// column and make it the primary key.
    fn ensure_primary_key(&mut self) {
        if !self.primary_index.column_names.is_empty() {
            if self.primary_index.name.is_empty() {
                self.primary_index.name = PRIMARY_NAME.to_string();
            }
            return;
        }
        let mut name = "rowid".to_string();
        let mut suffix = 1;
        while self.find_column_by_name(&name).is_some() {
            name = format!("rowid_{suffix}");
            suffix += 1;
        }
        let mut rowid = ColumnDescriptor::new(name.clone(), SqlType::Int8);
        rowid.nullable = false;
        rowid.hidden = true;
        rowid.default_expr = Some("unique_rowid()".to_string());
        self.columns.push(rowid);
        self.primary_index.name = PRIMARY_NAME.to_string();
        self.primary_index.column_names = vec![name];
        self.primary_index.directions = vec![Direction::Asc];
    }

    fn allocate_families(&mut self) -> SqlResult<()> {
        if self.families.is_empty() {
            self.add_family(PRIMARY_NAME, Vec::new());
        }
        // Columns not explicitly placed land in the default family.
        let placed: Vec<String> = self
            .families
            .iter()
            .flat_map(|f| f.column_names.iter().cloned())
            .collect();
        let unplaced: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !placed.contains(&c.name))
            .map(|c| c.name.clone())
            .collect();
        self.families[0].column_names.extend(unplaced);

        let columns = self.columns.clone();
        for family in &mut self.families {
            family.column_ids = family
                .column_names
                .iter()
                .map(|n| {
                    columns
                        .iter()
                        .find(|c| &c.name == n)
                        .map(|c| c.id)
                        .ok_or_else(|| {
                            SqlError::AssertionFailed(format!(
                                "family \"{}\" references unknown column \"{n}\"",
                                family.name
                            ))
                        })
                })
                .collect::<SqlResult<Vec<_>>>()?;
        }
        Ok(())
    }

    /// Structural self-consistency checks run before a descriptor is
    /// persisted. Violations signal bugs in the build pipeline.
    pub fn validate(&self) -> SqlResult<()> {
        if self.name.is_empty() {
            return Err(SqlError::AssertionFailed("table has no name".into()));
        }
        if self.id == DescId::INVALID {
            return Err(SqlError::AssertionFailed(format!(
                "table \"{}\" has no id",
                self.name
            )));
        }
        if self.columns.is_empty() {
            return Err(SqlError::InvalidTableDefinition(format!(
                "table \"{}\" has no columns",
                self.name
            )));
        }
        let mut seen_names = Vec::new();
        let mut seen_ids = Vec::new();
        for col in &self.columns {
            if col.id == 0 {
                return Err(SqlError::AssertionFailed(format!(
                    "column \"{}\" has no id",
                    col.name
                )));
            }
            if seen_names.contains(&&col.name) {
                return Err(SqlError::DuplicateObject(format!(
                    "duplicate column name: \"{}\"",
                    col.name
                )));
            }
            if seen_ids.contains(&col.id) {
                return Err(SqlError::AssertionFailed(format!(
                    "column id {} assigned twice",
                    col.id
                )));
            }
            seen_names.push(&col.name);
            seen_ids.push(col.id);
        }

        let mut seen_index_ids = Vec::new();
        for idx in self.all_indexes() {
            if idx.id == 0 {
                return Err(SqlError::AssertionFailed(format!(
                    "index \"{}\" has no id",
                    idx.name
                )));
            }
            if seen_index_ids.contains(&idx.id) {
                return Err(SqlError::AssertionFailed(format!(
                    "index id {} assigned twice",
                    idx.id
                )));
            }
            seen_index_ids.push(idx.id);
            if idx.column_ids.len() != idx.column_names.len()
                || idx.directions.len() != idx.column_names.len()
            {
                return Err(SqlError::AssertionFailed(format!(
                    "index \"{}\" has mismatched column lists",
                    idx.name
                )));
            }
            for id in idx.column_ids.iter().chain(idx.extra_column_ids.iter()) {
                self.column_by_id(*id)?;
            }
        }

        for id in &self.primary_index.column_ids {
            let col = self.column_by_id(*id)?;
            if col.nullable {
                return Err(SqlError::AssertionFailed(format!(
                    "primary key column \"{}\" is nullable",
                    col.name
                )));
            }
        }

        for fk in self.outbound_fks.iter().chain(self.inbound_fks.iter()) {
            if fk.origin_column_ids.len() != fk.referenced_column_ids.len() {
                return Err(SqlError::AssertionFailed(format!(
                    "foreign key \"{}\" has mismatched column lists",
                    fk.name
                )));
            }
        }
        Ok(())
    }
}

/// Produce a constraint name not already taken, appending `_N` on collision.
pub fn generate_unique_constraint_name(prefix: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(prefix) {
        return prefix.to_string();
    }
    let mut suffix = 1;
    loop {
        let name = format!("{prefix}_{suffix}");
        if !taken(&name) {
            return name;
        }
        suffix += 1;
    }
}
