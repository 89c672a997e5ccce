use common::{Direction, ForeignKeyAction, MatchMethod, TableName};
use expr::Expr;
use types::SqlType;

/// A parsed `CREATE TABLE` (or `CREATE TABLE AS`) statement.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct CreateTable {
    pub name: TableName,
    pub defs: Vec<TableDef>,
    pub if_not_exists: bool,
    pub persistence: Persistence,
    pub on_commit: OnCommit,
    /// INTERLEAVE IN PARENT clause on the primary index.
    pub interleave: Option<InterleaveDef>,
    /// PARTITION BY clause on the primary index.
    pub partition_by: Option<PartitionBy>,
    pub locality: Option<Locality>,
    pub storage_params: Vec<(String, String)>,
    /// Present for CREATE TABLE AS.
    pub as_source: Option<CtasSource>,
}

impl CreateTable {
    pub fn new(name: TableName, defs: Vec<TableDef>) -> Self {
        Self {
            name,
            defs,
            ..Default::default()
        }
    }

    /// Whether this is a CREATE TABLE AS statement.
    pub fn is_as(&self) -> bool {
        self.as_source.is_some()
    }

    /// Whether a CTAS statement carries a user-specified primary key.
    pub fn as_has_user_specified_primary_key(&self) -> bool {
        self.is_as()
            && self.defs.iter().any(|def| match def {
                TableDef::Column(c) => c.primary_key,
                TableDef::Unique(u) => u.primary_key,
                _ => false,
            })
    }
}

/// Closed set of items that can appear inside a CREATE TABLE definition
/// list. Each build phase matches this exhaustively, so an unhandled def
/// kind is a compile error rather than a runtime fallthrough.
#[derive(Clone, Debug, PartialEq)]
pub enum TableDef {
    Column(ColumnDef),
    Index(IndexDef),
    Unique(UniqueConstraintDef),
    Check(CheckConstraintDef),
    ForeignKey(ForeignKeyDef),
    Family(FamilyDef),
    Like(LikeTableDef),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Persistence {
    #[default]
    Permanent,
    Temporary,
    Unlogged,
}

impl Persistence {
    pub fn is_temporary(self) -> bool {
        self == Persistence::Temporary
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OnCommit {
    #[default]
    Unset,
    PreserveRows,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: SqlType,
    pub nullability: Nullability,
    pub primary_key: bool,
    /// PRIMARY KEY USING HASH WITH BUCKET_COUNT = n.
    pub sharded: Option<ShardedDef>,
    pub unique: bool,
    pub default_expr: Option<Expr>,
    pub computed: Option<ComputedDef>,
    pub family: Option<String>,
    pub hidden: bool,
    /// Inline `REFERENCES parent (col)` shorthand.
    pub references: Option<ForeignKeyDef>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullability: Nullability::Silent,
            primary_key: false,
            sharded: None,
            unique: false,
            default_expr: None,
            computed: None,
            family: None,
            hidden: false,
            references: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullability = Nullability::NotNull;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn is_computed(&self) -> bool {
        self.computed.is_some()
    }

    pub fn has_default(&self) -> bool {
        self.default_expr.is_some()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Nullability {
    NotNull,
    Null,
    /// Nullable because nothing was said either way.
    #[default]
    Silent,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComputedDef {
    pub expr: Expr,
    /// Virtual (non-stored) computed columns are not implemented.
    pub virtual_: bool,
}

/// `USING HASH WITH BUCKET_COUNT = <expr>`.
#[derive(Clone, Debug, PartialEq)]
pub struct ShardedDef {
    pub shard_buckets: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexElem {
    pub column: String,
    pub direction: Direction,
}

impl IndexElem {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexDef {
    pub name: Option<String>,
    pub columns: Vec<IndexElem>,
    pub storing: Vec<String>,
    pub inverted: bool,
    pub sharded: Option<ShardedDef>,
    pub partition_by: Option<PartitionBy>,
    pub predicate: Option<Expr>,
    pub interleave: Option<InterleaveDef>,
}

impl IndexDef {
    pub fn on(columns: Vec<IndexElem>) -> Self {
        Self {
            name: None,
            columns,
            storing: Vec::new(),
            inverted: false,
            sharded: None,
            partition_by: None,
            predicate: None,
            interleave: None,
        }
    }
}

/// UNIQUE or PRIMARY KEY table constraint; wraps an index definition the
/// same way the definition list does.
#[derive(Clone, Debug, PartialEq)]
pub struct UniqueConstraintDef {
    pub index: IndexDef,
    pub primary_key: bool,
    pub without_index: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CheckConstraintDef {
    pub name: Option<String>,
    pub expr: Expr,
    /// Hidden checks are synthesized (shard bucket ranges) rather than
    /// user-declared.
    pub hidden: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForeignKeyDef {
    pub name: Option<String>,
    pub from_cols: Vec<String>,
    pub table: TableName,
    /// Empty means "default to the target's primary key columns".
    pub to_cols: Vec<String>,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
    pub match_method: MatchMethod,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FamilyDef {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// `LIKE <table> [INCLUDING/EXCLUDING <option> ...]`.
#[derive(Clone, Debug, PartialEq)]
pub struct LikeTableDef {
    pub name: TableName,
    pub options: Vec<LikeTableOption>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LikeTableOption {
    pub opt: LikeOpt,
    pub excluded: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LikeOpt {
    Defaults,
    Constraints,
    Indexes,
    Generated,
    All,
}

/// Resolved set of LIKE options after applying INCLUDING/EXCLUDING in order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LikeOptSet {
    pub defaults: bool,
    pub constraints: bool,
    pub indexes: bool,
    pub generated: bool,
}

impl LikeOptSet {
    pub fn from_options(options: &[LikeTableOption]) -> Self {
        let mut set = LikeOptSet::default();
        for o in options {
            let on = !o.excluded;
            match o.opt {
                LikeOpt::Defaults => set.defaults = on,
                LikeOpt::Constraints => set.constraints = on,
                LikeOpt::Indexes => set.indexes = on,
                LikeOpt::Generated => set.generated = on,
                LikeOpt::All => {
                    set.defaults = on;
                    set.constraints = on;
                    set.indexes = on;
                    set.generated = on;
                }
            }
        }
        set
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterleaveDef {
    pub parent: TableName,
    pub fields: Vec<String>,
}

/// Partition spec handed to the partitioning capability; construction of the
/// partitioning descriptor itself happens behind that boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionBy {
    pub columns: Vec<String>,
    pub partitions: Vec<ListPartition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListPartition {
    pub name: String,
    pub values: Vec<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Locality {
    Global,
    RegionalByTable { region: Option<String> },
    RegionalByRow,
}

/// Source of a CREATE TABLE AS statement. The engine stores the query text
/// on the descriptor; the row stream arrives separately at execution time.
#[derive(Clone, Debug, PartialEq)]
pub struct CtasSource {
    pub query: String,
}
