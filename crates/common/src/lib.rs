
use serde::{Deserialize, Serialize};
use std::{fmt, io};
use thiserror::Error;
use types::Value;

/// Identifier for a descriptor (database, schema, table, sequence).
/// Examples:
/// - `let db = DescId(50);`
/// - `let users_table = DescId(52);`
/// - `let unallocated = DescId(0);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DescId(pub u64);

impl DescId {
    /// The zero id, used for descriptors that have not been allocated yet.
    pub const INVALID: DescId = DescId(0);
}

impl fmt::Display for DescId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a column within a table descriptor. 0 until allocated.
pub type ColumnId = u32;

/// Identifier for an index within a table descriptor. 0 until allocated.
pub type IndexId = u32;

/// Identifier for a column family within a table descriptor.
pub type FamilyId = u32;

/// Sort direction of a single index key column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Referential action attached to ON DELETE / ON UPDATE of a foreign key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Restrict,
    SetNull,
    SetDefault,
    Cascade,
}

/// Composite key match method of a foreign key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMethod {
    #[default]
    Simple,
    Full,
    Partial,
}

/// Tri-state validity marker for checks and foreign keys.
///
/// `Validated` constraints are known to hold; `Validating` ones are queued
/// for an async backfill check; `Unvalidated` ones are assumed correct.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintValidity {
    #[default]
    Validated,
    Validating,
    Unvalidated,
}

/// Positional row representation backed by `types::Value`, used by the
/// CREATE TABLE AS data fill.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

/// Possibly schema-qualified object name, e.g. `public.users` or `users`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    pub schema: Option<String>,
    pub table: String,
}

impl TableName {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
        }
    }

    pub fn qualified(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            table: table.into(),
        }
    }

    /// The schema this name resolves in, defaulting to `public`.
    pub fn schema_or_default(&self) -> &str {
        self.schema.as_deref().unwrap_or("public")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.table),
            None => write!(f, "{}", self.table),
        }
    }
}

/// Kind of catalog object a name collided with, used in error messages and
/// for deciding whether IF NOT EXISTS may suppress the collision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Table,
    Sequence,
    Database,
    Schema,
    TypeAlias,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectKind::Table => "relation",
            ObjectKind::Sequence => "sequence",
            ObjectKind::Database => "database",
            ObjectKind::Schema => "schema",
            ObjectKind::TypeAlias => "type",
        };
        f.write_str(s)
    }
}

/// Typed SQL errors surfaced to the client. Every builder and resolver in the
/// descriptor-construction engine returns the first of these it encounters;
/// nothing below the statement layer retries or converts them.
#[derive(Error, Debug)]
pub enum SqlError {
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: ObjectKind, name: String },
    #[error("insufficient privilege: {0}")]
    InsufficientPrivilege(String),
    #[error("unimplemented: {0}")]
    FeatureNotSupported(String),
    #[error("invalid schema definition: {0}")]
    InvalidSchemaDefinition(String),
    #[error("invalid foreign key: {0}")]
    InvalidForeignKey(String),
    #[error("invalid table definition: {0}")]
    InvalidTableDefinition(String),
    #[error("datatype mismatch: {0}")]
    DatatypeMismatch(String),
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("duplicate object: {0}")]
    DuplicateObject(String),
    #[error("relation {0:?} does not exist")]
    UndefinedTable(String),
    #[error("column {0:?} does not exist")]
    UndefinedColumn(String),
    #[error("parse: {0}")]
    Parser(String),
    #[error("query execution canceled")]
    Canceled,
    #[error("internal error: {0}")]
    AssertionFailed(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SqlError {
    /// True for the collision errors that IF NOT EXISTS may suppress.
    pub fn is_relation_already_exists(&self) -> bool {
        matches!(
            self,
            SqlError::AlreadyExists {
                kind: ObjectKind::Table | ObjectKind::Sequence,
                ..
            }
        )
    }
}

/// Result alias that carries a `SqlError`.
pub type SqlResult<T> = Result<T, SqlError>;

/// Version gates for features that require a finalized cluster upgrade.
/// The gate ordering is fixed at compile time; nothing mutates it at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionGate {
    GeospatialTypes,
    Box2dType,
    EmptyArraysInInvertedIndexes,
    NoOriginFkIndexes,
}

impl VersionGate {
    pub fn min_version(self) -> ClusterVersion {
        match self {
            VersionGate::GeospatialTypes => ClusterVersion(1),
            VersionGate::Box2dType => ClusterVersion(2),
            VersionGate::EmptyArraysInInvertedIndexes => ClusterVersion(3),
            VersionGate::NoOriginFkIndexes => ClusterVersion(4),
        }
    }
}

/// Active version of the cluster, compared against `VersionGate`s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterVersion(pub u32);

impl ClusterVersion {
    pub const LATEST: ClusterVersion = ClusterVersion(4);

    pub fn is_active(self, gate: VersionGate) -> bool {
        self >= gate.min_version()
    }
}

impl Default for ClusterVersion {
    fn default() -> Self {
        ClusterVersion::LATEST
    }
}

/// Cluster-wide settings consulted during descriptor construction.
///
/// # Example
/// ```
/// use common::{ClusterSettings, ClusterVersion};
///
/// let settings = ClusterSettings::builder()
///     .version(ClusterVersion(2))
///     .allow_cross_database_fks(true)
///     .build();
/// assert!(settings.allow_cross_database_fks);
/// ```
#[derive(Clone, Debug, bon::Builder)]
pub struct ClusterSettings {
    /// Active cluster version; gates type usage and FK origin-index rules.
    #[builder(default)]
    pub version: ClusterVersion,
    /// Whether foreign keys may reference tables in another database.
    #[builder(default = false)]
    pub allow_cross_database_fks: bool,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        ClusterSettings::builder().build()
    }
}

/// Per-session state consulted during descriptor construction.
#[derive(Clone, Debug, bon::Builder)]
pub struct SessionData {
    /// User running the statement; checked against schema privileges.
    #[builder(default = "root".to_string(), into)]
    pub user: String,
    /// Gates `CREATE TEMPORARY TABLE`.
    #[builder(default = false)]
    pub temp_tables_enabled: bool,
    /// Gates `USING HASH` sharded indexes.
    #[builder(default = false)]
    pub hash_sharded_indexes_enabled: bool,
    /// When set, tables without an explicit primary key are rejected.
    #[builder(default = false)]
    pub require_explicit_primary_keys: bool,
    /// Gates inverted indexes over more than one column.
    #[builder(default = false)]
    pub enable_multi_column_inverted_indexes: bool,
}

impl Default for SessionData {
    fn default() -> Self {
        SessionData::builder().build()
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{
        ClusterSettings, ColumnId, ConstraintValidity, DescId, Direction, FamilyId,
        ForeignKeyAction, IndexId, MatchMethod, ObjectKind, Row, SessionData, SqlError, SqlResult,
        TableName,
    };
    pub use types::{SqlType, Value};
}
