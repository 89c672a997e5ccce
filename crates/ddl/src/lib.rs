//! Table creation engine: turns a parsed CREATE TABLE statement into a
//! validated table descriptor and stages it, together with every other
//! descriptor the statement touches, in a catalog transaction.
//!
//! The build runs in passes. Columns are materialized first, then indexes
//! and constraints; `allocate_ids` pivots the descriptor from name-based to
//! id-based resolution, after which foreign keys, interleaves, and column
//! defaults bind against permanent ids. [`execute::create_table`] drives
//! the whole pipeline:
//!
//! ```text
//! CreateTable (AST)
//!     │  resolve_create_target      schema, privileges, name collisions
//!     ▼
//! new_table_desc                    multi-pass descriptor assembly
//!     │  resolve_fk                 both sides of every foreign key
//!     │  add_interleave             parent/child nesting
//!     ▼
//! Transaction::write_table          staged, committed atomically
//! ```
//!
//! Partitioning sits behind [`PartitioningHook`]; builds without that
//! capability refuse PARTITION BY rather than producing half-configured
//! descriptors.

mod assemble;
mod column;
mod execute;
mod fk;
mod index;
mod interleave;
mod partition;
mod target;
#[cfg(test)]
mod tests;

pub use assemble::{BuiltTable, new_table_desc, new_table_desc_if_as, replace_like_table_defs};
pub use column::{build_column, shard_column_name, validate_column_type};
pub use execute::{CancelToken, CreateTableOutcome, RowSource, create_table};
pub use fk::{FkSelfResolver, FkTableState, ValidationBehavior, resolve_fk};
pub use index::{build_index, eval_shard_buckets};
pub use interleave::{add_interleave, finalize_interleave};
pub use partition::{PartitioningHook, RefusePartitioning};
pub use target::resolve_create_target;

use common::{ClusterSettings, DescId, SessionData};

/// Everything about the environment a statement runs in: cluster-wide
/// settings, per-session variables, and the current database.
#[derive(Clone, Debug)]
pub struct SessionContext {
    pub settings: ClusterSettings,
    pub session: SessionData,
    pub database_id: DescId,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            settings: ClusterSettings::default(),
            session: SessionData::default(),
            database_id: catalog::DEFAULT_DATABASE_ID,
        }
    }
}
