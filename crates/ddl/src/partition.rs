use catalog::{IndexDescriptor, TableDescriptor};
use common::{SqlError, SqlResult};
use parser::PartitionBy;

/// Capability that constructs partitioning metadata for an index.
/// Partitioning is zone-config-linked and lives behind this boundary; the
/// engine only invokes it with the table, the target index, and the spec.
pub trait PartitioningHook {
    fn create_partitioning(
        &self,
        table: &TableDescriptor,
        index: &mut IndexDescriptor,
        spec: &PartitionBy,
    ) -> SqlResult<()>;
}

/// Default hook: partitioning is not available in this build.
pub struct RefusePartitioning;

impl PartitioningHook for RefusePartitioning {
    fn create_partitioning(
        &self,
        _table: &TableDescriptor,
        _index: &mut IndexDescriptor,
        _spec: &PartitionBy,
    ) -> SqlResult<()> {
        Err(SqlError::FeatureNotSupported(
            "partitioning requires an enterprise-enabled build".into(),
        ))
    }
}
