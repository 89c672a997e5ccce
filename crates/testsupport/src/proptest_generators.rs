//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random values, rows, and table
//! descriptors for property-based testing of catalog operations.

use catalog::{ColumnDescriptor, TableDescriptor};
use common::{DescId, Direction, Row};
use proptest::prelude::*;
use types::{SqlType, Value};

/// Strategy for generating random `Value` instances.
///
/// Generates a mix of Int, Text, Bool, and Null values.
pub fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Int),
        "[a-z]{1,20}".prop_map(Value::Text),
        any::<bool>().prop_map(Value::Bool),
        Just(Value::Null),
    ]
}

/// Strategy for generating random `Row` instances with 1-10 columns.
pub fn arb_row() -> impl Strategy<Value = Row> {
    prop::collection::vec(arb_value(), 1..10).prop_map(Row::new)
}

/// Strategy for generating scalar column types.
pub fn arb_sql_type() -> impl Strategy<Value = SqlType> {
    prop_oneof![
        Just(SqlType::Int2),
        Just(SqlType::Int4),
        Just(SqlType::Int8),
        Just(SqlType::Float8),
        Just(SqlType::Decimal),
        Just(SqlType::Bool),
        Just(SqlType::String),
        Just(SqlType::Bytes),
        Just(SqlType::Timestamp),
        Just(SqlType::Date),
    ]
}

/// Strategy for generating unallocated table descriptors with 1-8 uniquely
/// named columns and a primary key over a prefix of them (possibly empty,
/// leaving id allocation to synthesize one).
///
/// # Example
///
/// ```
/// use proptest::prelude::*;
/// use testsupport::proptest_generators::arb_table_descriptor;
///
/// proptest! {
///     #[test]
///     fn descriptors_allocate(mut tbl in arb_table_descriptor()) {
///         tbl.allocate_ids().unwrap();
///         prop_assert!(tbl.columns.iter().all(|c| c.id != 0));
///     }
/// }
/// ```
pub fn arb_table_descriptor() -> impl Strategy<Value = TableDescriptor> {
    let columns = prop::collection::btree_set("[a-e][a-z]{0,6}", 1..8);
    (columns, 0usize..4).prop_map(|(names, pk_len)| {
        let names: Vec<String> = names.into_iter().collect();
        let mut tbl = TableDescriptor::new(
            DescId(100),
            catalog::DEFAULT_DATABASE_ID,
            catalog::PUBLIC_SCHEMA_ID,
            "generated",
        );
        let pk_len = pk_len.min(names.len());
        for (i, name) in names.iter().enumerate() {
            let mut col = ColumnDescriptor::new(name, SqlType::Int8);
            col.nullable = i >= pk_len;
            tbl.columns.push(col);
        }
        tbl.primary_index.column_names = names[..pk_len].to_vec();
        tbl.primary_index.directions = vec![Direction::Asc; pk_len];
        tbl
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_descriptors_validate_after_allocation(
            mut tbl in arb_table_descriptor()
        ) {
            tbl.allocate_ids().unwrap();
            tbl.validate().unwrap();
        }
    }
}
