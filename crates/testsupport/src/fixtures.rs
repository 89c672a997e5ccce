//! Common test fixtures: row builders, descriptor builders, and a catalog
//! store pre-seeded with reference tables.

use catalog::{CatalogStore, ColumnDescriptor, SequenceOpts, TableDescriptor};
use common::{DescId, Direction, Row};
use types::{SqlType, Value};

/// Build a row with integer values.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let row = int_row(&[1, 2, 3]);
/// assert_eq!(row.values.len(), 3);
/// ```
pub fn int_row(values: &[i64]) -> Row {
    Row::new(values.iter().map(|&v| Value::Int(v)).collect())
}

/// Build a row with text values.
pub fn text_row(values: &[&str]) -> Row {
    Row::new(values.iter().map(|&v| Value::Text(v.to_string())).collect())
}

/// Build a row with mixed value types.
pub fn mixed_row(values: Vec<Value>) -> Row {
    Row::new(values)
}

/// Build a table descriptor with the given non-null columns and primary
/// key, with all ids allocated. Panics on invalid input; fixtures fail
/// loudly rather than propagating errors.
pub fn table_descriptor(
    id: u64,
    name: &str,
    columns: &[(&str, SqlType)],
    primary_key: &[&str],
) -> TableDescriptor {
    let mut tbl = TableDescriptor::new(
        DescId(id),
        catalog::DEFAULT_DATABASE_ID,
        catalog::PUBLIC_SCHEMA_ID,
        name,
    );
    for (col_name, ty) in columns {
        let mut col = ColumnDescriptor::new(*col_name, ty.clone());
        col.nullable = !primary_key.contains(col_name);
        tbl.columns.push(col);
    }
    tbl.primary_index.column_names = primary_key.iter().map(|c| c.to_string()).collect();
    tbl.primary_index.directions = vec![Direction::Asc; primary_key.len()];
    tbl.allocate_ids().expect("fixture descriptor must allocate");
    tbl
}

/// Build a sequence descriptor counting up from 1.
pub fn sequence_descriptor(id: u64, name: &str) -> TableDescriptor {
    let mut seq = TableDescriptor::new(
        DescId(id),
        catalog::DEFAULT_DATABASE_ID,
        catalog::PUBLIC_SCHEMA_ID,
        name,
    );
    seq.sequence_opts = Some(SequenceOpts {
        start: 1,
        increment: 1,
    });
    seq.allocate_ids().expect("fixture sequence must allocate");
    seq
}

/// A catalog store with two committed tables and one committed sequence:
///
/// - `customers (cid INT8 PRIMARY KEY, email STRING)`
/// - `orders (oid INT8 PRIMARY KEY, cid INT8)` with rows for customer 1
/// - `order_seq`, a sequence
pub fn seeded_store() -> CatalogStore {
    let mut store = CatalogStore::new();
    let mut txn = store.begin();

    let customers_id = txn.generate_unique_id();
    txn.write_table(table_descriptor(
        customers_id.0,
        "customers",
        &[("cid", SqlType::Int8), ("email", SqlType::String)],
        &["cid"],
    ));

    let orders_id = txn.generate_unique_id();
    txn.write_table(table_descriptor(
        orders_id.0,
        "orders",
        &[("oid", SqlType::Int8), ("cid", SqlType::Int8)],
        &["oid"],
    ));
    txn.insert_row(
        orders_id,
        mixed_row(vec![Value::Int(100), Value::Int(1)]),
    );
    txn.insert_row(
        orders_id,
        mixed_row(vec![Value::Int(101), Value::Int(1)]),
    );

    let seq_id = txn.generate_unique_id();
    txn.write_table(sequence_descriptor(seq_id.0, "order_seq"));

    txn.commit().expect("seed commit must succeed");
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn seeded_store_has_reference_tables() {
        let store = seeded_store();
        let customers = store
            .lookup_table(
                catalog::DEFAULT_DATABASE_ID,
                catalog::PUBLIC_SCHEMA_ID,
                "customers",
            )
            .expect("customers table seeded");
        let tbl = store.table_by_id(customers).unwrap();
        assert_eq!(tbl.primary_index.column_names, vec!["cid".to_string()]);

        let orders = store
            .lookup_table(
                catalog::DEFAULT_DATABASE_ID,
                catalog::PUBLIC_SCHEMA_ID,
                "orders",
            )
            .unwrap();
        assert_eq!(store.rows_of(orders).len(), 2);

        let seq = store
            .lookup_table(
                catalog::DEFAULT_DATABASE_ID,
                catalog::PUBLIC_SCHEMA_ID,
                "order_seq",
            )
            .unwrap();
        assert!(store.table_by_id(seq).unwrap().is_sequence());
    }
}
