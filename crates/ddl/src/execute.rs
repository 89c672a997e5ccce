//! Execution of CREATE TABLE: target resolution, descriptor assembly,
//! state gating, cross-reference validation, and the CTAS data fill.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use catalog::{EventRecord, TableDescriptor, TableState, Transaction};
use common::{DescId, Row, SqlError, SqlResult};
use expr::EvalContext;
use parser::{CreateTable, parse_expr_text};
use types::SqlType;

use crate::SessionContext;
use crate::assemble::{new_table_desc, new_table_desc_if_as};
use crate::interleave::finalize_interleave;
use crate::partition::PartitioningHook;
use crate::target::resolve_create_target;

/// Stream of rows feeding a CREATE TABLE AS fill. The schema is fixed for
/// the life of the source and determines the new table's columns.
pub trait RowSource {
    fn schema(&self) -> &[(String, SqlType)];
    fn next_row(&mut self) -> SqlResult<Option<Row>>;
}

/// Cooperative cancellation handle checked between rows during a CTAS fill.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateTableOutcome {
    pub table_id: DescId,
    /// False when IF NOT EXISTS suppressed the statement.
    pub created: bool,
    pub rows_inserted: u64,
}

/// Run one CREATE TABLE statement inside the given transaction. Nothing is
/// visible outside the transaction until the caller commits it.
pub fn create_table(
    txn: &mut Transaction<'_>,
    ctx: &SessionContext,
    hook: &dyn PartitioningHook,
    stmt: &CreateTable,
    source: Option<&mut dyn RowSource>,
    cancel: &CancelToken,
) -> SqlResult<CreateTableOutcome> {
    let schema_id = match resolve_create_target(txn, ctx, &stmt.name, stmt.persistence) {
        Ok(id) => id,
        Err(err) if stmt.if_not_exists && err.is_relation_already_exists() => {
            let table_id = txn
                .schema_by_name(ctx.database_id, stmt.name.schema_or_default())
                .and_then(|s| txn.lookup_table(ctx.database_id, s.id, &stmt.name.table))
                .unwrap_or(DescId::INVALID);
            return Ok(CreateTableOutcome {
                table_id,
                created: false,
                rows_inserted: 0,
            });
        }
        Err(err) => return Err(err),
    };

    let id = txn.generate_unique_id();
    let mut source = source;
    let built = if stmt.is_as() {
        let src = source.as_mut().ok_or_else(|| {
            SqlError::AssertionFailed("CREATE TABLE AS requires a row source".into())
        })?;
        new_table_desc_if_as(txn, ctx, hook, stmt, id, schema_id, src.schema())?
    } else {
        new_table_desc(txn, ctx, hook, stmt, id, schema_id)?
    };
    let mut desc = built.desc;
    let affected = built.affected;

    // The new table may go public only when everything it points at was
    // created in this same transaction; otherwise it stays in Add state
    // until the references commit. Interleaved children additionally wait
    // for the parent back-reference below.
    let publish = forward_refs_are_new(txn, &desc);
    let interleaved = desc.primary_index.is_interleaved();
    if publish && !interleaved && desc.state == TableState::Add {
        desc.state = TableState::Public;
    }

    let name = desc.name.clone();
    txn.write_table(desc);
    for (_, other) in affected {
        txn.write_table(other);
    }
    if interleaved {
        finalize_interleave(txn, id, publish)?;
    }

    // Validate the copy the transaction will actually commit.
    let fresh = txn.get_table(id)?;
    fresh.validate()?;
    validate_cross_references(txn, &fresh)?;

    txn.record_event(EventRecord {
        event_type: "create_table".into(),
        descriptor_id: id,
        descriptor_name: name,
        user: ctx.session.user.clone(),
        statement: format!("CREATE TABLE {}", stmt.name),
    });

    let mut rows_inserted = 0;
    if stmt.is_as() {
        let src = source.ok_or_else(|| {
            SqlError::AssertionFailed("CREATE TABLE AS requires a row source".into())
        })?;
        rows_inserted = run_ctas_fill(txn, &fresh, src, cancel)?;
    }

    Ok(CreateTableOutcome {
        table_id: id,
        created: true,
        rows_inserted,
    })
}

fn forward_refs_are_new(txn: &Transaction<'_>, desc: &TableDescriptor) -> bool {
    let fks_new = desc
        .outbound_fks
        .iter()
        .filter(|fk| fk.referenced_table_id != desc.id)
        .all(|fk| txn.is_new(fk.referenced_table_id));
    let ancestors_new = desc
        .primary_index
        .interleave
        .iter()
        .all(|anc| txn.is_new(anc.table_id));
    let sequences_new = desc
        .columns
        .iter()
        .flat_map(|c| c.uses_sequence_ids.iter())
        .all(|id| txn.is_new(*id));
    fks_new && ancestors_new && sequences_new
}

/// Every reference the descriptor makes must have its mirror image on the
/// referenced descriptor as staged in this transaction.
fn validate_cross_references(txn: &Transaction<'_>, desc: &TableDescriptor) -> SqlResult<()> {
    for fk in &desc.outbound_fks {
        let other = if fk.referenced_table_id == desc.id {
            desc.clone()
        } else {
            txn.get_table(fk.referenced_table_id)?
        };
        if !other.inbound_fks.contains(fk) {
            return Err(SqlError::AssertionFailed(format!(
                "foreign key \"{}\" has no back reference on table \"{}\"",
                fk.name, other.name
            )));
        }
    }
    for col in &desc.columns {
        for seq_id in &col.uses_sequence_ids {
            let seq = txn.get_table(*seq_id)?;
            if !seq.depended_on_by.contains(&desc.id) {
                return Err(SqlError::AssertionFailed(format!(
                    "sequence \"{}\" does not record its dependency on \"{}\"",
                    seq.name, desc.name
                )));
            }
        }
    }
    if let Some(ancestor) = desc.primary_index.last_ancestor() {
        let parent = txn.get_table(ancestor.table_id)?;
        let backref = parent.all_indexes().any(|idx| {
            idx.id == ancestor.index_id
                && idx
                    .interleaved_by
                    .iter()
                    .any(|r| r.table_id == desc.id && r.index_id == desc.primary_index.id)
        });
        if !backref {
            return Err(SqlError::AssertionFailed(format!(
                "interleave parent \"{}\" has no back reference to \"{}\"",
                parent.name, desc.name
            )));
        }
    }
    Ok(())
}

/// Pump the source into the new table. The sequencing step beforehand keeps
/// rows staged by this fill invisible to the source's own reads.
fn run_ctas_fill(
    txn: &mut Transaction<'_>,
    desc: &TableDescriptor,
    source: &mut dyn RowSource,
    cancel: &CancelToken,
) -> SqlResult<u64> {
    txn.step();

    let provided = source.schema().len();
    let mut trailing = Vec::new();
    for col in desc.columns.iter().skip(provided) {
        let Some(text) = &col.default_expr else {
            return Err(SqlError::AssertionFailed(format!(
                "column \"{}\" has no value in the source and no default",
                col.name
            )));
        };
        trailing.push(parse_expr_text(text)?);
    }
    let schema: Vec<String> = desc.columns.iter().map(|c| c.name.clone()).collect();
    let eval = EvalContext::new(&schema);

    let mut inserted = 0;
    while let Some(mut row) = source.next_row()? {
        if cancel.is_canceled() {
            return Err(SqlError::Canceled);
        }
        for expr in &trailing {
            let value = eval.eval(expr, &row)?;
            row.values.push(value);
        }
        txn.insert_row(desc.id, row);
        inserted += 1;
    }
    Ok(inserted)
}
