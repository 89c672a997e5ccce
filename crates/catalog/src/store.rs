use std::{fs, path::Path};

use common::{DescId, Row, SqlError, SqlResult, TableName};
use serde::{Deserialize, Serialize};

use crate::{Map, TableDescriptor};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatabaseDescriptor {
    pub id: DescId,
    pub name: String,
    /// Regions of a multi-region database; empty for regular databases.
    pub regions: Vec<String>,
    pub primary_region: Option<String>,
}

impl DatabaseDescriptor {
    pub fn is_multi_region(&self) -> bool {
        !self.regions.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub id: DescId,
    pub database_id: DescId,
    pub name: String,
    pub temporary: bool,
    /// Users granted CREATE on this schema, in addition to root.
    pub create_allowed: Vec<String>,
}

impl SchemaDescriptor {
    pub fn can_create(&self, user: &str) -> bool {
        user == "root" || self.create_allowed.iter().any(|u| u == user)
    }
}

/// Audit log entry written in the same transaction as the DDL it records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: String,
    pub descriptor_id: DescId,
    pub descriptor_name: String,
    pub user: String,
    pub statement: String,
}

/// Committed catalog state, persisted as pretty JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogStore {
    databases: Vec<DatabaseDescriptor>,
    schemas: Vec<SchemaDescriptor>,
    tables: Vec<TableDescriptor>,
    event_log: Vec<EventRecord>,
    next_desc_id: u64,
    /// Table row data; kept in memory only, not part of catalog metadata.
    #[serde(skip)]
    #[serde(default)]
    rows: Map<DescId, Vec<Row>>,
    #[serde(skip)]
    #[serde(default)]
    name_index: Map<(DescId, DescId, String), usize>,
    #[serde(skip)]
    #[serde(default)]
    id_index: Map<DescId, usize>,
}

/// Descriptor id of the default database.
pub const DEFAULT_DATABASE_ID: DescId = DescId(1);
/// Descriptor id of the default database's public schema.
pub const PUBLIC_SCHEMA_ID: DescId = DescId(2);

impl CatalogStore {
    /// Create a store seeded with the default database and public schema.
    pub fn new() -> Self {
        let mut store = Self {
            databases: vec![DatabaseDescriptor {
                id: DEFAULT_DATABASE_ID,
                name: "defaultdb".to_string(),
                regions: Vec::new(),
                primary_region: None,
            }],
            schemas: vec![SchemaDescriptor {
                id: PUBLIC_SCHEMA_ID,
                database_id: DEFAULT_DATABASE_ID,
                name: "public".to_string(),
                temporary: false,
                create_allowed: Vec::new(),
            }],
            tables: Vec::new(),
            event_log: Vec::new(),
            next_desc_id: 3,
            rows: Map::default(),
            name_index: Map::default(),
            id_index: Map::default(),
        };
        store.rebuild_indexes();
        store
    }

    /// Load a store from disk, returning a fresh store if the file does not exist.
    pub fn load(path: &Path) -> SqlResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read_to_string(path)?;
        let mut store: CatalogStore = serde_json::from_str(&data)
            .map_err(|err| SqlError::AssertionFailed(format!("invalid catalog file: {err}")))?;
        store.rebuild_indexes();
        Ok(store)
    }

    /// Persist catalog metadata as pretty JSON.
    pub fn save(&self, path: &Path) -> SqlResult<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|err| SqlError::AssertionFailed(format!("serialize failed: {err}")))?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn generate_unique_id(&mut self) -> DescId {
        let id = DescId(self.next_desc_id);
        self.next_desc_id += 1;
        id
    }

    pub fn database(&self, id: DescId) -> SqlResult<&DatabaseDescriptor> {
        self.databases
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| SqlError::AssertionFailed(format!("unknown database id {}", id.0)))
    }

    pub fn database_mut(&mut self, id: DescId) -> SqlResult<&mut DatabaseDescriptor> {
        self.databases
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| SqlError::AssertionFailed(format!("unknown database id {}", id.0)))
    }

    pub fn schema(&self, id: DescId) -> SqlResult<&SchemaDescriptor> {
        self.schemas
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| SqlError::AssertionFailed(format!("unknown schema id {}", id.0)))
    }

    pub fn schema_mut(&mut self, id: DescId) -> SqlResult<&mut SchemaDescriptor> {
        self.schemas
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| SqlError::AssertionFailed(format!("unknown schema id {}", id.0)))
    }

    pub fn schema_by_name(&self, database_id: DescId, name: &str) -> Option<&SchemaDescriptor> {
        self.schemas
            .iter()
            .find(|s| s.database_id == database_id && s.name == name)
    }

    pub fn table_by_id(&self, id: DescId) -> SqlResult<&TableDescriptor> {
        let idx = self
            .id_index
            .get(&id)
            .copied()
            .ok_or_else(|| SqlError::AssertionFailed(format!("unknown descriptor id {}", id.0)))?;
        self.tables
            .get(idx)
            .ok_or_else(|| SqlError::AssertionFailed(format!("unknown descriptor id {}", id.0)))
    }

    pub fn contains_id(&self, id: DescId) -> bool {
        self.id_index.contains_key(&id)
    }

    pub fn lookup_table(
        &self,
        database_id: DescId,
        schema_id: DescId,
        name: &str,
    ) -> Option<DescId> {
        self.name_index
            .get(&(database_id, schema_id, name.to_string()))
            .map(|idx| self.tables[*idx].id)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.iter()
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.event_log
    }

    pub fn rows_of(&self, id: DescId) -> &[Row] {
        self.rows.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Begin a transaction layered over the committed state.
    pub fn begin(&mut self) -> Transaction<'_> {
        Transaction {
            store: self,
            staged_tables: Map::default(),
            staged_schemas: Map::default(),
            staged_order: Vec::new(),
            new_ids: Vec::new(),
            staged_rows: Vec::new(),
            events: Vec::new(),
            write_seq: 0,
            read_seq: 0,
        }
    }

    fn apply_table(&mut self, desc: TableDescriptor) {
        if let Some(idx) = self.id_index.get(&desc.id).copied() {
            self.tables[idx] = desc;
        } else {
            self.tables.push(desc);
        }
        self.rebuild_indexes();
    }

    fn rebuild_indexes(&mut self) {
        self.name_index.clear();
        self.id_index.clear();
        for (idx, table) in self.tables.iter().enumerate() {
            self.name_index.insert(
                (table.parent_id, table.parent_schema_id, table.name.clone()),
                idx,
            );
            self.id_index.insert(table.id, idx);
        }
    }
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Name resolution used during FK and interleave resolution. Implementations
/// must see uncommitted, just-created descriptors, never a stale cache.
pub trait SchemaResolver {
    fn resolve_table_id(&self, database_id: DescId, name: &TableName) -> SqlResult<Option<DescId>>;
    fn table(&self, id: DescId) -> SqlResult<TableDescriptor>;
}

/// Read-own-writes overlay over the committed store. Descriptor writes,
/// rows, and audit events stage here and apply atomically on commit;
/// dropping the transaction discards everything.
pub struct Transaction<'a> {
    store: &'a mut CatalogStore,
    staged_tables: Map<DescId, TableDescriptor>,
    staged_schemas: Map<DescId, SchemaDescriptor>,
    /// Commit applies table writes in first-staged order.
    staged_order: Vec<DescId>,
    new_ids: Vec<DescId>,
    staged_rows: Vec<(DescId, Row, u64)>,
    events: Vec<EventRecord>,
    write_seq: u64,
    read_seq: u64,
}

impl Transaction<'_> {
    pub fn generate_unique_id(&mut self) -> DescId {
        self.store.generate_unique_id()
    }

    pub fn get_table(&self, id: DescId) -> SqlResult<TableDescriptor> {
        if let Some(staged) = self.staged_tables.get(&id) {
            return Ok(staged.clone());
        }
        self.store.table_by_id(id).cloned()
    }

    pub fn lookup_table(
        &self,
        database_id: DescId,
        schema_id: DescId,
        name: &str,
    ) -> Option<DescId> {
        if let Some(staged) = self.staged_tables.values().find(|t| {
            t.parent_id == database_id && t.parent_schema_id == schema_id && t.name == name
        }) {
            return Some(staged.id);
        }
        self.store.lookup_table(database_id, schema_id, name)
    }

    /// Stage a descriptor write. The first write of an id not present in the
    /// committed store marks the descriptor as created by this transaction.
    pub fn write_table(&mut self, desc: TableDescriptor) {
        let id = desc.id;
        if !self.store.contains_id(id) && !self.new_ids.contains(&id) {
            self.new_ids.push(id);
        }
        if self.staged_tables.insert(id, desc).is_none() {
            self.staged_order.push(id);
        }
    }

    /// Whether the descriptor was created inside this transaction.
    pub fn is_new(&self, id: DescId) -> bool {
        self.new_ids.contains(&id)
    }

    pub fn database(&self, id: DescId) -> SqlResult<DatabaseDescriptor> {
        self.store.database(id).cloned()
    }

    pub fn schema(&self, id: DescId) -> SqlResult<SchemaDescriptor> {
        if let Some(staged) = self.staged_schemas.get(&id) {
            return Ok(staged.clone());
        }
        self.store.schema(id).cloned()
    }

    pub fn schema_by_name(&self, database_id: DescId, name: &str) -> Option<SchemaDescriptor> {
        if let Some(staged) = self
            .staged_schemas
            .values()
            .find(|s| s.database_id == database_id && s.name == name)
        {
            return Some(staged.clone());
        }
        self.store.schema_by_name(database_id, name).cloned()
    }

    pub fn create_schema(
        &mut self,
        database_id: DescId,
        name: impl Into<String>,
        temporary: bool,
    ) -> SqlResult<DescId> {
        let name = name.into();
        if self.schema_by_name(database_id, &name).is_some() {
            return Err(SqlError::AlreadyExists {
                kind: common::ObjectKind::Schema,
                name,
            });
        }
        let id = self.generate_unique_id();
        self.staged_schemas.insert(
            id,
            SchemaDescriptor {
                id,
                database_id,
                name,
                temporary,
                create_allowed: Vec::new(),
            },
        );
        Ok(id)
    }

    pub fn record_event(&mut self, event: EventRecord) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Stage a row write at the current write sequence. Staged rows are
    /// invisible to reads until `step` advances the read sequence past them.
    pub fn insert_row(&mut self, table_id: DescId, row: Row) {
        self.staged_rows.push((table_id, row, self.write_seq));
        self.write_seq += 1;
    }

    /// Advance the read sequence to the current write position. Reads that
    /// follow observe writes staged before this call and nothing after it.
    pub fn step(&mut self) {
        self.read_seq = self.write_seq;
    }

    /// Rows of a table visible at the current read sequence.
    pub fn scan(&self, table_id: DescId) -> Vec<Row> {
        let mut rows: Vec<Row> = self.store.rows_of(table_id).to_vec();
        rows.extend(
            self.staged_rows
                .iter()
                .filter(|(id, _, seq)| *id == table_id && *seq < self.read_seq)
                .map(|(_, row, _)| row.clone()),
        );
        rows
    }

    pub fn table_is_empty(&self, table_id: DescId) -> bool {
        self.store.rows_of(table_id).is_empty()
            && !self.staged_rows.iter().any(|(id, _, _)| *id == table_id)
    }

    /// Apply all staged writes to the committed store. Descriptors that
    /// already existed get their version bumped once.
    pub fn commit(self) -> SqlResult<()> {
        let Transaction {
            store,
            mut staged_tables,
            staged_schemas,
            staged_order,
            new_ids,
            staged_rows,
            events,
            ..
        } = self;
        for id in staged_order {
            let mut desc = staged_tables
                .remove(&id)
                .ok_or_else(|| SqlError::AssertionFailed(format!("lost staged write for id {}", id.0)))?;
            if !new_ids.contains(&id) {
                desc.version += 1;
            }
            store.apply_table(desc);
        }
        for (_, schema) in staged_schemas {
            store.schemas.push(schema);
        }
        for (table_id, row, _) in staged_rows {
            store.rows.entry(table_id).or_default().push(row);
        }
        store.event_log.extend(events);
        Ok(())
    }
}

impl SchemaResolver for Transaction<'_> {
    fn resolve_table_id(&self, database_id: DescId, name: &TableName) -> SqlResult<Option<DescId>> {
        let Some(schema) = self.schema_by_name(database_id, name.schema_or_default()) else {
            return Ok(None);
        };
        Ok(self.lookup_table(database_id, schema.id, &name.table))
    }

    fn table(&self, id: DescId) -> SqlResult<TableDescriptor> {
        self.get_table(id)
    }
}
