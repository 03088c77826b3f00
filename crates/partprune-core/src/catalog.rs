//! Catalog and transaction collaborators.
//!
//! The pruning engine reads schema through [`Catalog`] and asks
//! [`TransactionView`] whether the current transaction is changing a class.
//! [`InMemoryCatalog`] implements both over plain maps and backs tests,
//! benches and the CLI.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::expr::{PartitionExpression, Row};
use crate::partition::{
    validate_partitions, AttrId, ClassId, HeapFileId, IndexId, PartitionBounds,
    PartitionDescriptor, PartitionKind, ReprId,
};
use crate::value::DbValue;

/// Stored row: representation id plus encoded attribute values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Representation the payload was written with.
    pub repr_id: ReprId,
    /// Encoded attribute values.
    pub payload: Vec<u8>,
}

impl Record {
    /// Encodes a row under `repr_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if encoding fails.
    pub fn encode(row: &Row, repr_id: ReprId) -> Result<Self> {
        let mut pairs: Vec<(AttrId, &DbValue)> = row.iter().map(|(k, v)| (*k, v)).collect();
        pairs.sort_by_key(|(k, _)| *k);
        Ok(Self {
            repr_id,
            payload: bincode::serialize(&pairs)?,
        })
    }

    /// Decodes the attribute values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the payload is corrupt.
    pub fn decode(&self) -> Result<Row> {
        let pairs: Vec<(AttrId, DbValue)> = bincode::deserialize(&self.payload)?;
        Ok(pairs.into_iter().collect())
    }
}

/// Schema and heap access needed by pruning.
pub trait Catalog: Send + Sync {
    /// Descriptor list of a root class: master entry first, then the
    /// partitions. Empty when the class is not partitioned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] for unknown classes, or a catalog
    /// error.
    fn class_partitions(&self, root: ClassId) -> Result<Vec<PartitionDescriptor>>;

    /// Direct superclasses of a class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] for unknown classes.
    fn superclasses(&self, class: ClassId) -> Result<Vec<ClassId>>;

    /// Reads the attribute values of a stored record of `class` under the
    /// schema version `repr`.
    ///
    /// Placement passes the root's representation so the partition
    /// expression sees the table-wide layout whatever partition the record
    /// was read from.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be interpreted.
    fn decode_record(&self, class: ClassId, repr: ReprId, record: &Record) -> Result<Row>;

    /// Resolves an index of `class` by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Catalog`] if the class has no such index.
    fn find_index(&self, class: ClassId, name: &str) -> Result<IndexId>;
}

/// View of the current transaction's schema changes.
pub trait TransactionView {
    /// Returns true if the transaction is modifying the schema of `class`.
    fn is_class_being_modified(&self, class: ClassId) -> bool;
}

/// Transaction that changes no schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyTransaction;

impl TransactionView for ReadOnlyTransaction {
    fn is_class_being_modified(&self, _class: ClassId) -> bool {
        false
    }
}

/// Named index of a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, shared by the root and each partition's local copy.
    pub name: String,
    /// Index identity on this class.
    pub id: IndexId,
}

/// One partition of a [`TableDef`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionDef {
    /// Partition class id.
    pub class_id: ClassId,
    /// Partition name.
    pub name: String,
    /// Heap file of the partition.
    pub heap_id: HeapFileId,
    /// Representation rows are stored with.
    pub repr_id: ReprId,
    /// Kind-specific bounds.
    pub bounds: PartitionBounds,
    /// Local indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

/// A partitioned table as written in a catalog fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    /// Root class id.
    pub class_id: ClassId,
    /// Table name.
    pub name: String,
    /// Heap file of the root class.
    pub heap_id: HeapFileId,
    /// Representation of the root class.
    pub repr_id: ReprId,
    /// Partitioning strategy.
    pub kind: PartitionKind,
    /// Partitioning expression.
    pub expression: PartitionExpression,
    /// Partitions in catalog order.
    pub partitions: Vec<PartitionDef>,
    /// Indexes of the root class.
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    /// Builds the descriptor list the catalog hands out for this table.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression cannot be encoded.
    pub fn descriptors(&self) -> Result<Vec<PartitionDescriptor>> {
        let master = PartitionDescriptor::master(
            self.class_id,
            self.heap_id,
            self.kind,
            self.expression.encode()?,
            self.repr_id,
        );
        let children = self.partitions.iter().map(|p| PartitionDescriptor {
            class_id: p.class_id,
            heap_id: p.heap_id,
            kind: self.kind,
            bounds: p.bounds.clone(),
            repr_id: p.repr_id,
        });
        Ok(std::iter::once(master).chain(children).collect())
    }
}

/// Plain class of a catalog fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    /// Class id.
    pub class_id: ClassId,
    /// Class name.
    pub name: String,
    /// Direct superclasses.
    #[serde(default)]
    pub superclasses: Vec<ClassId>,
    /// Indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

/// Serialized form of an [`InMemoryCatalog`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFixture {
    /// Partitioned tables.
    #[serde(default)]
    pub tables: Vec<TableDef>,
    /// Unpartitioned classes.
    #[serde(default)]
    pub classes: Vec<ClassDef>,
}

#[derive(Debug, Default)]
struct ClassEntry {
    name: String,
    superclasses: Vec<ClassId>,
    partitions: Vec<PartitionDescriptor>,
    indexes: Vec<IndexDef>,
}

#[derive(Debug, Default)]
struct CatalogState {
    classes: FxHashMap<ClassId, ClassEntry>,
    modified: FxHashSet<ClassId>,
}

/// Map-backed catalog with a schema-change registry.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
    partition_loads: AtomicU64,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from a fixture.
    ///
    /// # Errors
    ///
    /// Returns an error if a table violates the partitioning invariants.
    pub fn from_fixture(fixture: &CatalogFixture) -> Result<Self> {
        let catalog = Self::new();
        for class in &fixture.classes {
            catalog.add_class(class.clone());
        }
        for table in &fixture.tables {
            catalog.add_table(table)?;
        }
        Ok(catalog)
    }

    /// Parses a JSON fixture.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] for malformed JSON, or a schema error.
    pub fn from_json(json: &str) -> Result<Self> {
        let fixture: CatalogFixture =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        Self::from_fixture(&fixture)
    }

    /// Registers an unpartitioned class.
    pub fn add_class(&self, class: ClassDef) {
        self.state.write().classes.insert(
            class.class_id,
            ClassEntry {
                name: class.name,
                superclasses: class.superclasses,
                partitions: Vec::new(),
                indexes: class.indexes,
            },
        );
    }

    /// Registers a partitioned table and its partition classes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPartitionSchema`] or
    /// [`Error::TooManyPartitions`] if the descriptors are inconsistent.
    pub fn add_table(&self, table: &TableDef) -> Result<()> {
        let descriptors = table.descriptors()?;
        validate_partitions(&descriptors)?;

        let mut state = self.state.write();
        for partition in &table.partitions {
            state.classes.insert(
                partition.class_id,
                ClassEntry {
                    name: partition.name.clone(),
                    superclasses: vec![table.class_id],
                    partitions: Vec::new(),
                    indexes: partition.indexes.clone(),
                },
            );
        }
        state.classes.insert(
            table.class_id,
            ClassEntry {
                name: table.name.clone(),
                superclasses: Vec::new(),
                partitions: descriptors,
                indexes: table.indexes.clone(),
            },
        );
        Ok(())
    }

    /// Drops a class; partition classes of a dropped table stay registered.
    pub fn drop_class(&self, class: ClassId) {
        self.state.write().classes.remove(&class);
    }

    /// Looks a class up by name.
    #[must_use]
    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.state
            .read()
            .classes
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(id, _)| *id)
    }

    /// Name of a class.
    #[must_use]
    pub fn class_name(&self, class: ClassId) -> Option<String> {
        self.state.read().classes.get(&class).map(|e| e.name.clone())
    }

    /// Marks `class` as under schema change by the current transaction.
    pub fn begin_schema_change(&self, class: ClassId) {
        self.state.write().modified.insert(class);
    }

    /// Clears the schema-change mark of `class`.
    pub fn end_schema_change(&self, class: ClassId) {
        self.state.write().modified.remove(&class);
    }

    /// Number of descriptor lists read from this catalog.
    #[must_use]
    pub fn partition_loads(&self) -> u64 {
        self.partition_loads.load(Ordering::Relaxed)
    }
}

impl Catalog for InMemoryCatalog {
    fn class_partitions(&self, root: ClassId) -> Result<Vec<PartitionDescriptor>> {
        self.partition_loads.fetch_add(1, Ordering::Relaxed);
        self.state
            .read()
            .classes
            .get(&root)
            .map(|entry| entry.partitions.clone())
            .ok_or(Error::ClassNotFound(root))
    }

    fn superclasses(&self, class: ClassId) -> Result<Vec<ClassId>> {
        self.state
            .read()
            .classes
            .get(&class)
            .map(|entry| entry.superclasses.clone())
            .ok_or(Error::ClassNotFound(class))
    }

    fn decode_record(&self, class: ClassId, repr: ReprId, record: &Record) -> Result<Row> {
        if !self.state.read().classes.contains_key(&class) {
            return Err(Error::ClassNotFound(class));
        }
        // payloads are self-describing, so any stored version reads as `repr`
        if record.repr_id != repr {
            tracing::trace!(%class, stored = record.repr_id.0, as_of = repr.0, "Decoding record under another representation");
        }
        record.decode()
    }

    fn find_index(&self, class: ClassId, name: &str) -> Result<IndexId> {
        let state = self.state.read();
        let entry = state.classes.get(&class).ok_or(Error::ClassNotFound(class))?;
        entry
            .indexes
            .iter()
            .find(|index| index.name == name)
            .map(|index| index.id)
            .ok_or_else(|| Error::Catalog(format!("{class} has no index named '{name}'")))
    }
}

impl TransactionView for InMemoryCatalog {
    fn is_class_being_modified(&self, class: ClassId) -> bool {
        self.state.read().modified.contains(&class)
    }
}
