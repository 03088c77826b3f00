//! Command implementations.
//!
//! Each command loads the catalog fixture, runs one engine operation and
//! returns a serializable report; rendering lives in [`crate::output`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use partprune_core::catalog::ReadOnlyTransaction;
use partprune_core::{
    AccessSpec, AttrId, Catalog, ClassId, DbType, DbValue, HeapFileId, InMemoryCatalog, IndexId,
    IndexScan, PartitionBounds, PartitionDescriptor, PartitionExpression, PartitionKind,
    PartitionPruner, PlacementTarget, Predicate, PruneConfig, Record, ReprId, Row,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// One partition of a table listing.
#[derive(Debug, Serialize)]
pub struct PartitionRow {
    pub class_id: ClassId,
    pub name: String,
    pub heap_id: HeapFileId,
    pub repr_id: ReprId,
    pub bounds: String,
}

/// Output of `partitions`.
#[derive(Debug, Serialize)]
pub struct PartitionsReport {
    pub table: String,
    pub class_id: ClassId,
    pub kind: Option<PartitionKind>,
    pub key: Option<AttrId>,
    pub domain: Option<DbType>,
    pub partitions: Vec<PartitionRow>,
}

/// Arguments of `prune`.
#[derive(Debug, Default)]
pub struct PruneRequest {
    pub table: String,
    pub predicate: Option<String>,
    pub index: Option<String>,
    pub params: Option<String>,
}

/// A partition selected by `prune`.
#[derive(Debug, Serialize)]
pub struct SelectedPartition {
    pub class_id: ClassId,
    pub name: String,
    pub heap_id: HeapFileId,
    pub index_id: Option<IndexId>,
}

/// Output of `prune`.
#[derive(Debug, Serialize)]
pub struct PruneReport {
    pub table: String,
    pub class_id: ClassId,
    pub total: usize,
    pub selected: Vec<SelectedPartition>,
}

/// Output of `place`.
#[derive(Debug, Serialize)]
pub struct PlacementReport {
    pub table: String,
    pub class_id: ClassId,
    pub update: bool,
    pub target: Option<PlacementTarget>,
    pub partition: Option<String>,
    pub repr_changed: bool,
}

/// Reads an inline JSON argument, or the file it names when prefixed with `@`.
fn read_json<T: DeserializeOwned>(arg: &str, what: &str) -> Result<T> {
    let text = match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {what} from {path}"))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&text).with_context(|| format!("Invalid {what} JSON"))
}

fn open_catalog(path: &Path) -> Result<Arc<InMemoryCatalog>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog {}", path.display()))?;
    let catalog = InMemoryCatalog::from_json(&json)
        .with_context(|| format!("Invalid catalog {}", path.display()))?;
    Ok(Arc::new(catalog))
}

/// Resolves a class given by name or numeric id.
fn resolve_class(catalog: &InMemoryCatalog, table: &str) -> Result<ClassId> {
    if let Ok(id) = table.parse::<u64>() {
        let class = ClassId(id);
        if catalog.class_name(class).is_some() {
            return Ok(class);
        }
    }
    match catalog.class_by_name(table) {
        Some(class) => Ok(class),
        None => bail!("Unknown table: {}", table),
    }
}

fn pruner(config: &PruneConfig, catalog: &Arc<InMemoryCatalog>) -> Result<PartitionPruner> {
    Ok(PartitionPruner::new(catalog.clone(), config.clone())?)
}

fn class_name(catalog: &InMemoryCatalog, class: ClassId) -> String {
    catalog
        .class_name(class)
        .unwrap_or_else(|| class.to_string())
}

pub fn render_bounds(bounds: &PartitionBounds) -> String {
    let render = |value: &Option<DbValue>, unbounded: &str| {
        value
            .as_ref()
            .map_or_else(|| unbounded.to_string(), ToString::to_string)
    };
    match bounds {
        PartitionBounds::Master { .. } => "-".to_string(),
        PartitionBounds::Range { min, max } => {
            format!("[{}, {})", render(min, "MINVALUE"), render(max, "MAXVALUE"))
        }
        PartitionBounds::List { values } => {
            let values: Vec<String> = values.iter().map(ToString::to_string).collect();
            format!("({})", values.join(", "))
        }
        PartitionBounds::Hash => "-".to_string(),
    }
}

/// `partitions`: descriptor list of a table.
pub fn partitions(config: &PruneConfig, catalog_path: &Path, table: &str) -> Result<PartitionsReport> {
    let catalog = open_catalog(catalog_path)?;
    let class = resolve_class(&catalog, table)?;
    let descriptors = pruner(config, &catalog)?.get_partitions(&ReadOnlyTransaction, class)?;

    let expression = descriptors
        .first()
        .and_then(PartitionDescriptor::expression_stream)
        .map(PartitionExpression::decode)
        .transpose()?;
    let partitions = descriptors
        .iter()
        .skip(1)
        .map(|p| PartitionRow {
            class_id: p.class_id,
            name: class_name(&catalog, p.class_id),
            heap_id: p.heap_id,
            repr_id: p.repr_id,
            bounds: render_bounds(&p.bounds),
        })
        .collect();

    Ok(PartitionsReport {
        table: class_name(&catalog, class),
        class_id: class,
        kind: descriptors.first().map(|m| m.kind),
        key: expression.as_ref().and_then(PartitionExpression::key_attribute),
        domain: expression.as_ref().map(|e| e.domain),
        partitions,
    })
}

/// `prune`: partitions a heap or index scan must visit.
pub fn prune(config: &PruneConfig, catalog_path: &Path, request: &PruneRequest) -> Result<PruneReport> {
    let catalog = open_catalog(catalog_path)?;
    let class = resolve_class(&catalog, &request.table)?;
    let predicate: Option<Predicate> = request
        .predicate
        .as_deref()
        .map(|arg| read_json(arg, "predicate"))
        .transpose()?;
    let params: Vec<DbValue> = match request.params.as_deref() {
        Some(arg) => read_json(arg, "params")?,
        None => Vec::new(),
    };

    let mut spec = match request.index.as_deref() {
        Some(arg) => {
            let scan: IndexScan = read_json(arg, "index scan")?;
            let mut spec = AccessSpec::index_scan(class, scan);
            spec.where_pred = predicate;
            spec
        }
        None => AccessSpec::heap_scan(class, predicate),
    };

    let pruner = pruner(config, &catalog)?;
    let total = pruner.get_partition_ids(&ReadOnlyTransaction, class)?.len();
    pruner.prune_spec(&ReadOnlyTransaction, &mut spec, &params)?;
    tracing::debug!(%class, selected = spec.partitions.len(), total, "Pruned");

    Ok(PruneReport {
        table: class_name(&catalog, class),
        class_id: class,
        total,
        selected: spec
            .partitions
            .iter()
            .map(|h| SelectedPartition {
                class_id: h.class_id,
                name: class_name(&catalog, h.class_id),
                heap_id: h.heap_id,
                index_id: h.index_id,
            })
            .collect(),
    })
}

/// Parses a row given as `{"<attr id>": <value>, ...}`.
fn parse_row(arg: &str) -> Result<Row> {
    let values: BTreeMap<String, DbValue> = read_json(arg, "row")?;
    values
        .into_iter()
        .map(|(key, value)| {
            let id = key
                .parse::<u32>()
                .with_context(|| format!("Row key '{key}' is not an attribute id"))?;
            Ok((AttrId(id), value))
        })
        .collect()
}

/// Representation a row read through `class` carries before placement.
fn source_repr(catalog: &InMemoryCatalog, pruner: &PartitionPruner, class: ClassId) -> Result<ReprId> {
    let root = catalog.superclasses(class)?.first().copied().unwrap_or(class);
    let descriptors = pruner.get_partitions(&ReadOnlyTransaction, root)?;
    Ok(descriptors
        .iter()
        .find(|d| d.class_id == class)
        .map_or(ReprId(0), |d| d.repr_id))
}

/// `place`: partition a written row belongs to.
pub fn place(
    config: &PruneConfig,
    catalog_path: &Path,
    table: &str,
    row: &str,
    update: bool,
) -> Result<PlacementReport> {
    let catalog = open_catalog(catalog_path)?;
    let class = resolve_class(&catalog, table)?;
    let row = parse_row(row)?;
    let pruner = pruner(config, &catalog)?;

    let repr = source_repr(&catalog, &pruner, class)?;
    let mut record = Record::encode(&row, repr)?;
    let target = if update {
        pruner.prune_update(&ReadOnlyTransaction, class, &mut record)?
    } else {
        pruner.prune_insert(&ReadOnlyTransaction, class, &mut record)?
    };

    Ok(PlacementReport {
        table: class_name(&catalog, class),
        class_id: class,
        update,
        partition: target.map(|t| class_name(&catalog, t.class_id)),
        target,
        repr_changed: record.repr_id != repr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_bounds() {
        let range = PartitionBounds::Range {
            min: None,
            max: Some(DbValue::Int(10)),
        };
        let list = PartitionBounds::List {
            values: vec![DbValue::from("eu"), DbValue::Null],
        };

        assert_eq!(render_bounds(&range), "[MINVALUE, 10)");
        assert_eq!(render_bounds(&list), "('eu', NULL)");
        assert_eq!(render_bounds(&PartitionBounds::Hash), "-");
    }

    #[test]
    fn test_parse_row() {
        let row = parse_row(r#"{"1": {"int": 5}, "2": "null"}"#).expect("row");

        assert_eq!(row.get(&AttrId(1)), Some(&DbValue::Int(5)));
        assert_eq!(row.get(&AttrId(2)), Some(&DbValue::Null));
    }

    #[test]
    fn test_parse_row_rejects_names() {
        assert!(parse_row(r#"{"region": {"string": "eu"}}"#).is_err());
    }

    #[test]
    fn test_read_json_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("params.json");
        fs::write(&path, r#"[{"int": 3}]"#).expect("write");

        let params: Vec<DbValue> =
            read_json(&format!("@{}", path.display()), "params").expect("params");

        assert_eq!(params, vec![DbValue::Int(3)]);
    }
}
