//! Source loading
//!
//! Reads JSON documents into one uniform [`SourceTable`]. A document is either
//! an object of row objects (keyed records) or an array of row objects. Every
//! row is tagged with the document it came from and receives a contiguous
//! index across all documents.

use ecom_common::{EtlError, Result};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

/// One top-level record of a source document
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// Position in the combined table, starting at 0
    pub index: usize,
    /// Document name without its extension (`product.json` -> `product`)
    pub source: String,
    /// Key of the record when the document is an object of objects
    pub record_key: Option<String>,
    pub fields: Map<String, Value>,
}

impl SourceRow {
    /// Field value; `None` when the row does not carry the field at all
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }
}

/// Rows from every document, concatenated in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTable {
    /// Union of field names in order of first appearance
    columns: Vec<String>,
    rows: Vec<SourceRow>,
}

impl SourceTable {
    pub fn rows(&self) -> &[SourceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows tagged with the given source name
    pub fn partition<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a SourceRow> + 'a {
        self.rows.iter().filter(move |row| row.source == source)
    }

    fn push(&mut self, source: &str, record_key: Option<String>, fields: Map<String, Value>) {
        for key in fields.keys() {
            if !self.columns.iter().any(|c| c == key) {
                self.columns.push(key.clone());
            }
        }

        let index = self.rows.len();
        self.rows.push(SourceRow {
            index,
            source: source.to_string(),
            record_key,
            fields,
        });
    }
}

/// Source name for a document path: the file name cut at its first `.`
pub fn source_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    match file_name.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file_name,
    }
}

/// Load documents from disk, in the given order
pub fn load_sources<P: AsRef<Path>>(paths: &[P]) -> Result<SourceTable> {
    let mut table = SourceTable::default();

    for path in paths {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EtlError::load(path.display().to_string(), e.to_string()))?;
        append_document(&mut table, &path.display().to_string(), &source_name(path), &text)?;
    }

    info!(
        documents = paths.len(),
        rows = table.len(),
        columns = table.columns.len(),
        "Loaded source documents"
    );
    Ok(table)
}

/// Load documents already held in memory as `(file name, JSON text)` pairs
pub fn load_documents<'a, I>(documents: I) -> Result<SourceTable>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut table = SourceTable::default();
    for (name, text) in documents {
        append_document(&mut table, name, &source_name(Path::new(name)), text)?;
    }
    Ok(table)
}

fn append_document(table: &mut SourceTable, document: &str, source: &str, text: &str) -> Result<()> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| EtlError::load(document, format!("invalid JSON: {}", e)))?;

    let before = table.len();
    match value {
        Value::Array(items) => {
            for (position, item) in items.into_iter().enumerate() {
                let fields = into_record(item)
                    .ok_or_else(|| not_tabular(document, &format!("array element {}", position)))?;
                table.push(source, None, fields);
            }
        },
        Value::Object(records) => {
            for (key, item) in records {
                let fields =
                    into_record(item).ok_or_else(|| not_tabular(document, &format!("record '{}'", key)))?;
                table.push(source, Some(key), fields);
            }
        },
        other => {
            return Err(EtlError::load(
                document,
                format!("expected an object or array of records, found {}", json_kind(&other)),
            ));
        },
    }

    debug!(document, source, rows = table.len() - before, "Parsed document");
    Ok(())
}

fn into_record(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(fields) => Some(fields),
        _ => None,
    }
}

fn not_tabular(document: &str, what: &str) -> EtlError {
    EtlError::load(document, format!("{} is not an object, document is not table-like", what))
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_source_name_strips_extension() {
        assert_eq!(source_name(Path::new("product.json")), "product");
        assert_eq!(source_name(Path::new("data/orders.json")), "orders");
        assert_eq!(source_name(Path::new("./in/catalog.2024.json")), "catalog");
        assert_eq!(source_name(Path::new("noext")), "noext");
    }

    #[test]
    fn test_array_and_keyed_documents_are_concatenated() {
        let table = load_documents([
            ("a.json", r#"[{"product_id": 1}, {"product_id": 2}]"#),
            ("b.json", r#"{"x": {"product_id": 3, "extra": true}}"#),
        ])
        .unwrap();

        assert_eq!(table.len(), 3);
        let indexes: Vec<usize> = table.rows().iter().map(|r| r.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(table.rows()[0].source, "a");
        assert_eq!(table.rows()[2].source, "b");
        assert_eq!(table.rows()[2].record_key.as_deref(), Some("x"));
        assert_eq!(table.columns, vec!["product_id".to_string(), "extra".to_string()]);
    }

    #[test]
    fn test_missing_fields_read_as_absent() {
        let table = load_documents([("a.json", r#"[{"a": 1}, {"b": null}]"#)]).unwrap();
        assert_eq!(table.rows()[0].get("b"), None);
        assert_eq!(table.rows()[1].get("b"), Some(&Value::Null));
    }

    #[test]
    fn test_partition_by_source() {
        let table = load_documents([
            ("product.json", r#"[{"id": 1}, {"id": 2}]"#),
            ("customer.json", r#"[{"id": 1}]"#),
        ])
        .unwrap();
        assert_eq!(table.partition("product").count(), 2);
        assert_eq!(table.partition("customer").count(), 1);
        assert_eq!(table.partition("order").count(), 0);
    }

    #[test]
    fn test_invalid_json_is_load_error() {
        let err = load_documents([("broken.json", "{not json")]).unwrap_err();
        match err {
            EtlError::Load { document, .. } => assert_eq!(document, "broken.json"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_tabular_shapes_are_rejected() {
        assert!(matches!(
            load_documents([("n.json", "42")]).unwrap_err(),
            EtlError::Load { .. }
        ));
        assert!(matches!(
            load_documents([("a.json", "[1, 2]")]).unwrap_err(),
            EtlError::Load { .. }
        ));
        assert!(matches!(
            load_documents([("o.json", r#"{"k": "v"}"#)]).unwrap_err(),
            EtlError::Load { .. }
        ));
    }

    #[test]
    fn test_load_sources_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("product.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"[{{"product_id": 1}}]"#).unwrap();

        let table = load_sources(&[&path]).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].source, "product");

        let missing = dir.path().join("missing.json");
        assert!(matches!(load_sources(&[&missing]).unwrap_err(), EtlError::Load { .. }));
    }
}
