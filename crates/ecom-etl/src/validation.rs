//! Source contract validation
//!
//! Checks one source partition of a [`SourceTable`] against a
//! [`TableContract`]: every contract column exists and has a value in every
//! row, the key column is unique, and values have the declared type. Validation never fails early; every violation is collected into a
//! [`ValidationReport`].

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::normalize::ORDER_DATE_FORMAT;
use crate::source::{json_kind, SourceTable};

/// Expected JSON type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Whole number (integral floats such as `3.0` are accepted)
    Integer,
    String,
    /// Any number
    Float,
    /// `YYYY-MM-DD` string
    Date,
    Object,
    Array,
}

impl FieldType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Integer => match value {
                Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
                _ => false,
            },
            FieldType::String => value.is_string(),
            FieldType::Float => value.is_number(),
            FieldType::Date => value
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s, ORDER_DATE_FORMAT).is_ok()),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Integer => "integer",
            FieldType::String => "string",
            FieldType::Float => "float",
            FieldType::Date => "date",
            FieldType::Object => "object",
            FieldType::Array => "array",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnContract {
    pub name: String,
    pub ty: FieldType,
}

/// Expected shape of one source partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableContract {
    /// Source name the contract applies to (`product.json` -> `product`)
    pub source: String,
    pub columns: Vec<ColumnContract>,
    /// Column whose values must be unique across the partition
    pub unique_key: Option<String>,
}

impl TableContract {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            columns: Vec::new(),
            unique_key: None,
        }
    }

    /// A column that must be present and non-null in every row
    pub fn required(mut self, name: &str, ty: FieldType) -> Self {
        self.columns.push(ColumnContract {
            name: name.to_string(),
            ty,
        });
        self
    }

    pub fn unique(mut self, name: &str) -> Self {
        self.unique_key = Some(name.to_string());
        self
    }

    /// Same contract, applied to another source partition
    pub fn for_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Flat product rows: `product_id`, `product_name`, `price`
pub fn product_contract() -> TableContract {
    TableContract::new("product")
        .required("product_id", FieldType::Integer)
        .required("product_name", FieldType::String)
        .required("price", FieldType::Float)
        .unique("product_id")
}

pub fn customer_contract() -> TableContract {
    TableContract::new("customer")
        .required("customer_id", FieldType::Integer)
        .required("customer_name", FieldType::String)
        .required("email", FieldType::String)
        .unique("customer_id")
}

pub fn order_contract() -> TableContract {
    TableContract::new("order")
        .required("order_id", FieldType::Integer)
        .required("customer_id", FieldType::Integer)
        .required("product_id", FieldType::Integer)
        .required("quantity", FieldType::Integer)
        .required("order_date", FieldType::Date)
        .unique("order_id")
}

/// Nested product rows as consumed by the normalizer
pub fn nested_product_contract() -> TableContract {
    TableContract::new("products")
        .required("product_id", FieldType::Integer)
        .required("name", FieldType::String)
        .required("price", FieldType::Float)
        .required("stock_quantity", FieldType::Integer)
        .required("category", FieldType::Object)
        .required("orders", FieldType::Array)
        .unique("product_id")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// The partition has no rows at all
    EmptySource,
    /// No row of the partition carries the column
    MissingColumn,
    NullValue,
    DuplicateKey { first_row: usize },
    TypeMismatch { expected: FieldType, found: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    #[serde(flatten)]
    pub kind: ViolationKind,
    pub column: Option<String>,
    /// Row index in the combined table
    pub row: Option<usize>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let column = self.column.as_deref().unwrap_or("-");
        let location = match self.row {
            Some(row) => format!("row {}", row),
            None => "all rows".to_string(),
        };

        match &self.kind {
            ViolationKind::EmptySource => write!(f, "source has no rows"),
            ViolationKind::MissingColumn => write!(f, "column '{}' is missing", column),
            ViolationKind::NullValue => write!(f, "{}: '{}' is null", location, column),
            ViolationKind::DuplicateKey { first_row } => {
                write!(f, "{}: '{}' duplicates row {}", location, column, first_row)
            },
            ViolationKind::TypeMismatch { expected, found } => {
                write!(f, "{}: '{}' expected {}, found {}", location, column, expected, found)
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub source: String,
    pub rows: usize,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check the rows of `contract.source` against the contract
pub fn validate(table: &SourceTable, contract: &TableContract) -> ValidationReport {
    let rows: Vec<_> = table.partition(&contract.source).collect();
    let mut violations = Vec::new();

    if rows.is_empty() {
        violations.push(Violation {
            kind: ViolationKind::EmptySource,
            column: None,
            row: None,
        });
    }

    for column in &contract.columns {
        if !rows.is_empty() && !rows.iter().any(|row| row.get(&column.name).is_some()) {
            violations.push(Violation {
                kind: ViolationKind::MissingColumn,
                column: Some(column.name.clone()),
                row: None,
            });
            continue;
        }

        for row in &rows {
            match row.get(&column.name) {
                None | Some(Value::Null) => violations.push(Violation {
                    kind: ViolationKind::NullValue,
                    column: Some(column.name.clone()),
                    row: Some(row.index),
                }),
                Some(value) if !column.ty.accepts(value) => violations.push(Violation {
                    kind: ViolationKind::TypeMismatch {
                        expected: column.ty,
                        found: json_kind(value).to_string(),
                    },
                    column: Some(column.name.clone()),
                    row: Some(row.index),
                }),
                Some(_) => {},
            }
        }
    }

    if let Some(key) = &contract.unique_key {
        let mut seen: HashMap<String, usize> = HashMap::new();
        for row in &rows {
            let Some(value) = row.get(key).filter(|v| !v.is_null()) else {
                continue;
            };
            if let Some(first_row) = seen.get(&value.to_string()) {
                violations.push(Violation {
                    kind: ViolationKind::DuplicateKey {
                        first_row: *first_row,
                    },
                    column: Some(key.clone()),
                    row: Some(row.index),
                });
            } else {
                seen.insert(value.to_string(), row.index);
            }
        }
    }

    for violation in &violations {
        debug!(source = %contract.source, %violation, "Contract violation");
    }
    info!(
        source = %contract.source,
        rows = rows.len(),
        violations = violations.len(),
        "Validated source"
    );

    ValidationReport {
        source: contract.source.clone(),
        rows: rows.len(),
        violations,
    }
}
