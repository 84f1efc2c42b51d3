//! Logical schema shared by every target
//!
//! The three tables are described once here; [`crate::dialect::Dialect`]
//! renders the description into each target's DDL and DML so the targets
//! cannot drift apart in column semantics.

use chrono::NaiveDate;
use ecom_common::{EtlError, Result};
use sqlx::types::BigDecimal;
use tracing::{debug, info};

use crate::target::TargetConnection;

/// Column type, independent of dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    VarChar(u16),
    Decimal { precision: u8, scale: u8 },
    Date,
}

impl ColumnType {
    /// Check that the column stores `value` unchanged
    ///
    /// MySQL's `INSERT IGNORE` truncates or clamps a value that does not fit
    /// and still reports the row as inserted, while PostgreSQL rejects it.
    /// Values are checked up front so both stores hold the same data.
    pub fn check(&self, value: &SqlValue) -> std::result::Result<(), String> {
        match (self, value) {
            (ColumnType::Int, SqlValue::Int(_)) | (ColumnType::Date, SqlValue::Date(_)) => Ok(()),
            (ColumnType::VarChar(max), SqlValue::Text(text)) => {
                let length = text.chars().count();
                if length > usize::from(*max) {
                    Err(format!("{} characters exceed VARCHAR({})", length, max))
                } else {
                    Ok(())
                }
            },
            (ColumnType::Decimal { precision, scale }, SqlValue::Decimal(number)) => {
                let number = number.normalized();
                let (_, fraction_digits) = number.as_bigint_and_exponent();
                let integer_digits = number.digits() as i64 - fraction_digits;

                if fraction_digits > i64::from(*scale) {
                    Err(format!("{} has more than {} decimal places", number, scale))
                } else if integer_digits > i64::from(precision - scale) {
                    Err(format!("{} does not fit DECIMAL({},{})", number, precision, scale))
                } else {
                    Ok(())
                }
            },
            (ty, value) => Err(format!("{:?} column cannot hold {:?}", ty, value)),
        }
    }
}

/// `FOREIGN KEY (column) REFERENCES table(column)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub references: Option<ForeignKey>,
}

/// A table description. The first column is the primary key.
#[derive(Debug, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    /// Entity name used in logs and error messages
    pub entity: &'static str,
    pub columns: &'static [ColumnDef],
}

impl TableDef {
    pub fn primary_key(&self) -> &ColumnDef {
        &self.columns[0]
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = (usize, &ForeignKey)> + '_ {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(position, column)| column.references.as_ref().map(|fk| (position, fk)))
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }
}

const fn column(name: &'static str, ty: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        ty,
        references: None,
    }
}

const fn reference(name: &'static str, table: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        ty: ColumnType::Int,
        references: Some(ForeignKey { table, column: name }),
    }
}

/// Category and product names
pub const NAME: ColumnType = ColumnType::VarChar(255);
/// Product prices
pub const MONEY: ColumnType = ColumnType::Decimal {
    precision: 10,
    scale: 2,
};

pub static CATEGORY: TableDef = TableDef {
    name: "Category",
    entity: "Category",
    columns: &[
        column("category_id", ColumnType::Int),
        column("category_name", NAME),
    ],
};

pub static PRODUCT: TableDef = TableDef {
    name: "Product",
    entity: "Product",
    columns: &[
        column("product_id", ColumnType::Int),
        column("product_name", NAME),
        reference("category_id", "Category"),
        column("price", MONEY),
        column("stock_quantity", ColumnType::Int),
    ],
};

pub static ORDERS: TableDef = TableDef {
    name: "Orders",
    entity: "Order",
    columns: &[
        column("order_id", ColumnType::Int),
        reference("product_id", "Product"),
        column("quantity", ColumnType::Int),
        column("order_date", ColumnType::Date),
        column("customer_id", ColumnType::Int),
    ],
};

/// Tables in dependency order: referenced tables come first
pub static TABLES: [&TableDef; 3] = [&CATEGORY, &PRODUCT, &ORDERS];

/// Lookup by table name (case-insensitive, as both stores treat it)
pub fn table_by_name(name: &str) -> Option<&'static TableDef> {
    TABLES
        .iter()
        .copied()
        .find(|table| table.name.eq_ignore_ascii_case(name))
}

/// A bound statement parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlValue {
    Int(i32),
    Text(String),
    Decimal(BigDecimal),
    Date(NaiveDate),
}

/// Ensure all tables exist on the target
///
/// Uses `CREATE TABLE IF NOT EXISTS`, so running it against an initialized
/// target is a no-op.
pub async fn initialize(conn: &mut dyn TargetConnection) -> Result<()> {
    let dialect = conn.dialect();
    let target = conn.name().to_string();

    for table in TABLES {
        let statement = dialect.create_table(table);
        conn.execute(&statement)
            .await
            .map_err(|e| EtlError::Schema {
                target: target.clone(),
                table: table.name.to_string(),
                reason: e.to_string(),
            })?;
        debug!(target_name = %target, table = table.name, "Ensured table exists");
    }

    info!(target_name = %target, dialect = %dialect, tables = TABLES.len(), "Schema initialized");
    Ok(())
}
