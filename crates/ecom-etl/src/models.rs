// Normalized entities produced from nested product documents

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::types::BigDecimal;

use crate::schema::{self, SqlValue, TableDef};

/// A product category, taken from the `category` sub-record of a product
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Category {
    pub category_id: i32,
    pub category_name: String,
}

/// One product per source row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Product {
    pub product_id: i32,
    pub product_name: String,
    pub category_id: i32,
    pub price: BigDecimal,
    pub stock_quantity: i32,
}

/// An order, flattened out of a product's `orders` array
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Order {
    pub order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub order_date: NaiveDate,
    pub customer_id: i32,
}

/// The three entity collections produced by one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub categories: Vec<Category>,
    pub products: Vec<Product>,
    pub orders: Vec<Order>,
}

/// Entity counts of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub categories: usize,
    pub products: usize,
    pub orders: usize,
}

impl NormalizedBatch {
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            categories: self.categories.len(),
            products: self.products.len(),
            orders: self.orders.len(),
        }
    }
}

/// A normalized entity that maps onto one row of one table
///
/// `values` returns the column values in the table's column order.
pub trait Record {
    fn table() -> &'static TableDef;

    fn primary_key(&self) -> i32;

    fn values(&self) -> Vec<SqlValue>;

    /// Row identity for error messages, e.g. `category_id=10`
    fn key_label(&self) -> String {
        format!("{}={}", Self::table().primary_key().name, self.primary_key())
    }
}

impl Record for Category {
    fn table() -> &'static TableDef {
        &schema::CATEGORY
    }

    fn primary_key(&self) -> i32 {
        self.category_id
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(self.category_id),
            SqlValue::Text(self.category_name.clone()),
        ]
    }
}

impl Record for Product {
    fn table() -> &'static TableDef {
        &schema::PRODUCT
    }

    fn primary_key(&self) -> i32 {
        self.product_id
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(self.product_id),
            SqlValue::Text(self.product_name.clone()),
            SqlValue::Int(self.category_id),
            SqlValue::Decimal(self.price.clone()),
            SqlValue::Int(self.stock_quantity),
        ]
    }
}

impl Record for Order {
    fn table() -> &'static TableDef {
        &schema::ORDERS
    }

    fn primary_key(&self) -> i32 {
        self.order_id
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(self.order_id),
            SqlValue::Int(self.product_id),
            SqlValue::Int(self.quantity),
            SqlValue::Date(self.order_date),
            SqlValue::Int(self.customer_id),
        ]
    }
}
