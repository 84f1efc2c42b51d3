//! Entity normalization
//!
//! Decomposes each source row's nested `category` object and `orders` array
//! into independent Category/Product/Order collections. Pure: no I/O.
//!
//! Categories and orders are deduplicated by *full tuple*, not by primary
//! key. Two categories with the same id but different names both survive;
//! the store's primary key then keeps whichever is written first.

use chrono::NaiveDate;
use ecom_common::{EtlError, Result};
use serde_json::{Map, Value};
use sqlx::types::BigDecimal;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::models::{Category, NormalizedBatch, Order, Product};
use crate::schema::{self, ColumnType, SqlValue};
use crate::source::{json_kind, SourceRow, SourceTable};

/// Date format expected in `order_date`
pub const ORDER_DATE_FORMAT: &str = "%Y-%m-%d";

/// Build the normalized batch for every row of `table`
///
/// Fails on the first row that lacks the expected nested shape; no partial
/// batch is returned.
pub fn normalize(table: &SourceTable) -> Result<NormalizedBatch> {
    let mut categories = Vec::with_capacity(table.len());
    let mut products = Vec::with_capacity(table.len());
    let mut orders = Vec::new();

    for row in table.rows() {
        let fields = Fields::root(row);

        let category = fields.object("category")?;
        let category = Category {
            category_id: category.int("id")?,
            category_name: category.name("name")?,
        };

        products.push(Product {
            product_id: fields.int("product_id")?,
            product_name: fields.name("name")?,
            category_id: category.category_id,
            price: fields.price("price")?,
            stock_quantity: fields.int("stock_quantity")?,
        });
        categories.push(category);

        for entry in fields.array_of_objects("orders")? {
            orders.push(Order {
                order_id: entry.int("id")?,
                product_id: entry.int("product_id")?,
                quantity: entry.int("quantity")?,
                order_date: entry.date("order_date")?,
                customer_id: entry.int("customer_id")?,
            });
        }
    }

    let flattened_orders = orders.len();
    let batch = NormalizedBatch {
        categories: dedup_preserving_order(categories),
        products,
        orders: dedup_preserving_order(orders),
    };

    warn_on_key_collisions("Category", batch.categories.iter().map(|c| c.category_id));
    warn_on_key_collisions("Order", batch.orders.iter().map(|o| o.order_id));

    info!(
        rows = table.len(),
        categories = batch.categories.len(),
        products = batch.products.len(),
        orders = batch.orders.len(),
        duplicate_orders = flattened_orders - batch.orders.len(),
        "Normalized source rows"
    );
    Ok(batch)
}

/// Drop exact duplicates, keeping the first occurrence
pub fn dedup_preserving_order<T: Eq + Hash + Clone>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

fn warn_on_key_collisions(entity: &str, keys: impl Iterator<Item = i32>) {
    let mut counts: HashMap<i32, usize> = HashMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }

    for (key, count) in counts.into_iter().filter(|(_, count)| *count > 1) {
        warn!(
            entity,
            key,
            variants = count,
            "Same primary key with differing fields; only the first written row is kept by the target"
        );
    }
}

/// Typed access to one JSON object inside a source row, tracking the field
/// path for error messages
struct Fields<'a> {
    row: &'a SourceRow,
    map: &'a Map<String, Value>,
    path: String,
}

impl<'a> Fields<'a> {
    fn root(row: &'a SourceRow) -> Self {
        Self {
            row,
            map: &row.fields,
            path: String::new(),
        }
    }

    fn path_of(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    fn mismatch(&self, field: &str, reason: impl Into<String>) -> EtlError {
        EtlError::schema_mismatch(self.row.index, self.row.source.clone(), field, reason)
    }

    fn value(&self, key: &str) -> Result<&'a Value> {
        match self.map.get(key) {
            None => Err(self.mismatch(&self.path_of(key), "missing field")),
            Some(Value::Null) => Err(self.mismatch(&self.path_of(key), "field is null")),
            Some(value) => Ok(value),
        }
    }

    fn wrong_type(&self, key: &str, expected: &str, found: &Value) -> EtlError {
        self.mismatch(
            &self.path_of(key),
            format!("expected {}, found {}", expected, json_kind(found)),
        )
    }

    fn object(&self, key: &str) -> Result<Fields<'a>> {
        match self.value(key)? {
            Value::Object(map) => Ok(Fields {
                row: self.row,
                map,
                path: self.path_of(key),
            }),
            other => Err(self.wrong_type(key, "object", other)),
        }
    }

    fn array_of_objects(&self, key: &str) -> Result<Vec<Fields<'a>>> {
        let items = match self.value(key)? {
            Value::Array(items) => items,
            other => return Err(self.wrong_type(key, "array", other)),
        };

        items
            .iter()
            .enumerate()
            .map(|(position, item)| {
                let path = format!("{}[{}]", self.path_of(key), position);
                match item {
                    Value::Object(map) => Ok(Fields {
                        row: self.row,
                        map,
                        path,
                    }),
                    other => Err(self.mismatch(
                        &path,
                        format!("expected object, found {}", json_kind(other)),
                    )),
                }
            })
            .collect()
    }

    fn int(&self, key: &str) -> Result<i32> {
        let value = self.value(key)?;
        let wide = match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            _ => None,
        }
        .ok_or_else(|| self.wrong_type(key, "integer", value))?;

        i32::try_from(wide)
            .map_err(|_| self.mismatch(&self.path_of(key), format!("{} is out of range for INT", wide)))
    }

    fn string(&self, key: &str) -> Result<String> {
        match self.value(key)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(self.wrong_type(key, "string", other)),
        }
    }

    fn decimal(&self, key: &str) -> Result<BigDecimal> {
        let text = match self.value(key)? {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.trim().to_string(),
            other => return Err(self.wrong_type(key, "number", other)),
        };

        BigDecimal::from_str(&text)
            .map_err(|e| self.mismatch(&self.path_of(key), format!("invalid decimal '{}': {}", text, e)))
    }

    /// Reject values the target column would truncate or round
    fn fits(&self, key: &str, ty: ColumnType, value: &SqlValue) -> Result<()> {
        ty.check(value)
            .map_err(|reason| self.mismatch(&self.path_of(key), reason))
    }

    fn name(&self, key: &str) -> Result<String> {
        let name = self.string(key)?;
        self.fits(key, schema::NAME, &SqlValue::Text(name.clone()))?;
        Ok(name)
    }

    fn price(&self, key: &str) -> Result<BigDecimal> {
        let price = self.decimal(key)?;
        self.fits(key, schema::MONEY, &SqlValue::Decimal(price.clone()))?;
        Ok(price)
    }

    fn date(&self, key: &str) -> Result<NaiveDate> {
        let text = self.string(key)?;
        NaiveDate::parse_from_str(&text, ORDER_DATE_FORMAT).map_err(|e| {
            self.mismatch(&self.path_of(key), format!("invalid date '{}': {}", text, e))
        })
    }
}

/// Number of orders referencing a product that is not part of the batch
///
/// Such orders are kept; the target's foreign key decides their fate.
pub fn foreign_orders(batch: &NormalizedBatch) -> usize {
    let products: HashSet<i32> = batch.products.iter().map(|p| p.product_id).collect();
    let unmatched = batch
        .orders
        .iter()
        .filter(|order| !products.contains(&order.product_id))
        .count();
    if unmatched > 0 {
        debug!(unmatched, "Orders reference products outside this batch");
    }
    unmatched
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::source::load_documents;

    const LAPTOP: &str = r#"[{
        "product_id": 1,
        "name": "Laptop",
        "category": {"id": 10, "name": "Electronics"},
        "price": 999.99,
        "stock_quantity": 5,
        "orders": [
            {"id": 100, "product_id": 1, "quantity": 2, "order_date": "2024-01-01", "customer_id": 7}
        ]
    }]"#;

    fn normalize_json(json: &str) -> Result<NormalizedBatch> {
        normalize(&load_documents([("products.json", json)]).unwrap())
    }

    #[test]
    fn test_laptop_scenario() {
        let batch = normalize_json(LAPTOP).unwrap();

        assert_eq!(
            batch.categories,
            vec![Category {
                category_id: 10,
                category_name: "Electronics".to_string()
            }]
        );
        assert_eq!(
            batch.products,
            vec![Product {
                product_id: 1,
                product_name: "Laptop".to_string(),
                category_id: 10,
                price: BigDecimal::from_str("999.99").unwrap(),
                stock_quantity: 5,
            }]
        );
        assert_eq!(
            batch.orders,
            vec![Order {
                order_id: 100,
                product_id: 1,
                quantity: 2,
                order_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                customer_id: 7,
            }]
        );
    }

    #[test]
    fn test_identical_categories_collapse() {
        let batch = normalize_json(
            r#"[
            {"product_id": 1, "name": "A", "category": {"id": 1, "name": "Books"}, "price": 1, "stock_quantity": 1, "orders": []},
            {"product_id": 2, "name": "B", "category": {"id": 1, "name": "Books"}, "price": 2, "stock_quantity": 1, "orders": []}
        ]"#,
        )
        .unwrap();

        assert_eq!(batch.categories.len(), 1);
        assert_eq!(batch.products.len(), 2);
    }

    #[test]
    fn test_category_dedup_is_by_full_tuple_not_key() {
        let batch = normalize_json(
            r#"[
            {"product_id": 1, "name": "A", "category": {"id": 1, "name": "Books"}, "price": 1, "stock_quantity": 1, "orders": []},
            {"product_id": 2, "name": "B", "category": {"id": 1, "name": "Novels"}, "price": 2, "stock_quantity": 1, "orders": []}
        ]"#,
        )
        .unwrap();

        // Key-based dedup would keep one row here
        assert_eq!(batch.categories.len(), 2);
        assert_eq!(batch.categories[0].category_name, "Books");
        assert_eq!(batch.categories[1].category_name, "Novels");
    }

    #[test]
    fn test_orders_flattened_and_deduplicated() {
        let batch = normalize_json(
            r#"[
            {"product_id": 1, "name": "A", "category": {"id": 1, "name": "C"}, "price": 1, "stock_quantity": 1,
             "orders": [
                {"id": 1, "product_id": 1, "quantity": 1, "order_date": "2024-02-01", "customer_id": 1},
                {"id": 2, "product_id": 1, "quantity": 3, "order_date": "2024-02-02", "customer_id": 2}
             ]},
            {"product_id": 2, "name": "B", "category": {"id": 1, "name": "C"}, "price": 2, "stock_quantity": 1,
             "orders": [
                {"id": 1, "product_id": 1, "quantity": 1, "order_date": "2024-02-01", "customer_id": 1},
                {"id": 3, "product_id": 2, "quantity": 1, "order_date": "2024-02-03", "customer_id": 1}
             ]}
        ]"#,
        )
        .unwrap();

        let ids: Vec<i32> = batch.orders.iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_order_for_other_product_is_accepted() {
        let table = load_documents([(
            "p.json",
            r#"[{"product_id": 1, "name": "A", "category": {"id": 1, "name": "C"}, "price": 1, "stock_quantity": 1,
                 "orders": [{"id": 9, "product_id": 42, "quantity": 1, "order_date": "2024-02-01", "customer_id": 1}]}]"#,
        )])
        .unwrap();
        let batch = normalize(&table).unwrap();
        assert_eq!(batch.orders[0].product_id, 42);
        assert_eq!(foreign_orders(&batch), 1);
    }

    #[test]
    fn test_missing_category_names_row() {
        let err = normalize_json(
            r#"[
            {"product_id": 1, "name": "A", "category": {"id": 1, "name": "C"}, "price": 1, "stock_quantity": 1, "orders": []},
            {"product_id": 2, "name": "B", "price": 2, "stock_quantity": 1, "orders": []}
        ]"#,
        )
        .unwrap_err();

        match err {
            EtlError::SchemaMismatch {
                row,
                source_name,
                field,
                ..
            } => {
                assert_eq!(row, 1);
                assert_eq!(source_name, "products");
                assert_eq!(field, "category");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bad_nested_order_field_reports_path() {
        let err = normalize_json(
            r#"[{"product_id": 1, "name": "A", "category": {"id": 1, "name": "C"}, "price": 1, "stock_quantity": 1,
                 "orders": [
                    {"id": 1, "product_id": 1, "quantity": 1, "order_date": "2024-02-01", "customer_id": 1},
                    {"id": 2, "product_id": 1, "quantity": 1, "order_date": "yesterday", "customer_id": 1}
                 ]}]"#,
        )
        .unwrap_err();

        match err {
            EtlError::SchemaMismatch { field, .. } => assert_eq!(field, "orders[1].order_date"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_type_and_range_checks() {
        let err = normalize_json(
            r#"[{"product_id": "one", "name": "A", "category": {"id": 1, "name": "C"}, "price": 1, "stock_quantity": 1, "orders": []}]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected integer, found string"));

        let err = normalize_json(
            r#"[{"product_id": 1, "name": "A", "category": {"id": 3000000000, "name": "C"}, "price": 1, "stock_quantity": 1, "orders": []}]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let err = normalize_json(
            r#"[{"product_id": 1, "name": "A", "category": {"id": 1, "name": "C"}, "price": 1, "stock_quantity": 1, "orders": {}}]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected array, found object"));
    }

    #[test]
    fn test_price_accepts_numeric_string() {
        let batch = normalize_json(
            r#"[{"product_id": 1, "name": "A", "category": {"id": 1, "name": "C"}, "price": "19.90", "stock_quantity": 1, "orders": []}]"#,
        )
        .unwrap();
        assert_eq!(batch.products[0].price, BigDecimal::from_str("19.9").unwrap());
    }

    fn product_json(name: &str, price: &str) -> String {
        format!(
            r#"[{{"product_id": 1, "name": "{}", "category": {{"id": 1, "name": "C"}}, "price": {}, "stock_quantity": 1, "orders": []}}]"#,
            name, price
        )
    }

    #[test]
    fn test_overlong_name_is_rejected() {
        assert!(normalize_json(&product_json(&"n".repeat(255), "1")).is_ok());

        let err = normalize_json(&product_json(&"n".repeat(256), "1")).unwrap_err();
        match err {
            EtlError::SchemaMismatch { row, field, reason, .. } => {
                assert_eq!(row, 0);
                assert_eq!(field, "name");
                assert!(reason.contains("VARCHAR(255)"));
            },
            other => panic!("unexpected error: {other:?}"),
        }

        let long_category = LAPTOP.replace("Electronics", &"e".repeat(300));
        let err = normalize_json(&long_category).unwrap_err();
        assert!(matches!(err, EtlError::SchemaMismatch { ref field, .. } if field == "category.name"));
    }

    #[test]
    fn test_price_must_fit_money_column() {
        assert!(normalize_json(&product_json("A", "99999999.99")).is_ok());

        for price in ["100000000", "1e9", "0.125"] {
            let err = normalize_json(&product_json("A", price)).unwrap_err();
            assert!(
                matches!(err, EtlError::SchemaMismatch { ref field, .. } if field == "price"),
                "{price}: {err:?}"
            );
        }
    }

    #[test]
    fn test_dedup_preserving_order() {
        assert_eq!(dedup_preserving_order(vec![3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }
}
