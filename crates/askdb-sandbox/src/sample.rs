//! Seeded demo warehouse.
//!
//! Builds a small retail database (products, customers, orders) so the
//! service can be tried without pointing it at real data. The generator is
//! seeded, so two runs produce identical files.

use std::path::Path;

use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::{params, Connection};
use tracing::info;

use crate::error::ExecutionError;

const SEED: u64 = 42;
const CUSTOMER_COUNT: usize = 50;
const ORDER_COUNT: usize = 200;

const REGIONS: [&str; 7] = [
    "East", "South", "North", "Central", "Southwest", "Northwest", "Northeast",
];
const LEVELS: [&str; 4] = ["Standard", "Silver", "Gold", "Diamond"];
const FIRST_NAMES: [&str; 10] = [
    "Alex", "Blake", "Casey", "Drew", "Emery", "Finley", "Gray", "Harper", "Jordan", "Kai",
];
const LAST_NAMES: [&str; 10] = [
    "Reed", "Stone", "Lane", "Park", "Wells", "Hayes", "Cole", "Frost", "Shaw", "Marsh",
];

const PRODUCTS: [(&str, &str, f64); 20] = [
    ("Smartphone", "Electronics", 3999.0),
    ("Laptop", "Electronics", 6999.0),
    ("Wireless Earbuds", "Electronics", 599.0),
    ("Tablet", "Electronics", 2999.0),
    ("Smartwatch", "Electronics", 1299.0),
    ("Sports T-Shirt", "Apparel", 129.0),
    ("Jeans", "Apparel", 259.0),
    ("Down Jacket", "Apparel", 899.0),
    ("Running Shoes", "Apparel", 499.0),
    ("Casual Coat", "Apparel", 399.0),
    ("Imported Steak", "Food", 168.0),
    ("Organic Milk", "Food", 68.0),
    ("Nut Gift Box", "Food", 128.0),
    ("Specialty Coffee", "Food", 88.0),
    ("Smart Desk Lamp", "Home", 199.0),
    ("Memory Foam Pillow", "Home", 159.0),
    ("Air Purifier", "Home", 1299.0),
    ("Programming in Python", "Books", 79.0),
    ("Hands-on Data Analysis", "Books", 69.0),
    ("Intro to AI", "Books", 59.0),
];

const SCHEMA: &str = "
CREATE TABLE products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    price REAL NOT NULL
);

CREATE TABLE customers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    region TEXT NOT NULL,
    level TEXT NOT NULL
);

CREATE TABLE orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id INTEGER NOT NULL,
    product_id INTEGER NOT NULL,
    quantity INTEGER NOT NULL,
    amount REAL NOT NULL,
    order_date TEXT NOT NULL,
    FOREIGN KEY (customer_id) REFERENCES customers(id),
    FOREIGN KEY (product_id) REFERENCES products(id)
);
";

/// Row counts of a freshly seeded warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSummary {
    pub products: usize,
    pub customers: usize,
    pub orders: usize,
}

/// Create (or recreate) the demo warehouse at `path`.
///
/// An existing file at `path` is replaced.
pub fn seed_sample_database(path: &Path) -> Result<SampleSummary, ExecutionError> {
    let storage = |e: rusqlite::Error| ExecutionError::Sql(e.to_string());

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ExecutionError::Open(e.to_string()))?;
    }
    if path.exists() {
        std::fs::remove_file(path).map_err(|e| ExecutionError::Open(e.to_string()))?;
    }

    let mut conn = Connection::open(path).map_err(|e| ExecutionError::Open(e.to_string()))?;
    conn.execute_batch(SCHEMA).map_err(storage)?;

    let mut rng = StdRng::seed_from_u64(SEED);
    let base_date = NaiveDate::from_ymd_opt(2025, 1, 1)
        .ok_or_else(|| ExecutionError::Sql("invalid base date".to_string()))?;

    let tx = conn.transaction().map_err(storage)?;
    {
        let mut insert_product = tx
            .prepare("INSERT INTO products (name, category, price) VALUES (?1, ?2, ?3)")
            .map_err(storage)?;
        for (name, category, price) in PRODUCTS {
            insert_product
                .execute(params![name, category, price])
                .map_err(storage)?;
        }

        let mut insert_customer = tx
            .prepare("INSERT INTO customers (name, region, level) VALUES (?1, ?2, ?3)")
            .map_err(storage)?;
        for i in 0..CUSTOMER_COUNT {
            let name = format!(
                "{} {}{}",
                FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())],
                LAST_NAMES[rng.random_range(0..LAST_NAMES.len())],
                i
            );
            let region = REGIONS[rng.random_range(0..REGIONS.len())];
            let level = LEVELS[rng.random_range(0..LEVELS.len())];
            insert_customer
                .execute(params![name, region, level])
                .map_err(storage)?;
        }

        let mut insert_order = tx
            .prepare(
                "INSERT INTO orders (customer_id, product_id, quantity, amount, order_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .map_err(storage)?;
        for _ in 0..ORDER_COUNT {
            let customer_id = rng.random_range(1..=CUSTOMER_COUNT as i64);
            let product_idx = rng.random_range(0..PRODUCTS.len());
            let quantity: i64 = rng.random_range(1..=5);
            let amount = ((PRODUCTS[product_idx].2 * quantity as f64) * 100.0).round() / 100.0;
            let offset: u64 = rng.random_range(0..=364);
            let order_date = base_date
                .checked_add_days(Days::new(offset))
                .unwrap_or(base_date)
                .format("%Y-%m-%d")
                .to_string();
            insert_order
                .execute(params![
                    customer_id,
                    product_idx as i64 + 1,
                    quantity,
                    amount,
                    order_date
                ])
                .map_err(storage)?;
        }
    }
    tx.commit().map_err(storage)?;

    let summary = SampleSummary {
        products: PRODUCTS.len(),
        customers: CUSTOMER_COUNT,
        orders: ORDER_COUNT,
    };
    info!(
        path = %path.display(),
        products = summary.products,
        customers = summary.customers,
        orders = summary.orders,
        "Sample warehouse initialized"
    );
    Ok(summary)
}
