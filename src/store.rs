//! Persistence for scraped nutrition records
//!
//! Records are keyed by food id and written once per successful scrape.
//! [`PgStore`] is the production backend; [`MemoryStore`] keeps everything in
//! process and is used when no database is configured.

use crate::{NutritionError, NutritionRecord};
use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, info};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NutritionStore: Send + Sync {
    /// `Ok(None)` when nothing is stored for `food_id`.
    async fn lookup(&self, food_id: &str) -> Result<Option<NutritionRecord>, NutritionError>;

    /// Insert or replace the record with the same food id.
    async fn upsert(&self, record: &NutritionRecord) -> Result<(), NutritionError>;

    async fn ping(&self) -> Result<(), NutritionError>;
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, NutritionError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("Connected to Postgres (max {} connections)", max_connections);
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), NutritionError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl NutritionStore for PgStore {
    async fn lookup(&self, food_id: &str) -> Result<Option<NutritionRecord>, NutritionError> {
        let record = sqlx::query_as::<_, NutritionRecord>(
            r#"
            SELECT food_id, food_name, serving_size, quantity, quantity_unit,
                   calories, total_fat, total_carbohydrates, dietary_fiber, protein
            FROM nutrition_data
            WHERE food_id = $1
            "#,
        )
        .bind(food_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert(&self, record: &NutritionRecord) -> Result<(), NutritionError> {
        sqlx::query(
            r#"
            INSERT INTO nutrition_data (
                food_id, food_name, serving_size, quantity, quantity_unit,
                calories, total_fat, total_carbohydrates, dietary_fiber, protein
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (food_id) DO UPDATE SET
                food_name = EXCLUDED.food_name,
                serving_size = EXCLUDED.serving_size,
                quantity = EXCLUDED.quantity,
                quantity_unit = EXCLUDED.quantity_unit,
                calories = EXCLUDED.calories,
                total_fat = EXCLUDED.total_fat,
                total_carbohydrates = EXCLUDED.total_carbohydrates,
                dietary_fiber = EXCLUDED.dietary_fiber,
                protein = EXCLUDED.protein
            "#,
        )
        .bind(&record.food_id)
        .bind(&record.food_name)
        .bind(record.serving_size)
        .bind(record.quantity)
        .bind(&record.quantity_unit)
        .bind(record.calories)
        .bind(record.total_fat)
        .bind(record.total_carbohydrates)
        .bind(record.dietary_fiber)
        .bind(record.protein)
        .execute(&self.pool)
        .await?;
        debug!(food_id = %record.food_id, "Stored nutrition record");
        Ok(())
    }

    async fn ping(&self) -> Result<(), NutritionError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// In-process store. Records live as long as the process does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, NutritionRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl NutritionStore for MemoryStore {
    async fn lookup(&self, food_id: &str) -> Result<Option<NutritionRecord>, NutritionError> {
        Ok(self.records.get(food_id).map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, record: &NutritionRecord) -> Result<(), NutritionError> {
        self.records.insert(record.food_id.clone(), record.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<(), NutritionError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(food_id: &str, calories: f64) -> NutritionRecord {
        NutritionRecord {
            food_id: food_id.to_string(),
            food_name: food_id.to_string(),
            serving_size: 100.0,
            quantity: 1.0,
            quantity_unit: "cup".to_string(),
            calories,
            total_fat: 1.0,
            total_carbohydrates: 2.0,
            dietary_fiber: 0.5,
            protein: 3.0,
        }
    }

    #[tokio::test]
    async fn test_memory_store_lookup_miss() {
        let store = MemoryStore::new();
        assert_eq!(store.lookup("apple").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_upsert_overwrites() {
        let store = MemoryStore::new();
        store.upsert(&record("apple", 52.0)).await.unwrap();
        store.upsert(&record("apple", 95.0)).await.unwrap();

        assert_eq!(store.len(), 1);
        let stored = store.lookup("apple").await.unwrap().unwrap();
        assert_eq!(stored.calories, 95.0);
        assert!(store.ping().await.is_ok());
    }
}
