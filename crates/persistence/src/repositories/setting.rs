//! Setting repository for database operations.

use sqlx::PgPool;
use std::collections::HashMap;

use domain::services::{SettingsStore, StoreError};

use crate::entities::SettingEntity;
use crate::error::with_retry;
use crate::metrics::QueryTimer;

/// Repository for the key/value settings table.
#[derive(Clone)]
pub struct SettingRepository {
    pool: PgPool,
}

impl SettingRepository {
    /// Creates a new SettingRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get every stored setting.
    pub async fn get_all(&self) -> Result<Vec<SettingEntity>, sqlx::Error> {
        let timer = QueryTimer::new("get_all_settings");
        let result = sqlx::query_as::<_, SettingEntity>(
            r#"
            SELECT key, value, updated_at
            FROM settings
            ORDER BY key
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Insert or update the given pairs in one transaction.
    pub async fn upsert(&self, entries: &[(String, String)]) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("upsert_settings");
        let mut tx = self.pool.begin().await?;

        for (key, value) in entries {
            sqlx::query(
                r#"
                INSERT INTO settings (key, value, updated_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        timer.record();
        Ok(())
    }
}

#[async_trait::async_trait]
impl SettingsStore for SettingRepository {
    async fn load_all(&self) -> Result<HashMap<String, String>, StoreError> {
        with_retry("get_all_settings", || self.get_all())
            .await
            .map(|rows| rows.into_iter().map(|s| (s.key, s.value)).collect())
    }

    async fn save(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        with_retry("upsert_settings", || self.upsert(entries)).await
    }
}
