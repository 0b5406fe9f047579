use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;

use crate::domain::error::{AppError, Result};

pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_name(conn: &mut SqliteConnection, name: &str) -> Result<Option<i64>> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM categories WHERE name = ?")
            .bind(name)
            .fetch_optional(conn)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to look up category", e))
    }

    /// Find-or-create in one step. `INSERT OR IGNORE` rides on the UNIQUE
    /// constraint so two jobs racing on the same new value converge on one
    /// row instead of duplicating it.
    pub async fn find_or_create(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
        sqlx::query("INSERT OR IGNORE INTO categories (name) VALUES (?)")
            .bind(name)
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to create category", e))?;

        Self::find_by_name(conn, name)
            .await?
            .ok_or_else(|| AppError::Store(format!("Category {} vanished after insert", name)))
    }

    /// Resolve every value to an id inside one transaction, committed
    /// independently of the row batches so reference records persist even if
    /// a later batch fails.
    pub async fn find_or_create_all(&self, names: &[String]) -> Result<HashMap<String, i64>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::from_sqlx("Failed to begin reference transaction", e))?;

        let mut ids = HashMap::with_capacity(names.len());
        for name in names {
            let id = Self::find_or_create(&mut *tx, name).await?;
            ids.insert(name.clone(), id);
        }

        tx.commit()
            .await
            .map_err(|e| AppError::from_sqlx("Failed to commit reference transaction", e))?;

        Ok(ids)
    }
}
