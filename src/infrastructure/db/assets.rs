use sqlx::{SqliteConnection, SqlitePool};

use crate::domain::asset::{AssetRecord, NewAsset, OtherFields};
use crate::domain::error::{AppError, Result};

pub struct AssetRepository {
    pool: SqlitePool,
}

impl AssetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_name(
        conn: &mut SqliteConnection,
        name: &str,
    ) -> Result<Option<AssetRecord>> {
        sqlx::query_as::<_, AssetEntity>(
            "SELECT id, code, category_id, name, detail, specification, standard, unit,
                    quantity, note, images_json, other_fields_json, media_pending
             FROM assets WHERE name = ? LIMIT 1",
        )
        .bind(name)
        .fetch_optional(conn)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to look up asset by name", e))
        .map(|entity| entity.map(AssetRecord::from))
    }

    pub async fn create(conn: &mut SqliteConnection, asset: &NewAsset) -> Result<i64> {
        let other_fields_json = serde_json::to_string(&asset.other_fields)
            .map_err(|e| AppError::Store(format!("Failed to encode other fields: {}", e)))?;

        let result = sqlx::query(
            "INSERT INTO assets (code, category_id, name, detail, specification, standard,
                                 unit, quantity, note, other_fields_json, media_pending)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&asset.code)
        .bind(asset.category_id)
        .bind(&asset.name)
        .bind(&asset.detail)
        .bind(&asset.specification)
        .bind(&asset.standard)
        .bind(&asset.unit)
        .bind(&asset.quantity)
        .bind(&asset.note)
        .bind(other_fields_json)
        .bind(asset.media_pending as i64)
        .execute(conn)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to create asset", e))?;

        Ok(result.last_insert_rowid())
    }

    /// Second write after relocation: store the final relative paths and
    /// clear the pending-media marker in the same statement.
    pub async fn update_images(
        conn: &mut SqliteConnection,
        id: i64,
        images: &[String],
    ) -> Result<()> {
        let images_json = serde_json::to_string(images)
            .map_err(|e| AppError::Store(format!("Failed to encode image list: {}", e)))?;

        sqlx::query("UPDATE assets SET images_json = ?, media_pending = 0 WHERE id = ?")
            .bind(images_json)
            .bind(id)
            .execute(conn)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to update asset images", e))?;

        Ok(())
    }

    /// Records whose media relocation never completed (see reconciliation).
    pub async fn find_media_pending(&self) -> Result<Vec<AssetRecord>> {
        sqlx::query_as::<_, AssetEntity>(
            "SELECT id, code, category_id, name, detail, specification, standard, unit,
                    quantity, note, images_json, other_fields_json, media_pending
             FROM assets WHERE media_pending = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to query pending-media assets", e))
        .map(|entities| entities.into_iter().map(AssetRecord::from).collect())
    }

    /// Reconciliation writes run on the pool, outside any batch transaction.
    pub async fn set_images(&self, id: i64, images: &[String]) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::from_sqlx("Failed to acquire connection", e))?;
        Self::update_images(&mut conn, id, images).await
    }
}

#[derive(sqlx::FromRow)]
struct AssetEntity {
    id: i64,
    code: Option<String>,
    category_id: Option<i64>,
    name: String,
    detail: Option<String>,
    specification: Option<String>,
    standard: Option<String>,
    unit: Option<String>,
    quantity: Option<String>,
    note: Option<String>,
    images_json: String,
    other_fields_json: String,
    media_pending: i64,
}

impl From<AssetEntity> for AssetRecord {
    fn from(e: AssetEntity) -> Self {
        let images: Vec<String> = serde_json::from_str(&e.images_json).unwrap_or_default();
        let other_fields: OtherFields =
            serde_json::from_str(&e.other_fields_json).unwrap_or_default();
        Self {
            id: e.id,
            code: e.code,
            category_id: e.category_id,
            name: e.name,
            detail: e.detail,
            specification: e.specification,
            standard: e.standard,
            unit: e.unit,
            quantity: e.quantity,
            note: e.note,
            images,
            other_fields,
            media_pending: e.media_pending != 0,
        }
    }
}
