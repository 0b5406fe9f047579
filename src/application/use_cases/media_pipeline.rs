use image::imageops::FilterType;
use sqlx::SqliteConnection;
use std::path::{Path, PathBuf};

use crate::domain::error::{AppError, Result};
use crate::infrastructure::db::assets::AssetRepository;
use crate::infrastructure::storage;

/// Images relocated for one asset: the relative paths persisted on the
/// record plus the absolute files, which the coordinator tracks for
/// compensation if the surrounding batch rolls back.
#[derive(Debug, Default)]
pub struct RelocatedImages {
    pub relative: Vec<String>,
    pub files: Vec<PathBuf>,
}

pub struct MediaPipeline {
    media_root: PathBuf,
    max_width: u32,
    max_height: u32,
}

impl MediaPipeline {
    pub fn new(media_root: PathBuf, max_width: u32, max_height: u32) -> Self {
        Self {
            media_root,
            max_width,
            max_height,
        }
    }

    /// Move a row's staged images into the asset's media directory, resize
    /// recognized formats, then write the final relative paths back onto the
    /// record (clearing its pending-media marker). The database row already
    /// exists when this runs, so failures are logged and re-raised rather
    /// than swallowed.
    pub async fn relocate(
        &self,
        conn: &mut SqliteConnection,
        asset_id: i64,
        staged: &[PathBuf],
    ) -> Result<RelocatedImages> {
        let asset_dir = self.media_root.join(asset_id.to_string());
        storage::ensure_dir(&asset_dir).map_err(|e| {
            AppError::MediaPipeline(format!(
                "Failed to create media directory {}: {}",
                asset_dir.display(),
                e
            ))
        })?;

        let mut relocated = RelocatedImages::default();
        for source in staged {
            let final_file = match self.relocate_one(source, &asset_dir) {
                Ok(path) => path,
                Err(e) => {
                    tracing::error!(asset_id, source = %source.display(), error = %e,
                        "Image relocation failed");
                    return Err(e);
                }
            };
            let file_name = final_file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            relocated.relative.push(format!("{}/{}", asset_id, file_name));
            relocated.files.push(final_file);
        }

        if let Err(e) =
            AssetRepository::update_images(conn, asset_id, &relocated.relative).await
        {
            tracing::error!(asset_id, error = %e, "Failed to persist relocated image paths");
            return Err(e);
        }

        Ok(relocated)
    }

    fn relocate_one(&self, source: &Path, asset_dir: &Path) -> Result<PathBuf> {
        let file_name = source
            .file_name()
            .ok_or_else(|| {
                AppError::MediaPipeline(format!("Staged path {} has no file name", source.display()))
            })?
            .to_owned();
        let moved = asset_dir.join(&file_name);
        storage::move_file(source, &moved)
            .map_err(|e| AppError::MediaPipeline(e.to_string()))?;

        if storage::is_image_file(&moved) {
            self.resize(&moved)
        } else {
            // Unrecognized formats are kept as-is.
            Ok(moved)
        }
    }

    /// Aspect-preserving fit into the configured bounding box. Images already
    /// inside the box are left untouched (no upscaling); resized copies get a
    /// collision-safe name and replace the original.
    fn resize(&self, path: &Path) -> Result<PathBuf> {
        let img = image::open(path).map_err(|e| {
            AppError::MediaPipeline(format!("Failed to decode {}: {}", path.display(), e))
        })?;

        if img.width() <= self.max_width && img.height() <= self.max_height {
            return Ok(path.to_path_buf());
        }

        let resized = img.resize(self.max_width, self.max_height, FilterType::Lanczos3);

        let original_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let new_path = path.with_file_name(storage::collision_safe_name(original_name));
        resized.save(&new_path).map_err(|e| {
            AppError::MediaPipeline(format!("Failed to save {}: {}", new_path.display(), e))
        })?;
        storage::remove_file_quiet(path);

        Ok(new_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::{fields, NewAsset, PendingRecord};
    use crate::infrastructure::db::connection::init_memory_db;
    use crate::infrastructure::storage::ensure_dir;
    use image::{DynamicImage, RgbaImage};
    use std::fs;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("inventaris-test-{}", uuid::Uuid::new_v4()));
        ensure_dir(&dir).unwrap();
        dir
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(width, height));
        img.save(path).unwrap();
    }

    async fn create_asset(conn: &mut SqliteConnection, name: &str) -> i64 {
        let mut record = PendingRecord::new(1);
        record
            .fields
            .insert(fields::NAME.to_string(), name.to_string());
        record.staged_images.push(PathBuf::from("placeholder"));
        AssetRepository::create(conn, &NewAsset::from_pending(&record))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_relocate_resizes_and_updates_record() {
        let pool = init_memory_db().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let root = scratch_dir();
        let staging = root.join("staging");
        ensure_dir(&staging).unwrap();

        let staged = staging.join("1700000000000-11111-photo.png");
        write_png(&staged, 1600, 400);

        let asset_id = create_asset(&mut conn, "Ladder").await;
        let pipeline = MediaPipeline::new(root.join("media"), 800, 800);
        let relocated = pipeline
            .relocate(&mut conn, asset_id, &[staged.clone()])
            .await
            .unwrap();

        assert_eq!(relocated.relative.len(), 1);
        assert!(!staged.exists(), "staged file must not survive relocation");
        assert_eq!(relocated.files.len(), 1);
        assert!(relocated.files[0].exists());

        let resized = image::open(&relocated.files[0]).unwrap();
        assert!(resized.width() <= 800 && resized.height() <= 800);
        // Aspect ratio preserved: 1600x400 fits to 800x200.
        assert_eq!(resized.height(), 200);

        let record = AssetRepository::find_by_name(&mut conn, "Ladder")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.images, relocated.relative);
        assert!(!record.media_pending);

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_small_images_are_not_upscaled() {
        let pool = init_memory_db().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let root = scratch_dir();
        let staged = root.join("1700000000000-22222-icon.png");
        write_png(&staged, 32, 32);

        let asset_id = create_asset(&mut conn, "Icon").await;
        let pipeline = MediaPipeline::new(root.join("media"), 800, 800);
        let relocated = pipeline
            .relocate(&mut conn, asset_id, &[staged])
            .await
            .unwrap();

        let img = image::open(&relocated.files[0]).unwrap();
        assert_eq!((img.width(), img.height()), (32, 32));
        // Untouched images keep their staged name.
        assert!(relocated.relative[0].ends_with("-icon.png"));

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_non_image_files_move_without_resize() {
        let pool = init_memory_db().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let root = scratch_dir();
        let staged = root.join("1700000000000-33333-sheet.bin");
        fs::write(&staged, b"not an image").unwrap();

        let asset_id = create_asset(&mut conn, "Blob").await;
        let pipeline = MediaPipeline::new(root.join("media"), 800, 800);
        let relocated = pipeline
            .relocate(&mut conn, asset_id, &[staged])
            .await
            .unwrap();

        assert_eq!(fs::read(&relocated.files[0]).unwrap(), b"not an image");

        let _ = fs::remove_dir_all(&root);
    }
}
