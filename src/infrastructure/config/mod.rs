use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::error::{AppError, Result};
use crate::domain::import::{DEFAULT_BATCH_SIZE, DEFAULT_IMAGE_MAX_HEIGHT, DEFAULT_IMAGE_MAX_WIDTH};

/// Deployment-level settings for the import pipeline. Defaults are layered
/// under `inventaris.toml` and `INVENTARIS_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Root directory for both the staging area and the final media tree.
    pub upload_dir: PathBuf,
    /// Subdirectory of `upload_dir` where relocated images end up.
    pub media_subdir: String,
    pub batch_size: usize,
    pub image_max_width: u32,
    pub image_max_height: u32,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            media_subdir: "media".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            image_max_width: DEFAULT_IMAGE_MAX_WIDTH,
            image_max_height: DEFAULT_IMAGE_MAX_HEIGHT,
        }
    }
}

impl ImportConfig {
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Figment::from(Serialized::defaults(ImportConfig::default()))
            .merge(Toml::file("inventaris.toml"))
            .merge(Env::prefixed("INVENTARIS_"))
            .extract()
            .map_err(|e| AppError::Config(e.to_string()))
    }

    /// Staging area for one job, namespaced so concurrent jobs cannot
    /// collide on file names.
    pub fn staging_dir(&self, job_id: &str) -> PathBuf {
        self.upload_dir.join("staging").join(job_id)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.upload_dir.join(&self.media_subdir)
    }

    pub fn with_upload_dir(mut self, upload_dir: &Path) -> Self {
        self.upload_dir = upload_dir.to_path_buf();
        self
    }
}
