use sqlx::{SqliteConnection, SqlitePool};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::application::use_cases::media_pipeline::MediaPipeline;
use crate::application::use_cases::reference_resolver::{resolve_references, ReferenceMap};
use crate::application::use_cases::row_gate::{discard_staged_images, gate_row, GateDecision};
use crate::application::use_cases::row_materializer::materialize_row;
use crate::application::use_cases::worksheet_indexer::{index_columns, ColumnIndex};
use crate::domain::asset::{fields, NewAsset};
use crate::domain::error::{AppError, Result};
use crate::domain::import::{ImportOptions, ImportSummary, RowOutcome};
use crate::domain::worksheet::{ImageCellIndex, SheetData};
use crate::infrastructure::config::ImportConfig;
use crate::infrastructure::db::assets::AssetRepository;
use crate::infrastructure::db::categories::CategoryRepository;
use crate::infrastructure::storage;
use crate::infrastructure::workbook::{self, ParsedWorkbook};

/// Shared per-job state threaded through the batch loop.
struct JobState<'a> {
    sheet: &'a SheetData,
    index: &'a ColumnIndex,
    references: &'a ReferenceMap,
    staging_dir: &'a Path,
    media: &'a MediaPipeline,
    options: &'a ImportOptions,
}

/// Orchestrates a bulk import: one worksheet in, one transaction per batch
/// of rows, a summary out. A batch that hits a transient store error is
/// rolled back and counted; the remaining batches still run. Any other
/// error stops the job early and is reported as the summary's fatal error,
/// next to the counts of the batches that already committed.
pub struct ImportService {
    pool: SqlitePool,
    config: ImportConfig,
    cancel: Option<Arc<AtomicBool>>,
    /// (asset name, fatal) fault injection for batch-boundary tests.
    #[cfg(test)]
    fail_on_asset: Option<(String, bool)>,
}

impl ImportService {
    pub fn new(pool: SqlitePool, config: ImportConfig) -> Self {
        Self {
            pool,
            config,
            cancel: None,
            #[cfg(test)]
            fail_on_asset: None,
        }
    }

    /// Attach a flag checked between batches. Setting it stops the job at
    /// the next batch boundary; batches already committed stay committed.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn import_file(
        &self,
        path: &Path,
        options: &ImportOptions,
    ) -> Result<ImportSummary> {
        tracing::info!(path = %path.display(), "Starting import");
        let workbook = workbook::open(path)?;
        self.run_import(workbook, options).await
    }

    pub async fn run_import(
        &self,
        workbook: ParsedWorkbook,
        options: &ImportOptions,
    ) -> Result<ImportSummary> {
        options
            .validate()
            .map_err(|e| AppError::Validation(format!("Invalid import options: {}", e)))?;

        let ParsedWorkbook { sheet, mut images } = workbook;

        let index = index_columns(&options.mapping, sheet.range(), &options.required_fields)?;

        let categories = CategoryRepository::new(self.pool.clone());
        let references =
            resolve_references(&categories, &sheet, &index, fields::CATEGORY_ID).await?;

        let job_id = Uuid::new_v4().to_string();
        let staging_dir = self.config.staging_dir(&job_id);
        let media = MediaPipeline::new(
            self.config.media_dir(),
            options.image_max_width,
            options.image_max_height,
        );

        let job = JobState {
            sheet: &sheet,
            index: &index,
            references: &references,
            staging_dir: &staging_dir,
            media: &media,
            options,
        };

        let rows: Vec<u32> = sheet.range().data_rows().collect();
        let summary = self.process_batches(&job, &rows, &mut images).await;
        storage::remove_dir_quiet(&staging_dir);

        tracing::info!(
            created = summary.created,
            skipped = summary.skipped,
            rejected = summary.rejected,
            failed_batches = summary.failed_batches,
            "Import finished"
        );
        Ok(summary)
    }

    async fn process_batches(
        &self,
        job: &JobState<'_>,
        rows: &[u32],
        images: &mut ImageCellIndex,
    ) -> ImportSummary {
        let mut summary = ImportSummary::default();

        for chunk in rows.chunks(job.options.batch_size) {
            if let Some(cancel) = &self.cancel {
                if cancel.load(Ordering::Relaxed) {
                    tracing::info!("Import cancelled; committed batches are kept");
                    break;
                }
            }

            let first_row = chunk[0];
            match self.run_batch(job, chunk, images).await {
                Ok(batch) => summary.absorb(&batch),
                Err(e) if e.is_transient_store() => {
                    tracing::warn!(
                        first_row,
                        rows = chunk.len(),
                        error = %e,
                        "Batch rolled back on transient store error"
                    );
                    summary.failed_batches += 1;
                }
                Err(e) => {
                    // Committed batches stay committed, so report their
                    // counts next to the error instead of discarding them.
                    let e = e.with_context(&format!("Batch starting at row {}", first_row));
                    tracing::error!(error = %e, "Import stopped on fatal error");
                    summary.fatal_error = Some(e.to_string());
                    break;
                }
            }
        }

        summary
    }

    /// One transaction per batch. Every file the batch produced (staged or
    /// relocated) is tracked so a rollback leaves no orphans on disk.
    async fn run_batch(
        &self,
        job: &JobState<'_>,
        rows: &[u32],
        images: &mut ImageCellIndex,
    ) -> Result<ImportSummary> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::from_sqlx("Failed to begin batch transaction", e))?;

        let mut batch = ImportSummary::default();
        let mut produced: Vec<PathBuf> = Vec::new();

        for &row in rows {
            match self
                .process_row(&mut *tx, job, row, images, &mut produced)
                .await
            {
                Ok(RowOutcome::Created(_)) => batch.created += 1,
                Ok(RowOutcome::SkippedDuplicate) => batch.skipped += 1,
                Ok(RowOutcome::RejectedIncomplete) => batch.rejected += 1,
                Err(e) => {
                    let _ = tx.rollback().await;
                    for path in &produced {
                        storage::remove_file_quiet(path);
                    }
                    return Err(e);
                }
            }
        }

        if let Err(e) = tx.commit().await {
            for path in &produced {
                storage::remove_file_quiet(path);
            }
            return Err(AppError::from_sqlx("Failed to commit batch", e));
        }

        Ok(batch)
    }

    async fn process_row(
        &self,
        conn: &mut SqliteConnection,
        job: &JobState<'_>,
        row: u32,
        images: &mut ImageCellIndex,
        produced: &mut Vec<PathBuf>,
    ) -> Result<RowOutcome> {
        let record = materialize_row(
            row,
            job.sheet,
            job.index,
            job.references,
            fields::CATEGORY_ID,
            images,
            job.staging_dir,
        )?;
        produced.extend(record.staged_images.iter().cloned());

        match gate_row(conn, &record, &job.options.required_fields).await? {
            GateDecision::RejectIncomplete(field) => {
                tracing::warn!(row, field = %field, "Rejected incomplete row");
                discard_staged_images(&record);
                Ok(RowOutcome::RejectedIncomplete)
            }
            GateDecision::SkipDuplicate => {
                tracing::debug!(row, name = ?record.name(), "Skipped duplicate row");
                discard_staged_images(&record);
                Ok(RowOutcome::SkippedDuplicate)
            }
            GateDecision::Create => {
                #[cfg(test)]
                {
                    if let Some((fail_on, fatal)) = &self.fail_on_asset {
                        if record.name() == Some(fail_on.as_str()) {
                            return Err(if *fatal {
                                AppError::Store("Simulated store failure".to_string())
                            } else {
                                AppError::TransientStore("Simulated store timeout".to_string())
                            });
                        }
                    }
                }

                let id = AssetRepository::create(conn, &NewAsset::from_pending(&record)).await?;
                if !record.staged_images.is_empty() {
                    let relocated = job
                        .media
                        .relocate(conn, id, &record.staged_images)
                        .await?;
                    produced.extend(relocated.files);
                }
                tracing::debug!(row, id, "Created asset");
                Ok(RowOutcome::Created(id))
            }
        }
    }

    /// Repair pass for records whose batch committed but whose image list
    /// was never finalized (marked pending). The media directory on disk is
    /// the source of truth: whatever landed there becomes the image list,
    /// and an absent directory resolves to no images.
    pub async fn reconcile_pending_media(&self) -> Result<u64> {
        let assets = AssetRepository::new(self.pool.clone());
        let pending = assets.find_media_pending().await?;
        let mut reconciled = 0u64;

        for record in pending {
            let asset_dir = self.config.media_dir().join(record.id.to_string());
            let mut paths: Vec<String> = Vec::new();
            if asset_dir.is_dir() {
                let entries = std::fs::read_dir(&asset_dir).map_err(|e| {
                    AppError::Io(format!(
                        "Failed to read media directory {}: {}",
                        asset_dir.display(),
                        e
                    ))
                })?;
                for entry in entries {
                    let entry = entry.map_err(|e| AppError::Io(e.to_string()))?;
                    if let Some(name) = entry.file_name().to_str() {
                        paths.push(format!("{}/{}", record.id, name));
                    }
                }
                paths.sort();
            }
            tracing::info!(id = record.id, images = paths.len(), "Reconciled pending media");
            assets.set_images(record.id, &paths).await?;
            reconciled += 1;
        }

        Ok(reconciled)
    }

    #[cfg(test)]
    fn with_transient_on_asset(mut self, name: &str) -> Self {
        self.fail_on_asset = Some((name.to_string(), false));
        self
    }

    #[cfg(test)]
    fn with_fatal_on_asset(mut self, name: &str) -> Self {
        self.fail_on_asset = Some((name.to_string(), true));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::PendingRecord;
    use crate::domain::worksheet::{CellRef, ColumnMapping, ImagePayload};
    use crate::infrastructure::db::connection::init_memory_db;
    use crate::infrastructure::storage::ensure_dir;
    use crate::infrastructure::workbook::csv::parse_content;
    use std::fs;
    use std::io::Cursor;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("inventaris-test-{}", Uuid::new_v4()));
        ensure_dir(&dir).unwrap();
        dir
    }

    fn mapping() -> ColumnMapping {
        ColumnMapping::new(vec![
            ("name".to_string(), "A".to_string()),
            ("category_id".to_string(), "B".to_string()),
            ("unit".to_string(), "C".to_string()),
        ])
    }

    fn options() -> ImportOptions {
        ImportOptions::new(mapping()).with_required_fields(vec![
            "name".to_string(),
            "category_id".to_string(),
            "unit".to_string(),
        ])
    }

    fn workbook_from(content: &str) -> ParsedWorkbook {
        ParsedWorkbook {
            sheet: parse_content(content).unwrap(),
            images: ImageCellIndex::default(),
        }
    }

    async fn service_with(dir: &Path) -> (ImportService, SqlitePool) {
        let pool = init_memory_db().await.unwrap();
        let config = ImportConfig::default().with_upload_dir(dir);
        (ImportService::new(pool.clone(), config), pool)
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::new(width, height));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_import_counts_created_skipped_and_rejected_rows() {
        let dir = scratch_dir();
        let (service, pool) = service_with(&dir).await;

        let csv = "Name,Category,Unit,Remark\n\
                   Hammer,Tools,pcs,steel\n\
                   Wrench,Tools,pcs,\n\
                   Hammer,Tools,pcs,dup\n\
                   Tape,Consumables,roll,\n\
                   NoUnit,Tools,,\n\
                   ,Tools,pcs,\n\
                   Saw,Tools,pcs,\n\
                   Drill,Tools,pcs,\n\
                   Level,Tools,pcs,\n\
                   Chisel,Tools,pcs,\n";
        let opts = options().with_batch_size(5);
        let summary = service
            .run_import(workbook_from(csv), &opts)
            .await
            .unwrap();

        assert_eq!(summary.created, 7);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.failed_batches, 0);

        let mut conn = pool.acquire().await.unwrap();
        let hammer = AssetRepository::find_by_name(&mut conn, "Hammer")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            hammer.other_fields,
            vec![("Remark".to_string(), "steel".to_string())]
        );
        assert!(hammer.category_id.is_some());

        let categories: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(categories, 2);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_transient_failure_rolls_back_only_its_batch() {
        let dir = scratch_dir();
        let (service, pool) = service_with(&dir).await;
        let service = service.with_transient_on_asset("Row08");

        let mut csv = String::from("Name,Category,Unit\n");
        for n in 1..=12 {
            csv.push_str(&format!("Row{:02},Cat,pcs\n", n));
        }
        let opts = options().with_batch_size(3);
        let summary = service.run_import(workbook_from(&csv), &opts).await.unwrap();

        assert_eq!(summary.created, 9);
        assert_eq!(summary.failed_batches, 1);
        assert!(summary.fatal_error.is_none());

        let mut conn = pool.acquire().await.unwrap();
        // Row07 shared the failed batch with Row08, so its insert was undone.
        assert!(AssetRepository::find_by_name(&mut conn, "Row07")
            .await
            .unwrap()
            .is_none());
        assert!(AssetRepository::find_by_name(&mut conn, "Row06")
            .await
            .unwrap()
            .is_some());
        assert!(AssetRepository::find_by_name(&mut conn, "Row10")
            .await
            .unwrap()
            .is_some());

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_fatal_error_reports_partial_summary() {
        let dir = scratch_dir();
        let (service, pool) = service_with(&dir).await;
        let service = service.with_fatal_on_asset("Row05");

        let mut csv = String::from("Name,Category,Unit\n");
        for n in 1..=6 {
            csv.push_str(&format!("Row{:02},Cat,pcs\n", n));
        }
        let opts = options().with_batch_size(2);
        let summary = service.run_import(workbook_from(&csv), &opts).await.unwrap();

        // Two batches committed before the third blew up.
        assert_eq!(summary.created, 4);
        assert_eq!(summary.failed_batches, 0);
        let error = summary.fatal_error.unwrap();
        assert!(error.contains("Batch starting at row"), "{}", error);

        let mut conn = pool.acquire().await.unwrap();
        assert!(AssetRepository::find_by_name(&mut conn, "Row04")
            .await
            .unwrap()
            .is_some());
        assert!(AssetRepository::find_by_name(&mut conn, "Row05")
            .await
            .unwrap()
            .is_none());
        assert!(AssetRepository::find_by_name(&mut conn, "Row06")
            .await
            .unwrap()
            .is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_nameless_row_is_rejected_not_fatal() {
        let dir = scratch_dir();
        let (service, _pool) = service_with(&dir).await;

        let csv = "Name,Category,Unit\n\
                   Pliers,Tools,pcs\n\
                   ,Tools,pcs\n\
                   Vise,Tools,pcs\n";
        // The caller's required list omits the name, but a nameless row
        // still cannot be deduplicated, so it is rejected rather than
        // killing the job.
        let opts = ImportOptions::new(mapping())
            .with_required_fields(vec!["category_id".to_string(), "unit".to_string()]);
        let summary = service.run_import(workbook_from(csv), &opts).await.unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(summary.rejected, 1);
        assert!(summary.fatal_error.is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_duplicate_within_one_batch_is_skipped() {
        let dir = scratch_dir();
        let (service, _pool) = service_with(&dir).await;

        let csv = "Name,Category,Unit\n\
                   Ladder,Tools,pcs\n\
                   Ladder,Tools,pcs\n";
        let summary = service
            .run_import(workbook_from(csv), &options())
            .await
            .unwrap();

        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_embedded_images_end_up_under_the_asset_media_dir() {
        let dir = scratch_dir();
        let (service, pool) = service_with(&dir).await;

        let csv = "Name,Category,Unit,Photo\nDrill,Tools,pcs,\n";
        let mut workbook = workbook_from(csv);
        workbook.images.insert(
            CellRef::new(1, 3),
            ImagePayload {
                name: "drill".to_string(),
                extension: "png".to_string(),
                bytes: png_bytes(16, 16),
            },
        );

        let summary = service.run_import(workbook, &options()).await.unwrap();
        assert_eq!(summary.created, 1);

        let mut conn = pool.acquire().await.unwrap();
        let drill = AssetRepository::find_by_name(&mut conn, "Drill")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(drill.images.len(), 1);
        assert!(!drill.media_pending);

        let media = dir.join("media").join(drill.id.to_string());
        let files: Vec<_> = fs::read_dir(&media).unwrap().collect();
        assert_eq!(files.len(), 1);

        // The per-job staging directory is gone once the job finishes.
        let staging = dir.join("staging");
        assert!(
            !staging.exists() || fs::read_dir(&staging).unwrap().next().is_none()
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_cancel_flag_stops_before_the_first_batch() {
        let dir = scratch_dir();
        let (service, pool) = service_with(&dir).await;
        let cancel = Arc::new(AtomicBool::new(true));
        let service = service.with_cancel_flag(Arc::clone(&cancel));

        let csv = "Name,Category,Unit\nHammer,Tools,pcs\n";
        let summary = service
            .run_import(workbook_from(csv), &options())
            .await
            .unwrap();

        assert_eq!(summary, ImportSummary::default());
        let mut conn = pool.acquire().await.unwrap();
        assert!(AssetRepository::find_by_name(&mut conn, "Hammer")
            .await
            .unwrap()
            .is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_reconcile_adopts_files_on_disk_and_clears_the_marker() {
        let dir = scratch_dir();
        let (service, pool) = service_with(&dir).await;
        let mut conn = pool.acquire().await.unwrap();

        let mut record = PendingRecord::new(1);
        record
            .fields
            .insert(fields::NAME.to_string(), "Crane".to_string());
        record.staged_images.push(PathBuf::from("placeholder"));
        let with_files = AssetRepository::create(&mut conn, &NewAsset::from_pending(&record))
            .await
            .unwrap();

        record
            .fields
            .insert(fields::NAME.to_string(), "Hoist".to_string());
        let without_files = AssetRepository::create(&mut conn, &NewAsset::from_pending(&record))
            .await
            .unwrap();
        drop(conn);

        let media = dir.join("media").join(with_files.to_string());
        ensure_dir(&media).unwrap();
        fs::write(media.join("crane.png"), b"png").unwrap();

        let reconciled = service.reconcile_pending_media().await.unwrap();
        assert_eq!(reconciled, 2);

        let mut conn = pool.acquire().await.unwrap();
        let crane = AssetRepository::find_by_name(&mut conn, "Crane")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(crane.images, vec![format!("{}/crane.png", with_files)]);
        assert!(!crane.media_pending);

        let hoist = AssetRepository::find_by_name(&mut conn, "Hoist")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hoist.id, without_files);
        assert!(hoist.images.is_empty());
        assert!(!hoist.media_pending);

        let _ = fs::remove_dir_all(&dir);
    }
}
