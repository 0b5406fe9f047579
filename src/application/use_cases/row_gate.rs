use sqlx::SqliteConnection;

use crate::domain::asset::{fields, PendingRecord};
use crate::domain::error::Result;
use crate::infrastructure::db::assets::AssetRepository;
use crate::infrastructure::storage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Create,
    /// Expected steady-state when re-running an import over already-loaded
    /// data; not an error.
    SkipDuplicate,
    /// The named required field is absent or empty.
    RejectIncomplete(String),
}

/// Decide a row's fate. Runs inside the batch transaction so the duplicate
/// check sees rows created earlier in the same batch.
pub async fn gate_row(
    conn: &mut SqliteConnection,
    record: &PendingRecord,
    required_fields: &[String],
) -> Result<GateDecision> {
    for field in required_fields {
        let present = if field == fields::CATEGORY_ID {
            record.category_id.is_some()
        } else {
            record.field(field).is_some()
        };
        if !present {
            return Ok(GateDecision::RejectIncomplete(field.clone()));
        }
    }

    // The name is the dedup key, so it is required whether or not the
    // caller's list says so.
    let Some(name) = record.name() else {
        return Ok(GateDecision::RejectIncomplete(fields::NAME.to_string()));
    };

    if AssetRepository::find_by_name(conn, name).await?.is_some() {
        return Ok(GateDecision::SkipDuplicate);
    }

    Ok(GateDecision::Create)
}

/// Rejected and skipped rows resolve identically for images: whatever was
/// staged for the row is deleted so no orphan files survive.
pub fn discard_staged_images(record: &PendingRecord) {
    for path in &record.staged_images {
        storage::remove_file_quiet(path);
    }
}
