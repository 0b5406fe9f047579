use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::asset::fields;
use crate::domain::worksheet::ColumnMapping;

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_IMAGE_MAX_WIDTH: u32 = 800;
pub const DEFAULT_IMAGE_MAX_HEIGHT: u32 = 800;

/// Fields every importable asset must carry, matching the catalog schema.
pub fn default_required_fields() -> Vec<String> {
    [
        fields::CODE,
        fields::CATEGORY_ID,
        fields::NAME,
        fields::SPECIFICATION,
        fields::STANDARD,
        fields::UNIT,
        fields::QUANTITY,
    ]
    .iter()
    .map(|f| f.to_string())
    .collect()
}

/// Caller-supplied job input: the declared column mapping plus tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ImportOptions {
    pub mapping: ColumnMapping,
    #[validate(range(min = 1))]
    pub batch_size: usize,
    #[validate(length(min = 1))]
    pub required_fields: Vec<String>,
    #[validate(range(min = 1))]
    pub image_max_width: u32,
    #[validate(range(min = 1))]
    pub image_max_height: u32,
}

impl ImportOptions {
    pub fn new(mapping: ColumnMapping) -> Self {
        Self {
            mapping,
            batch_size: DEFAULT_BATCH_SIZE,
            required_fields: default_required_fields(),
            image_max_width: DEFAULT_IMAGE_MAX_WIDTH,
            image_max_height: DEFAULT_IMAGE_MAX_HEIGHT,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_required_fields(mut self, required_fields: Vec<String>) -> Self {
        self.required_fields = required_fields;
        self
    }
}

/// Per-row result inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Created(i64),
    SkippedDuplicate,
    RejectedIncomplete,
}

/// Job-level outcome: row counts plus the first fatal error, if the job
/// stopped early. Batches committed before a fatal error stay committed,
/// so their counts are reported alongside it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub created: u64,
    pub skipped: u64,
    pub rejected: u64,
    pub failed_batches: u64,
    pub fatal_error: Option<String>,
}

impl ImportSummary {
    pub fn absorb(&mut self, other: &ImportSummary) {
        self.created += other.created;
        self.skipped += other.skipped;
        self.rejected += other.rejected;
        self.failed_batches += other.failed_batches;
        if self.fatal_error.is_none() {
            self.fatal_error = other.fatal_error.clone();
        }
    }
}
