use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Logical field names assets are imported under.
pub mod fields {
    pub const CODE: &str = "code";
    pub const CATEGORY_ID: &str = "category_id";
    pub const NAME: &str = "name";
    pub const DETAIL: &str = "detail";
    pub const SPECIFICATION: &str = "specification";
    pub const STANDARD: &str = "standard";
    pub const UNIT: &str = "unit";
    pub const QUANTITY: &str = "quantity";
    pub const NOTE: &str = "note";
}

/// Unmapped worksheet columns preserved verbatim, in column order. An ordered
/// pair list rather than a map so duplicate header titles cannot silently
/// overwrite each other.
pub type OtherFields = Vec<(String, String)>;

/// Per-row assembled state: created fresh per row, consumed by the gate,
/// destroyed after the row's outcome is resolved.
#[derive(Debug, Clone, Default)]
pub struct PendingRecord {
    pub row: u32,
    pub fields: HashMap<String, String>,
    pub category_id: Option<i64>,
    pub other_fields: OtherFields,
    /// Staged image files owned by this row until handed to the media
    /// pipeline or deleted on reject/skip.
    pub staged_images: Vec<PathBuf>,
}

impl PendingRecord {
    pub fn new(row: u32) -> Self {
        Self {
            row,
            ..Default::default()
        }
    }

    /// Non-empty value of a mapped field, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.field(fields::NAME)
    }
}

/// Field set persisted for an accepted row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAsset {
    pub code: Option<String>,
    pub category_id: Option<i64>,
    pub name: String,
    pub detail: Option<String>,
    pub specification: Option<String>,
    pub standard: Option<String>,
    pub unit: Option<String>,
    pub quantity: Option<String>,
    pub note: Option<String>,
    pub other_fields: OtherFields,
    /// Set when the row has staged images: relocation happens after the
    /// database write, so the marker is cleared only once the image list is
    /// consistent (see reconcile_pending_media).
    pub media_pending: bool,
}

impl NewAsset {
    pub fn from_pending(record: &PendingRecord) -> Self {
        let get = |name: &str| record.field(name).map(|v| v.to_string());
        Self {
            code: get(fields::CODE),
            category_id: record.category_id,
            name: get(fields::NAME).unwrap_or_default(),
            detail: get(fields::DETAIL),
            specification: get(fields::SPECIFICATION),
            standard: get(fields::STANDARD),
            unit: get(fields::UNIT),
            quantity: get(fields::QUANTITY),
            note: get(fields::NOTE),
            other_fields: record.other_fields.clone(),
            media_pending: !record.staged_images.is_empty(),
        }
    }
}

/// A persisted asset as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: i64,
    pub code: Option<String>,
    pub category_id: Option<i64>,
    pub name: String,
    pub detail: Option<String>,
    pub specification: Option<String>,
    pub standard: Option<String>,
    pub unit: Option<String>,
    pub quantity: Option<String>,
    pub note: Option<String>,
    pub images: Vec<String>,
    pub other_fields: OtherFields,
    pub media_pending: bool,
}
