pub mod asset;
pub mod error;
pub mod import;
pub mod worksheet;
