pub mod import_service;
pub mod media_pipeline;
pub mod reference_resolver;
pub mod row_gate;
pub mod row_materializer;
pub mod worksheet_indexer;
