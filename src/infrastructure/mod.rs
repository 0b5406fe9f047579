pub mod config;
pub mod db;
pub mod storage;
pub mod workbook;
