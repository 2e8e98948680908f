//! Trade history import for the trading journal.
//!
//! CSV and Excel exports are parsed into normalized trades, deduplicated by
//! position id and stored as one batch per import.

pub mod auth;
pub mod cli;
pub mod commands;
pub mod db;
pub mod import;
pub mod models;
pub mod store;
