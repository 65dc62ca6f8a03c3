//! Library root for the `backup_center` crate
//! Backup archive creation, cataloging and restore for a single site

// Core error handling
pub mod errors;

// Configuration & CLI
pub mod cli;
pub mod config;
pub mod config_loader;

// Access levels & caller context
pub mod loa;
pub mod request_context;

// Audit
pub mod audit;

// Path sandboxing
pub mod path_sandbox;

// Archive records & catalog storage
pub mod archive_record;
pub mod archive_store;
pub mod archive_store_sled;
pub mod catalog;

// Backup & restore
pub mod archive_builder;
pub mod bench;
pub mod dump_generator;
pub mod engine;
pub mod restore_launcher;
pub mod restore_script;

// Web server interface
pub mod api_errors;
pub mod app_state;
pub mod security;
pub mod web;


pub use archive_record::{ArchiveRecord, ArchiveSource, ArchiveStatus};
pub use engine::ArchiveEngine;
pub use errors::{BackupError, BackupResult};
pub use request_context::RequestContext;
