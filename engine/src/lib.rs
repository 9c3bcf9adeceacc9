//! # Filemig Engine - File Migration Library
//!
//! A headless engine that walks a source tree, selects files with a
//! declarative filter specification and copies, previews or purges them.
//! Copies may be compressed, encrypted and versioned, and every processed
//! file produces an audit record.
//!
//! ## Overview
//!
//! - Ordered filter stages (date, extension, name, folder, owner, size)
//! - Directory pruning during the walk
//! - Streaming gzip / AES-CTR transform chain with end-to-end checksums
//! - Per-file error isolation: a failing file never aborts the run
//! - Progress reporting via callbacks (decoupled from UI technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use filemig_engine::{create_run, run_migration, Activity, FilterSpec, InMemoryStore};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let filters: FilterSpec = serde_json::from_str(r#"{
//!     "extensions": { "extensions": ["pdf"], "mode": "include" },
//!     "transform": { "compression": true }
//! }"#)?;
//!
//! let run = create_run(
//!     20240101,
//!     Activity::Copy,
//!     Path::new("/data/in"),
//!     Some(Path::new("/data/archive")),
//!     filters,
//!     None,
//! )?;
//!
//! let store = InMemoryStore::new();
//! for record in run_migration(&run, &store, None)? {
//!     println!("{}: {:?} validated={}", record.file_id, record.destination_path, record.validated);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **filter_spec**: Filter and transform configuration
//! - **attributes**: File attribute snapshots
//! - **filter**: Inclusion decisions for files and directories
//! - **destination**: Destination path derivation
//! - **checksums**: Checksum algorithms and streaming hashers
//! - **crypto**: Key handling and AES-CTR streams
//! - **fs_ops**: Low-level filesystem operations
//! - **transform**: Per-file activity handling
//! - **restore**: Decoding migrated files
//! - **walker**: Directory walk and worker pool
//! - **sink**: Run records and metadata stores
//! - **model**: Core data structures
//! - **error**: Error types
//! - **progress**: Progress callback trait
//! - **job**: Run orchestration (create, execute)

pub mod attributes;
pub mod checksums;
pub mod crypto;
pub mod destination;
pub mod error;
pub mod filter;
pub mod filter_spec;
pub mod fs_ops;
pub mod job;
pub mod model;
pub mod progress;
pub mod restore;
pub mod sink;
pub mod transform;
pub mod walker;

// Re-export main types and functions
pub use checksums::{ChecksumAlgorithm, ChecksumValue};
pub use error::{EngineError, RestoreError, StoreError, TransferError};
pub use filter::{FilterDecision, FilterEvaluator, FilterStage};
pub use filter_spec::{FilterSpec, TransformOptions};
pub use job::{create_run, execute_run, run_migration};
pub use model::{Activity, CancellationToken, FileRecord, RunContext};
pub use progress::RunObserver;
pub use restore::{original_file_name, restore_file};
pub use sink::{InMemoryStore, JsonFileStore, MetadataStore, RunMetadataSink};
