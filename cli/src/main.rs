//! filemig - Command-line interface for the file migration engine.
//!
//! This is a simple CLI for manual runs and restores. It provides argument
//! parsing, logging setup and progress reporting to stderr.

use clap::{Parser, Subcommand};
use filemig_engine::{
    create_run, crypto::generate_key, restore_file, run_migration, Activity, ChecksumAlgorithm,
    FileRecord, FilterSpec, InMemoryStore, JsonFileStore, MetadataStore, RunContext, RunObserver,
};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// filemig - Filter, copy, compress and encrypt file trees
#[derive(Parser, Debug)]
#[command(name = "filemig")]
#[command(version = "0.1.0")]
#[command(about = "Migrate files between directory trees with an audit trail")]
struct Cli {
    /// Enable verbose output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk a source tree and apply an activity to every matching file
    Run(RunArgs),
    /// Decode a migrated file back to its original bytes
    Restore(RestoreArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Source directory
    #[arg(long, value_name = "PATH")]
    src: PathBuf,

    /// Destination directory (required for copy and copyandpurge)
    #[arg(long, value_name = "PATH")]
    dst: Option<PathBuf>,

    /// Activity: copy, copyandpurge, preview or purgeonly
    #[arg(long, value_name = "ACTIVITY", default_value = "copy")]
    activity: String,

    /// JSON file holding the filter specification
    #[arg(long, value_name = "FILE")]
    filters: Option<PathBuf>,

    /// Run identifier (defaults to the local timestamp, yyyyMMddHHmmss)
    #[arg(long, value_name = "ID")]
    run_id: Option<u64>,

    /// Base64 encryption key (generated when encrypting without one)
    #[arg(long, value_name = "KEY")]
    key: Option<String>,

    /// Number of worker threads
    #[arg(long, value_name = "N", default_value_t = 1)]
    workers: usize,

    /// JSON metadata store file
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Print the run's records as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Encrypt copies
    #[arg(long)]
    encrypt: bool,

    /// Gzip copies
    #[arg(long)]
    compress: bool,

    /// Rename existing destination files instead of overwriting them
    #[arg(long)]
    versioning: bool,

    /// Checksum algorithm: md5, sha1, sha256, blake3
    #[arg(long, value_name = "ALGORITHM")]
    hash: Option<String>,

    /// Replace earlier store rows for the same destination file
    #[arg(long)]
    check_duplicates: bool,

    /// Nest copies under a folder named after the source root
    #[arg(long)]
    preserve_root: bool,
}

#[derive(clap::Args, Debug)]
struct RestoreArgs {
    /// Migrated file to decode
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// JSON metadata store holding the file's record
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
}

/// CLI implementation of RunObserver for displaying run progress
struct CliProgress {
    verbose: bool,
    start_time: Instant,
    validated: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    pruned: AtomicUsize,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
            validated: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            pruned: AtomicUsize::new(0),
        }
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }
}

impl RunObserver for CliProgress {
    fn on_run_started(&self, ctx: &RunContext) {
        eprintln!("Starting run {}...", ctx.run_id);
        eprintln!("  Activity: {}", ctx.activity);
        eprintln!("  Source: {}", ctx.source_root.display());
        if let Some(destination) = &ctx.destination_root {
            eprintln!("  Destination: {}", destination.display());
        }
        eprintln!("  Workers: {}", ctx.parallelism());
        eprintln!();
    }

    fn on_directory_pruned(&self, path: &Path) {
        self.pruned.fetch_add(1, Ordering::Relaxed);
        if self.verbose {
            eprintln!("Pruned: {}", path.display());
        }
    }

    fn on_file_skipped(&self, path: &Path) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        if self.verbose {
            eprintln!("Skipped: {}", path.display());
        }
    }

    fn on_file_recorded(&self, record: &FileRecord) {
        let status = match &record.error {
            Some(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                "Failed"
            }
            None if record.validated => {
                self.validated.fetch_add(1, Ordering::Relaxed);
                "Done"
            }
            None => "Recorded",
        };
        if self.verbose {
            eprintln!("[{}] {}: {}", record.file_id, status, record.source_path.display());
        }
    }

    fn on_run_completed(&self, ctx: &RunContext, records: usize) {
        eprintln!();
        if ctx.is_cancelled() {
            eprintln!("Run cancelled.");
        } else {
            eprintln!("Run complete!");
        }
        eprintln!(
            "Summary: {} recorded, {} validated, {} failed, {} skipped, {} directories pruned",
            records,
            self.validated.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed),
            self.pruned.load(Ordering::Relaxed),
        );
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));
    }
}

/// Install the stderr log subscriber; `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Parse command-line arguments, then run the selected command
fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Exit code tracking
    let exit_code = match run_cli(&cli) {
        Ok(()) => 0,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(cli: &Cli) -> Result<(), String> {
    match &cli.command {
        Command::Run(args) => run_command(args, cli.verbose),
        Command::Restore(args) => restore_command(args),
    }
}

fn load_filters(path: Option<&Path>) -> Result<FilterSpec, String> {
    let Some(path) = path else {
        return Ok(FilterSpec::default());
    };
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read filter file {}: {}", path.display(), e))?;
    serde_json::from_str(&text)
        .map_err(|e| format!("Invalid filter file {}: {}", path.display(), e))
}

fn default_run_id() -> u64 {
    chrono::Local::now()
        .format("%Y%m%d%H%M%S")
        .to_string()
        .parse()
        .unwrap_or_default()
}

fn open_store(path: Option<&Path>) -> Box<dyn MetadataStore> {
    match path {
        Some(path) => Box::new(JsonFileStore::open(path)),
        None => Box::new(InMemoryStore::new()),
    }
}

fn run_command(args: &RunArgs, verbose: bool) -> Result<(), String> {
    let activity: Activity = args.activity.parse().map_err(|e| format!("{}", e))?;

    let mut filters = load_filters(args.filters.as_deref())?;
    let transform = &mut filters.transform;
    transform.encryption |= args.encrypt;
    transform.compression |= args.compress;
    transform.versioning |= args.versioning;
    transform.check_duplicates |= args.check_duplicates;
    transform.preserve_source_root |= args.preserve_root;
    if let Some(hash) = &args.hash {
        hash.parse::<ChecksumAlgorithm>().map_err(|e| {
            format!("{}. Must be 'md5', 'sha1', 'sha256', or 'blake3'", e)
        })?;
        transform.checksum_algorithm = hash.clone();
    }

    let key = match (&args.key, transform.encryption) {
        (Some(key), _) => Some(key.clone()),
        (None, true) => {
            let key = generate_key();
            eprintln!("Generated encryption key: {}", key);
            Some(key)
        }
        (None, false) => None,
    };

    let run_id = args.run_id.unwrap_or_else(default_run_id);
    let ctx = create_run(run_id, activity, &args.src, args.dst.as_deref(), filters, key)
        .map_err(|e| format!("Run creation failed: {}", e))?
        .with_parallelism(args.workers);

    let store = open_store(args.store.as_deref());
    let progress = CliProgress::new(verbose);
    let records = run_migration(&ctx, store.as_ref(), Some(&progress))
        .map_err(|e| format!("Run execution failed: {}", e))?;

    if args.json {
        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| format!("Failed to serialize records: {}", e))?;
        println!("{}", json);
    }

    if records.iter().any(|r| r.error.is_some()) {
        Err("One or more files failed to migrate".to_string())
    } else {
        Ok(())
    }
}

fn restore_command(args: &RestoreArgs) -> Result<(), String> {
    let store = open_store(args.store.as_deref());

    let written = match &args.out {
        Some(out) => {
            if out == &args.file {
                return Err("Output path must differ from the file being restored".to_string());
            }
            let file = File::create(out)
                .map_err(|e| format!("Failed to create {}: {}", out.display(), e))?;
            let mut writer = BufWriter::new(file);
            let written = restore_file(&args.file, store.as_ref(), &mut writer)
                .map_err(|e| format!("Restore failed: {}", e))?;
            writer
                .flush()
                .map_err(|e| format!("Failed to write {}: {}", out.display(), e))?;
            written
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            restore_file(&args.file, store.as_ref(), &mut lock)
                .map_err(|e| format!("Restore failed: {}", e))?
        }
    };

    info!(bytes = written, file = %args.file.display(), "Restored file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn run_args(src: &Path, dst: &Path) -> RunArgs {
        RunArgs {
            src: src.to_path_buf(),
            dst: Some(dst.to_path_buf()),
            activity: "copy".to_string(),
            filters: None,
            run_id: Some(1),
            key: None,
            workers: 1,
            store: None,
            json: false,
            encrypt: false,
            compress: false,
            versioning: false,
            hash: None,
            check_duplicates: false,
            preserve_root: false,
        }
    }

    fn cli(command: Command) -> Cli {
        Cli {
            verbose: false,
            command,
        }
    }

    #[test]
    fn test_cli_with_valid_directories() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");

        // Create a simple test file in source
        std::fs::write(src_dir.path().join("test.txt"), "hello").expect("Failed to write file");

        let result = run_cli(&cli(Command::Run(run_args(src_dir.path(), dst_dir.path()))));
        assert!(result.is_ok(), "CLI should succeed with valid directories");
        assert!(dst_dir.path().join("test.txt").exists());
    }

    #[test]
    fn test_cli_with_filter_file() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("keep.pdf"), "pdf").expect("Failed to write file");
        std::fs::write(src_dir.path().join("drop.tmp"), "tmp").expect("Failed to write file");
        let filters = cfg_dir.path().join("filters.json");
        std::fs::write(
            &filters,
            r#"{ "extensions": { "extensions": ["pdf"], "mode": "include" } }"#,
        )
        .expect("Failed to write filters");

        let mut args = run_args(src_dir.path(), dst_dir.path());
        args.filters = Some(filters);
        let result = run_cli(&cli(Command::Run(args)));

        assert!(result.is_ok(), "CLI should succeed with a filter file");
        assert!(dst_dir.path().join("keep.pdf").exists());
        assert!(!dst_dir.path().join("drop.tmp").exists());
    }

    #[test]
    fn test_cli_encrypt_then_restore() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let meta_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("test.txt"), "hello").expect("Failed to write file");
        let store = meta_dir.path().join("store.json");

        let mut args = run_args(src_dir.path(), dst_dir.path());
        args.encrypt = true;
        args.compress = true;
        args.store = Some(store.clone());
        run_cli(&cli(Command::Run(args))).expect("Run should succeed");

        let out = meta_dir.path().join("restored.txt");
        let restore = RestoreArgs {
            file: dst_dir.path().join("test.txt.gz.enc"),
            store: Some(store),
            out: Some(out.clone()),
        };
        run_cli(&cli(Command::Restore(restore))).expect("Restore should succeed");
        assert_eq!(std::fs::read_to_string(out).expect("Failed to read"), "hello");
    }

    #[test]
    fn test_cli_rejects_missing_source() {
        let dst_dir = TempDir::new().expect("Failed to create temp dir");

        let args = run_args(Path::new("/nonexistent/path"), dst_dir.path());
        let result = run_cli(&cli(Command::Run(args)));
        assert!(result.is_err(), "CLI should reject missing source");
    }

    #[test]
    fn test_cli_rejects_invalid_activity() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");

        let mut args = run_args(src_dir.path(), dst_dir.path());
        args.activity = "move".to_string();
        let result = run_cli(&cli(Command::Run(args)));
        assert!(result.is_err(), "CLI should reject invalid activity");
    }

    #[test]
    fn test_cli_rejects_copy_without_destination() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");

        let mut args = run_args(src_dir.path(), Path::new("unused"));
        args.dst = None;
        let result = run_cli(&cli(Command::Run(args)));
        assert!(result.is_err(), "CLI should reject copy without a destination");
    }

    #[test]
    fn test_cli_rejects_invalid_hash_algorithm() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");

        let mut args = run_args(src_dir.path(), dst_dir.path());
        args.hash = Some("invalid_algo".to_string());
        let result = run_cli(&cli(Command::Run(args)));
        assert!(result.is_err(), "CLI should reject invalid hash algorithm");
    }

    #[test]
    fn test_cli_rejects_malformed_filter_file() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg_dir = TempDir::new().expect("Failed to create temp dir");
        let filters = cfg_dir.path().join("filters.json");
        std::fs::write(&filters, "{ not json").expect("Failed to write filters");

        let mut args = run_args(src_dir.path(), dst_dir.path());
        args.filters = Some(filters);
        let result = run_cli(&cli(Command::Run(args)));
        assert!(result.is_err(), "CLI should reject a malformed filter file");
    }

    #[test]
    fn test_default_run_id_is_timestamp() {
        let id = default_run_id().to_string();
        assert_eq!(id.len(), 14);
        assert!(id.starts_with('2'));
    }
}
