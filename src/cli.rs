use crate::error::{ErrorKind, Result};
use crate::observability;
use clap::{Parser, Subcommand};
use exn::ResultExt;
use retrocache_cache::{Database, Repository};
use retrocache_config::Config;
use retrocache_fetch::transport::HttpTransport;
use retrocache_fetch::{Fetcher, Progress, Snapshot, mount_directories, select_block_store};
use retrocache_storage::BackendHandle;
use retrocache_storage::backend::LocalBackend;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fetch emulator cores, ROMs and runtime assets through a local cache.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "RETROCACHE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load every configured asset, downloading only what changed
    Load {
        /// Don't render progress
        #[arg(short, long)]
        quiet: bool,
    },
    /// List cached assets
    Status,
    /// Forget every cached asset
    Purge,
}

/// Parse arguments, then run the command on a single-threaded runtime.
pub fn execute() -> Result<()> {
    let args = Args::parse();
    observability::initialize_tracing();
    let config = Config::load(args.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .or_raise(|| ErrorKind::Runtime)?;
    runtime.block_on(async {
        let db = open_database(&config).await?;
        let result = match args.command {
            Command::Load { quiet } => load(&config, &db, quiet).await,
            Command::Status => status(&db).await,
            Command::Purge => purge(&db).await,
        };
        db.close().await;
        result
    })
}

async fn open_database(config: &Config) -> Result<Database> {
    let path = &config.cache.database;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Cache)?;
    }
    Database::connect(path).await.or_raise(|| ErrorKind::Cache)
}

async fn load(config: &Config, db: &Database, quiet: bool) -> Result<()> {
    let assets = config.asset_records().or_raise(|| ErrorKind::Config)?;
    let candidate = config
        .cache
        .block_store
        .as_ref()
        .map(|root| LocalBackend::new("blocks", root).map(|backend| Arc::new(backend) as BackendHandle));
    let block_store = select_block_store(config.cache.block_store_mode, candidate)
        .await
        .or_raise(|| ErrorKind::BlockStore)?;

    let transport = Arc::new(HttpTransport::new().or_raise(|| ErrorKind::Load)?);
    let fetcher = Fetcher::new(transport, Repository::from(db), block_store.clone());
    let progress = match quiet {
        true => Progress::new(),
        false => Progress::with_renderer(stderr_renderer()),
    };
    let loaded = fetcher.load_all(&assets, &progress).await;
    if !quiet && progress.snapshot().total > 0 {
        eprintln!();
    }
    let blobs = loaded.or_raise(|| ErrorKind::Load)?;
    for (asset, blob) in assets.iter().zip(&blobs) {
        println!("{:>12}  {}", blob.len(), asset.canonical_url());
    }

    if let Some(block_store) = &block_store {
        let mounts = mount_directories(block_store, &config.persist_dirs())
            .await
            .or_raise(|| ErrorKind::BlockStore)?;
        for mount in mounts {
            tracing::info!(dir = %mount.dir.display(), files = mount.files.len(), "Persistent directory ready");
        }
    }
    Ok(())
}

async fn status(db: &Database) -> Result<()> {
    let entries = Repository::from(db).list().await.or_raise(|| ErrorKind::Cache)?;
    for entry in &entries {
        let tier = match entry.inline {
            true => "database",
            false => "block",
        };
        let validator = entry.etag.as_deref().or(entry.last_modified.as_deref()).unwrap_or("-");
        println!("{:>12}  {tier:<8}  {}  {validator}  {}", entry.size, entry.cached_at, entry.url);
    }
    tracing::info!(entries = entries.len(), "Cache status");
    Ok(())
}

async fn purge(db: &Database) -> Result<()> {
    let removed = Repository::from(db).clear().await.or_raise(|| ErrorKind::Cache)?;
    tracing::info!(removed, "Cache purged");
    Ok(())
}

/// Render aggregate progress on one stderr line, redrawn only when the
/// displayed value changes.
fn stderr_renderer() -> impl Fn(Snapshot) + Send + Sync + 'static {
    let last = AtomicU64::new(u64::MAX);
    move |snapshot| {
        if let Some(line) = progress_line(&last, snapshot) {
            eprint!("\r{line}");
        }
    }
}

fn progress_line(last: &AtomicU64, snapshot: Snapshot) -> Option<String> {
    let percentage = snapshot.percentage();
    let permille = (percentage * 10.0).round() as u64;
    match last.swap(permille, Ordering::Relaxed) == permille {
        true => None,
        false => Some(format!("Loading {percentage:5.1}% ({}/{} bytes)", snapshot.current, snapshot.total)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&["retrocache", "load"], None)]
    #[case(&["retrocache", "--config", "/etc/retrocache.yaml", "status"], Some("/etc/retrocache.yaml"))]
    #[case(&["retrocache", "-c", "site.toml", "purge"], Some("site.toml"))]
    fn test_parse_args(#[case] argv: &[&str], #[case] config: Option<&str>) {
        let args = Args::try_parse_from(argv).unwrap();
        assert_eq!(args.config, config.map(PathBuf::from));
    }

    #[test]
    fn test_parse_load_quiet() {
        let args = Args::try_parse_from(["retrocache", "load", "--quiet"]).unwrap();
        assert!(matches!(args.command, Command::Load { quiet: true }));
        assert!(Args::try_parse_from(["retrocache"]).is_err());
    }

    #[test]
    fn test_progress_line_skips_unchanged_values() {
        let last = AtomicU64::new(u64::MAX);
        let line = progress_line(&last, Snapshot { current: 250, total: 1000 });
        assert_eq!(line.as_deref(), Some("Loading  25.0% (250/1000 bytes)"));
        assert_eq!(progress_line(&last, Snapshot { current: 250, total: 1000 }), None);
        assert!(progress_line(&last, Snapshot { current: 1000, total: 1000 }).is_some());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_open_database_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.cache.database = dir.path().join("nested/cache.db");
        let db = open_database(&config).await.unwrap();
        db.close().await;
        assert!(dir.path().join("nested/cache.db").is_file());
    }
}
