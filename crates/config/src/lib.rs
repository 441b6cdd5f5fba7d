//! Configuration for retrocache.
//!
//! Configuration is merged from the following sources, lowest to highest
//! precedence:
//!
//! 1. Defaults
//! 2. A configuration file: the one passed to [`Config::load`], or
//!    `config.yaml` in the platform configuration directory when it exists.
//!    The format follows the extension (`.toml`, `.json`, YAML otherwise).
//! 3. Environment variables prefixed with `RETROCACHE__`, with double
//!    underscores separating nested keys, e.g.
//!    `RETROCACHE__CACHE__BLOCK_STORE_MODE=required`.
//!
//! ```yaml
//! base_url: https://example.org/play/
//! core:
//!   name: mkxp-z
//!   js_size: 180000
//!   wasm_size: 24000000
//! rom:
//!   path: game.zip
//!   size: 52000000
//! cache:
//!   block_store: /var/cache/retrocache/blocks
//!   block_store_mode: preferred
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use retrocache_fetch::{AssetRecord, BlockStoreMode, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "RETROCACHE__";
/// Name of the database file inside the platform cache directory.
const DATABASE_FILE: &str = "cache.db";
/// Block store directory for assets that aren't part of the core.
const ASSET_DIR: &str = "assets";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Base URL that relative asset paths resolve against. Without it, every
    /// asset path must be an absolute URL.
    pub base_url: Option<String>,
    /// Emulator core, fetched as a JavaScript loader and a WebAssembly module.
    pub core: Option<Core>,
    /// Game ROM or package.
    pub rom: Option<Asset>,
    /// Any further runtime packages.
    pub assets: Vec<Asset>,
    pub cache: Cache,
    /// Persistent directories in the block store, mounted before loading.
    ///
    /// # Default
    ///
    /// `<core>/saves` and `<core>/states` when a core is configured.
    pub persist_dirs: Option<Vec<PathBuf>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Core {
    /// Core name, such as `mkxp-z`; files are named `<name>_libretro.*`.
    pub name: String,
    pub js_size: u64,
    pub wasm_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Asset {
    /// Absolute URL, or a reference relative to [`Config::base_url`].
    pub path: String,
    /// Expected size in bytes.
    pub size: u64,
    /// Block store path.
    ///
    /// # Default
    ///
    /// `assets/<host>/<URL path>`, e.g. `assets/example.org/play/game.zip`.
    /// A query string is kept in the file name after an `@`.
    pub cache_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Cache {
    /// SQLite database holding cache records (and inline payloads).
    ///
    /// # Default
    ///
    /// `cache.db` in the platform cache directory.
    pub database: PathBuf,
    /// Root directory of the block store. Without it, payloads are only
    /// ever cached in the database.
    pub block_store: Option<PathBuf>,
    pub block_store_mode: BlockStoreMode,
}

impl Default for Cache {
    fn default() -> Self {
        let database = match project_dirs() {
            Some(dirs) => dirs.cache_dir().join(DATABASE_FILE),
            None => PathBuf::from(DATABASE_FILE),
        };
        Self {
            database,
            block_store: None,
            block_store_mode: BlockStoreMode::default(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "retrocache")
}

impl Config {
    /// Location of the configuration file used when none is given.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Load configuration from defaults, a file and the environment.
    ///
    /// An explicit `path` must exist; the default location is skipped when
    /// it doesn't.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => figment = merge_file(figment, path),
            None => {
                if let Some(path) = Self::default_path().filter(|path| path.is_file()) {
                    tracing::debug!(path = %path.display(), "Using default configuration file");
                    figment = merge_file(figment, &path);
                }
            },
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract().or_raise(|| ErrorKind::Invalid)
    }

    /// Every asset to load, in order: core loader, core module, ROM, then
    /// any further assets.
    ///
    /// Two assets may never share a block store path.
    pub fn asset_records(&self) -> Result<Vec<AssetRecord>> {
        let base = match &self.base_url {
            Some(base) => Some(Url::parse(base).or_raise(|| ErrorKind::Asset(base.clone()))?),
            None => None,
        };
        let resolve = |path: &str, size: u64| -> Result<AssetRecord> {
            let record = match &base {
                Some(base) => AssetRecord::resolve(base, path, size),
                None => AssetRecord::new(path, size),
            };
            record.or_raise(|| ErrorKind::Asset(path.to_string()))
        };

        let mut records = Vec::new();
        if let Some(core) = &self.core {
            for (extension, size) in [("js", core.js_size), ("wasm", core.wasm_size)] {
                let file = format!("{}_libretro.{extension}", core.name);
                let hint = Path::new(&core.name).join("core").join(&file);
                let record = resolve(&file, size)?
                    .with_path_hint(&hint)
                    .or_raise(|| ErrorKind::Asset(file.clone()))?;
                records.push(record);
            }
        }
        for asset in self.rom.iter().chain(&self.assets) {
            let record = resolve(&asset.path, asset.size)?;
            let hint = match &asset.cache_path {
                Some(path) => Some(path.clone()),
                None => default_path_hint(record.url()),
            };
            let record = match hint {
                Some(hint) => record.with_path_hint(hint).or_raise(|| ErrorKind::Asset(asset.path.clone()))?,
                None => record,
            };
            records.push(record);
        }

        let mut claimed = HashSet::new();
        for record in &records {
            if let Some(hint) = record.path_hint()
                && !claimed.insert(hint)
            {
                exn::bail!(ErrorKind::Asset(format!(
                    "{} would share block store path `{}` with another asset",
                    record.canonical_url(),
                    hint.display()
                )));
            }
        }
        Ok(records)
    }

    /// Persistent directories to mount in the block store.
    pub fn persist_dirs(&self) -> Vec<PathBuf> {
        match (&self.persist_dirs, &self.core) {
            (Some(dirs), _) => dirs.clone(),
            (None, Some(core)) => vec![
                Path::new(&core.name).join("saves"),
                Path::new(&core.name).join("states"),
            ],
            (None, None) => Vec::new(),
        }
    }
}

fn merge_file(figment: Figment, path: &Path) -> Figment {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => figment.merge(Yaml::file(path)),
    }
}

/// `assets/<host>[_<port>]/<path segments…>[@<query>]`; `None` when the URL
/// doesn't end in a file name.
fn default_path_hint(url: &Url) -> Option<PathBuf> {
    let host = match (url.host_str()?, url.port()) {
        (host, Some(port)) => format!("{host}_{port}"),
        (host, None) => host.to_string(),
    };
    let mut segments: Vec<&str> = url.path_segments()?.collect();
    let name = segments.pop().filter(|name| !name.is_empty())?;
    let name = match url.query() {
        Some(query) => format!("{name}@{}", query.replace('/', "%2F")),
        None => name.to_string(),
    };
    let mut hint = Path::new(ASSET_DIR).join(host);
    hint.extend(segments.into_iter().filter(|segment| !segment.is_empty()));
    Some(hint.join(name))
}
