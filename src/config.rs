//! Configuration parsing and validation.
//!
//! Settings are read from a TOML file (default `./config/pmem.toml`). Every
//! section is optional; omitted keys fall back to the defaults below, so an
//! empty file is a valid configuration.
//!
//! ```toml
//! [project]
//! name = "ShooterGame"
//! key_classes = ["AShooterCharacter", "UInventoryComponent"]
//!
//! [store]
//! dir = "./logs-and-data"
//!
//! [indexer]
//! root = "./Source"
//! extensions = [".cpp", ".h", ".cs"]
//!
//! [server]
//! bind = "127.0.0.1:9011"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub relevance: RelevanceConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProjectConfig {
    #[serde(default = "default_project_name")]
    pub name: String,
    #[serde(default = "default_engine_version")]
    pub engine_version: String,
    /// Classes listed in the architecture overview as the project's core systems.
    #[serde(default)]
    pub key_classes: Vec<String>,
    #[serde(default = "default_tech_stack")]
    pub tech_stack: BTreeMap<String, String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            engine_version: default_engine_version(),
            key_classes: Vec::new(),
            tech_stack: default_tech_stack(),
        }
    }
}

fn default_project_name() -> String {
    "Project".to_string()
}
fn default_engine_version() -> String {
    "5.5".to_string()
}
fn default_tech_stack() -> BTreeMap<String, String> {
    [
        ("engine", "Unreal Engine 5.5"),
        ("language", "C++"),
        ("buildSystem", "UnrealBuildTool"),
        ("ui", "UMG Widgets"),
        ("ai", "Behavior Trees"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_store_file")]
    pub file_name: String,
    /// Maximum number of context windows retained (oldest evicted first).
    #[serde(default = "default_context_window_cap")]
    pub context_window_cap: usize,
    /// Optional location of the regenerable source-index artifact.
    #[serde(default)]
    pub index_file: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            file_name: default_store_file(),
            context_window_cap: default_context_window_cap(),
            index_file: None,
        }
    }
}

impl StoreConfig {
    /// Full path of the primary memory document.
    pub fn document_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./logs-and-data")
}
fn default_store_file() -> String {
    "project-memory.json".to_string()
}
fn default_context_window_cap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    #[serde(default = "default_max_functions")]
    pub max_functions: usize,
    #[serde(default = "default_max_dependencies")]
    pub max_dependencies: usize,
    /// Bytes searched before a function match for a `UFUNCTION` annotation.
    #[serde(default = "default_annotation_lookback")]
    pub annotation_lookback: usize,
    #[serde(default = "default_long_function_lines")]
    pub long_function_lines: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_functions: default_max_functions(),
            max_dependencies: default_max_dependencies(),
            annotation_lookback: default_annotation_lookback(),
            long_function_lines: default_long_function_lines(),
        }
    }
}

fn default_max_functions() -> usize {
    20
}
fn default_max_dependencies() -> usize {
    15
}
fn default_annotation_lookback() -> usize {
    100
}
fn default_long_function_lines() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexerConfig {
    #[serde(default = "default_indexer_root")]
    pub root: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_ignore_globs")]
    pub ignore_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            root: default_indexer_root(),
            extensions: default_extensions(),
            ignore_globs: default_ignore_globs(),
            follow_symlinks: false,
        }
    }
}

fn default_indexer_root() -> PathBuf {
    PathBuf::from("./Source")
}
fn default_extensions() -> Vec<String> {
    vec![".cpp".to_string(), ".h".to_string(), ".cs".to_string()]
}
fn default_ignore_globs() -> Vec<String> {
    vec![
        "**/.*".to_string(),
        "**/.*/**".to_string(),
        "**/*.original".to_string(),
        "**/*.orig".to_string(),
        "**/*.bak".to_string(),
        "**/*~".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelevanceConfig {
    /// Domain vocabulary used to score insights.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
        }
    }
}

fn default_keywords() -> Vec<String> {
    [
        "character",
        "inventory",
        "damage",
        "ui",
        "input",
        "memory",
        "performance",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_cache_refresh_secs")]
    pub cache_refresh_secs: u64,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cache_refresh_secs: default_cache_refresh_secs(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:9011".to_string()
}
fn default_cache_refresh_secs() -> u64 {
    30
}
fn default_stale_after_secs() -> u64 {
    300
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Load the config at `path`, or fall back to [`Config::minimal`] when the
/// file does not exist. A file that exists but fails to parse is an error.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

/// Starter file written by `pmem init`. Every key shown is the default.
pub const STARTER_CONFIG: &str = r#"[project]
name = "Project"
engine_version = "5.5"
key_classes = []

[store]
dir = "./logs-and-data"
file_name = "project-memory.json"
context_window_cap = 50

[scanner]
max_functions = 20
max_dependencies = 15
annotation_lookback = 100
long_function_lines = 50

[indexer]
root = "./Source"
extensions = [".cpp", ".h", ".cs"]

[server]
bind = "127.0.0.1:9011"
cache_refresh_secs = 30
stale_after_secs = 300
"#;

/// Write [`STARTER_CONFIG`] to `path` unless a file is already there.
/// Returns whether a file was written.
pub fn write_starter_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }
    std::fs::write(path, STARTER_CONFIG)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(true)
}

fn validate(config: &Config) -> Result<()> {
    // Validate store
    if config.store.context_window_cap == 0 {
        anyhow::bail!("store.context_window_cap must be >= 1");
    }
    if config.store.file_name.trim().is_empty() {
        anyhow::bail!("store.file_name must not be empty");
    }

    // Validate scanner caps
    if config.scanner.max_functions == 0 {
        anyhow::bail!("scanner.max_functions must be >= 1");
    }
    if config.scanner.max_dependencies == 0 {
        anyhow::bail!("scanner.max_dependencies must be >= 1");
    }

    // Validate indexer
    if config.indexer.extensions.is_empty() {
        anyhow::bail!("indexer.extensions must list at least one extension");
    }
    for ext in &config.indexer.extensions {
        if !ext.starts_with('.') {
            anyhow::bail!("indexer.extensions entry '{}' must start with '.'", ext);
        }
    }
    for pattern in &config.indexer.ignore_globs {
        globset::Glob::new(pattern)
            .with_context(|| format!("Invalid indexer.ignore_globs pattern: {}", pattern))?;
    }

    if config.relevance.keywords.is_empty() {
        anyhow::bail!("relevance.keywords must not be empty");
    }

    if config.server.cache_refresh_secs == 0 {
        anyhow::bail!("server.cache_refresh_secs must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("pmem.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn empty_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "");
        let config = load_config(&path).unwrap();

        assert_eq!(config.store.context_window_cap, 50);
        assert_eq!(config.scanner.max_functions, 20);
        assert_eq!(config.scanner.max_dependencies, 15);
        assert_eq!(config.indexer.extensions, vec![".cpp", ".h", ".cs"]);
        assert_eq!(config.relevance.keywords.len(), 7);
        assert_eq!(config.server.cache_refresh_secs, 30);
        assert_eq!(
            config.store.document_path(),
            PathBuf::from("./logs-and-data/project-memory.json")
        );
    }

    #[test]
    fn overrides_are_applied() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[project]
name = "Arena"
key_classes = ["AArenaCharacter"]

[scanner]
max_functions = 5
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.project.name, "Arena");
        assert_eq!(config.project.key_classes, vec!["AArenaCharacter"]);
        assert_eq!(config.scanner.max_functions, 5);
        assert_eq!(config.scanner.max_dependencies, 15);
    }

    #[test]
    fn rejects_zero_caps() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[store]\ncontext_window_cap = 0\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("context_window_cap"));
    }

    #[test]
    fn rejects_extension_without_dot() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[indexer]\nextensions = [\"cpp\"]\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("must start with '.'"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_or_default(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.project.name, "Project");
    }

    #[test]
    fn starter_config_loads_and_is_not_overwritten() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config/pmem.toml");
        assert!(write_starter_config(&path).unwrap());
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9011");
        assert_eq!(config.indexer.ignore_globs.len(), 6);

        std::fs::write(&path, "[project]\nname = \"Kept\"\n").unwrap();
        assert!(!write_starter_config(&path).unwrap());
        assert_eq!(load_config(&path).unwrap().project.name, "Kept");
    }
}
