//! Configuration for repowiki.
//!
//! Settings are layered: built-in defaults, then an optional TOML file
//! (`~/.repowiki/repowiki.toml` or `--config`), then environment variables,
//! then explicit overrides from CLI flags. [`Config::validate`] turns the
//! merged record into immutable [`Settings`].

use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{RepoWikiError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "repowiki.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".repowiki";

/// How long `git remote get-url origin` may run before we give up on it.
const GIT_REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Embedding vector size expected by the knowledge engine.
pub const EMBEDDING_DIM: usize = 1536;

/// Maximum tokens per embedding input.
pub const EMBEDDING_MAX_TOKENS: usize = 8192;

// ---------------------------------------------------------------------------
// Raw config (defaults + file + env + overrides)
// ---------------------------------------------------------------------------

/// Mergeable configuration record. Every field has a default, so a TOML
/// file only needs the keys it wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Repository root to index.
    pub repo_path: PathBuf,
    /// Local state directory (run reports live under `<working_dir>/<workspace>`).
    pub working_dir: PathBuf,
    /// Where the generated wiki is written.
    pub output_dir: PathBuf,
    /// Knowledge engine workspace identifier.
    pub workspace: String,
    /// Display name override; auto-detected when unset.
    pub repo_name: Option<String>,
    /// Completion model for the adapters, and the model `--model` expects
    /// the engine to serve.
    pub llm_model: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Credential for the model provider.
    pub api_key: String,
    /// OpenAI-compatible base URL for the model adapters.
    pub llm_base_url: String,
    /// Knowledge engine server URL.
    pub engine_url: String,
    /// Credential for the knowledge engine server, if it requires one.
    pub engine_api_key: Option<String>,
    /// File extensions to collect (with or without a leading dot).
    pub code_extensions: Vec<String>,
    /// Extra glob patterns excluded from collection, matched on relative paths.
    pub exclude_patterns: Vec<String>,
    /// Minimum file size (bytes on disk, characters after trimming).
    pub min_file_size: u64,
    /// Report progress every N files.
    pub batch_report_interval: usize,
    /// Maximum documents the engine inserts in parallel.
    pub max_parallel_insert: usize,
    /// Maximum concurrent completion calls.
    pub llm_model_max_async: usize,
    /// Maximum concurrent embedding calls.
    pub embedding_func_max_async: usize,
    /// Per-request timeout for engine and model HTTP calls.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            working_dir: PathBuf::from("./repowiki_storage"),
            output_dir: PathBuf::from("./wiki_docs"),
            workspace: "main".into(),
            repo_name: None,
            llm_model: "github_copilot/gpt-4o".into(),
            embedding_model: "github_copilot/text-embedding-3-small".into(),
            api_key: "oauth2".into(),
            llm_base_url: "https://api.openai.com/v1".into(),
            engine_url: "http://localhost:9621".into(),
            engine_api_key: None,
            code_extensions: vec!["py".into(), "md".into(), "txt".into()],
            exclude_patterns: Vec::new(),
            min_file_size: 50,
            batch_report_interval: 10,
            max_parallel_insert: 48,
            llm_model_max_async: 96,
            embedding_func_max_async: 48,
            request_timeout_secs: 600,
        }
    }
}

/// Explicit overrides, typically from CLI flags. `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub repo_path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub llm_model: Option<String>,
}

impl Config {
    /// Resolve every layer against the real process environment.
    pub fn resolve(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let config = Self::load(file)?
            .apply_env(|key| std::env::var(key).ok())?
            .apply_overrides(overrides);
        Ok(config)
    }

    /// Defaults merged with a TOML file.
    ///
    /// An explicit path must exist. Without one, the user config file is
    /// read when present and silently skipped otherwise.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        match file {
            Some(path) => load_config_from(path),
            None => match config_file_path() {
                Some(path) if path.exists() => load_config_from(&path),
                _ => {
                    tracing::debug!("no config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Apply environment variables through `lookup`. Empty values count as unset.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("REPO_PATH") {
            self.repo_path = PathBuf::from(v);
        }
        if let Some(v) = get("WORKING_DIR") {
            self.working_dir = PathBuf::from(v);
        }
        if let Some(v) = get("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("WORKSPACE") {
            self.workspace = v;
        }
        if let Some(v) = get("REPO_NAME") {
            self.repo_name = Some(v);
        }
        if let Some(v) = get("LLM_MODEL") {
            self.llm_model = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding_model = v;
        }
        if let Some(v) = get("API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = get("LLM_BASE_URL") {
            self.llm_base_url = v;
        }
        if let Some(v) = get("ENGINE_URL") {
            self.engine_url = v;
        }
        if let Some(v) = get("ENGINE_API_KEY") {
            self.engine_api_key = Some(v);
        }
        if let Some(v) = get("CODE_EXTENSIONS") {
            self.code_extensions = split_list(&v);
        }
        if let Some(v) = get("EXCLUDE_PATTERNS") {
            self.exclude_patterns = split_list(&v);
        }
        if let Some(v) = get("MIN_FILE_SIZE") {
            self.min_file_size = parse_env("MIN_FILE_SIZE", &v)?;
        }
        if let Some(v) = get("BATCH_REPORT_INTERVAL") {
            self.batch_report_interval = parse_env("BATCH_REPORT_INTERVAL", &v)?;
        }
        if let Some(v) = get("MAX_PARALLEL_INSERT") {
            self.max_parallel_insert = parse_env("MAX_PARALLEL_INSERT", &v)?;
        }
        if let Some(v) = get("LLM_MODEL_MAX_ASYNC") {
            self.llm_model_max_async = parse_env("LLM_MODEL_MAX_ASYNC", &v)?;
        }
        if let Some(v) = get("EMBEDDING_FUNC_MAX_ASYNC") {
            self.embedding_func_max_async = parse_env("EMBEDDING_FUNC_MAX_ASYNC", &v)?;
        }
        if let Some(v) = get("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env("REQUEST_TIMEOUT_SECS", &v)?;
        }

        Ok(self)
    }

    /// Apply CLI overrides on top of everything else.
    pub fn apply_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(p) = &overrides.repo_path {
            self.repo_path = p.clone();
        }
        if let Some(p) = &overrides.working_dir {
            self.working_dir = p.clone();
        }
        if let Some(p) = &overrides.output_dir {
            self.output_dir = p.clone();
        }
        if let Some(m) = &overrides.llm_model {
            self.llm_model = m.clone();
        }
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// Fails when the repository root is missing or a limit is out of range.
    /// Creates the working, workspace-storage and output directories, and
    /// resolves the repository display name.
    pub fn validate(self) -> Result<Settings> {
        if !self.repo_path.is_dir() {
            return Err(RepoWikiError::config(format!(
                "repository path does not exist: {}",
                self.repo_path.display()
            )));
        }

        for (name, value) in [
            ("batch_report_interval", self.batch_report_interval),
            ("max_parallel_insert", self.max_parallel_insert),
            ("llm_model_max_async", self.llm_model_max_async),
            ("embedding_func_max_async", self.embedding_func_max_async),
        ] {
            if value == 0 {
                return Err(RepoWikiError::config(format!("{name} must be at least 1")));
            }
        }

        if self.workspace.contains(['/', '\\']) || self.workspace == ".." {
            return Err(RepoWikiError::config(format!(
                "workspace must be a plain name, got {:?}",
                self.workspace
            )));
        }

        let engine_url = parse_url("engine_url", &self.engine_url)?;
        let llm_base_url = parse_url("llm_base_url", &self.llm_base_url)?;

        let code_extensions: BTreeSet<String> = self
            .code_extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        if code_extensions.is_empty() {
            return Err(RepoWikiError::config("code_extensions must not be empty"));
        }

        let storage_dir = self.working_dir.join(&self.workspace);
        for dir in [&self.working_dir, &storage_dir, &self.output_dir] {
            std::fs::create_dir_all(dir).map_err(|e| RepoWikiError::io(dir, e))?;
        }

        let repo_name = match self.repo_name {
            Some(name) => name,
            None => detect_repo_name(&self.repo_path),
        };

        tracing::debug!(
            repo = %self.repo_path.display(),
            %repo_name,
            storage = %storage_dir.display(),
            "configuration validated"
        );

        Ok(Settings {
            repo_path: self.repo_path,
            working_dir: self.working_dir,
            storage_dir,
            output_dir: self.output_dir,
            workspace: self.workspace,
            repo_name,
            llm_model: self.llm_model,
            embedding_model: self.embedding_model,
            api_key: self.api_key,
            llm_base_url,
            engine_url,
            engine_api_key: self.engine_api_key,
            code_extensions,
            exclude_patterns: self.exclude_patterns,
            min_file_size: self.min_file_size,
            batch_report_interval: self.batch_report_interval,
            max_parallel_insert: self.max_parallel_insert,
            llm_model_max_async: self.llm_model_max_async,
            embedding_func_max_async: self.embedding_func_max_async,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }
}

// ---------------------------------------------------------------------------
// Validated settings
// ---------------------------------------------------------------------------

/// Validated, read-only settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub repo_path: PathBuf,
    pub working_dir: PathBuf,
    /// `<working_dir>/<workspace>`.
    pub storage_dir: PathBuf,
    pub output_dir: PathBuf,
    pub workspace: String,
    /// Display name used in the wiki's root index.
    pub repo_name: String,
    pub llm_model: String,
    pub embedding_model: String,
    pub api_key: String,
    pub llm_base_url: Url,
    pub engine_url: Url,
    pub engine_api_key: Option<String>,
    /// Lowercase extensions without the leading dot.
    pub code_extensions: BTreeSet<String>,
    pub exclude_patterns: Vec<String>,
    pub min_file_size: u64,
    pub batch_report_interval: usize,
    pub max_parallel_insert: usize,
    pub llm_model_max_async: usize,
    pub embedding_func_max_async: usize,
    pub request_timeout: Duration,
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

/// Get the path to the user config file (`~/.repowiki/repowiki.toml`).
pub fn config_file_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load a config file from a specific path, filling missing keys with defaults.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| RepoWikiError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RepoWikiError::config(format!("failed to parse {}: {e}", path.display())))
}

// ---------------------------------------------------------------------------
// Repository name detection
// ---------------------------------------------------------------------------

/// Derive a display name for the repository. Never fails.
///
/// Prefers the last segment of the `origin` remote URL; falls back to the
/// canonical directory name.
pub fn detect_repo_name(repo_path: &Path) -> String {
    if let Some(name) = git_remote_url(repo_path).and_then(|url| repo_name_from_remote(&url)) {
        return name;
    }

    std::fs::canonicalize(repo_path)
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "repository".to_string())
}

/// Extract the repository name from a remote URL
/// (`https://host/org/name.git`, `git@host:org/name.git`, ...).
pub fn repo_name_from_remote(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    (!name.is_empty()).then(|| name.to_string())
}

fn git_remote_url(repo_path: &Path) -> Option<String> {
    let mut child = Command::new("git")
        .args(["remote", "get-url", "origin"])
        .current_dir(repo_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let deadline = Instant::now() + GIT_REMOTE_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => {
                let mut out = String::new();
                child.stdout.take()?.read_to_string(&mut out).ok()?;
                return Some(out);
            }
            Ok(Some(_)) => return None,
            Ok(None) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(20));
            }
            _ => {
                tracing::debug!("git remote lookup timed out");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_env<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| RepoWikiError::config(format!("{key}={raw:?} is not a valid number: {e}")))
}

fn parse_url(name: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| RepoWikiError::config(format!("{name} {raw:?}: {e}")))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rw-config-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.workspace, "main");
        assert_eq!(config.min_file_size, 50);
        assert_eq!(config.max_parallel_insert, 48);
        assert_eq!(config.llm_model_max_async, 96);
        assert_eq!(config.embedding_func_max_async, 48);
        assert_eq!(config.api_key, "oauth2");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
workspace = "docs"
code_extensions = ["rs", ".toml"]
"#,
        )
        .expect("parse");
        assert_eq!(config.workspace, "docs");
        assert_eq!(config.code_extensions, vec!["rs", ".toml"]);
        assert_eq!(config.batch_report_interval, 10);
    }

    #[test]
    fn env_overrides_defaults_and_overrides_win() {
        let config = Config::default()
            .apply_env(env(&[
                ("WORKSPACE", "feature"),
                ("LLM_MODEL", "env-model"),
                ("MIN_FILE_SIZE", "120"),
                ("CODE_EXTENSIONS", "rs, md ,"),
                ("REPO_NAME", ""),
            ]))
            .unwrap()
            .apply_overrides(&ConfigOverrides {
                llm_model: Some("flag-model".into()),
                ..Default::default()
            });

        assert_eq!(config.workspace, "feature");
        assert_eq!(config.llm_model, "flag-model");
        assert_eq!(config.min_file_size, 120);
        assert_eq!(config.code_extensions, vec!["rs", "md"]);
        // Empty env values are ignored.
        assert_eq!(config.repo_name, None);
    }

    #[test]
    fn invalid_env_integer_is_config_error() {
        let err = Config::default()
            .apply_env(env(&[("MAX_PARALLEL_INSERT", "lots")]))
            .unwrap_err();
        assert!(matches!(err, RepoWikiError::Config { .. }));
        assert!(err.to_string().contains("MAX_PARALLEL_INSERT"));
    }

    #[test]
    fn validate_rejects_missing_repo() {
        let config = Config {
            repo_path: PathBuf::from("/definitely/not/a/repo/path"),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("repository path does not exist"));
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let tmp = temp_dir();
        let config = Config {
            repo_path: tmp.clone(),
            working_dir: tmp.join("work"),
            output_dir: tmp.join("out"),
            llm_model_max_async: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("llm_model_max_async"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn validate_creates_directories_and_uses_explicit_name() {
        let tmp = temp_dir();
        let config = Config {
            repo_path: tmp.clone(),
            working_dir: tmp.join("work"),
            output_dir: tmp.join("out/wiki"),
            workspace: "ws".into(),
            repo_name: Some("My Project".into()),
            code_extensions: vec![".PY".into(), "md".into()],
            ..Default::default()
        };

        let settings = config.validate().unwrap();
        assert!(tmp.join("work/ws").is_dir());
        assert!(tmp.join("out/wiki").is_dir());
        assert_eq!(settings.storage_dir, tmp.join("work/ws"));
        assert_eq!(settings.repo_name, "My Project");
        assert!(settings.code_extensions.contains("py"));
        assert!(settings.code_extensions.contains("md"));

        // Idempotent.
        let again = Config {
            repo_path: tmp.clone(),
            working_dir: tmp.join("work"),
            output_dir: tmp.join("out/wiki"),
            ..Default::default()
        };
        assert!(again.validate().is_ok());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn repo_name_falls_back_to_directory_name() {
        let tmp = temp_dir();
        let repo = tmp.join("plain-checkout");
        std::fs::create_dir_all(&repo).unwrap();

        // Not a git repository (temp dirs are outside any work tree).
        assert_eq!(detect_repo_name(&repo), "plain-checkout");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn remote_url_parsing() {
        assert_eq!(
            repo_name_from_remote("https://github.com/acme/widgets.git\n").as_deref(),
            Some("widgets")
        );
        assert_eq!(
            repo_name_from_remote("git@github.com:acme/widgets.git").as_deref(),
            Some("widgets")
        );
        assert_eq!(
            repo_name_from_remote("https://example.com/acme/tools/").as_deref(),
            Some("tools")
        );
        assert_eq!(repo_name_from_remote("  "), None);
    }
}
