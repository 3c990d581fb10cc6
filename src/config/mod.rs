//! Config loading (C11): `lempicka.toml` merged under CLI flags, for
//! tunables that don't belong on the command line every time.

use std::path::PathBuf;

use serde::Deserialize;

use crate::runner::SyncOptions;

/// On-disk configuration, all fields optional so a partial file only
/// overrides what it names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LempickaConfig {
    pub continue_on_error: Option<bool>,
    pub retry_count: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub small_file_threshold_mb: Option<u64>,
    pub max_parallel_small_files: Option<usize>,
    /// Directory under which journal files are placed when the CLI doesn't
    /// pass `--journal-path` explicitly.
    pub journal_dir: Option<PathBuf>,
}

impl LempickaConfig {
    /// Load `lempicka.toml` from `dir` if present. Absence is not an error
    /// — every field just stays `None`, same as the CLI never having seen
    /// the flag.
    pub fn load_from_dir(dir: &std::path::Path) -> Result<Self, ConfigError> {
        let path = dir.join("lempicka.toml");
        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).map_err(|err| ConfigError::Parse {
                path: path.clone(),
                message: err.to_string(),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Read {
                path,
                message: err.to_string(),
            }),
        }
    }

    /// Merge this file's values under defaults, then let `cli` override
    /// anything it explicitly set. Precedence: CLI > file > defaults.
    pub fn merge_into(&self, cli: &CliOverrides) -> SyncOptions {
        let defaults = SyncOptions::default();
        SyncOptions {
            continue_on_error: cli.continue_on_error.or(self.continue_on_error).unwrap_or(defaults.continue_on_error),
            retry_count: cli.retry_count.or(self.retry_count).unwrap_or(defaults.retry_count),
            retry_base_delay_ms: cli.retry_base_delay_ms.or(self.retry_base_delay_ms).unwrap_or(defaults.retry_base_delay_ms),
            small_file_threshold_bytes: cli
                .small_file_threshold_mb
                .or(self.small_file_threshold_mb)
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.small_file_threshold_bytes),
            max_parallel_small_files: cli.max_parallel_small_files.or(self.max_parallel_small_files).unwrap_or(defaults.max_parallel_small_files),
            ..defaults
        }
    }

    pub fn journal_dir(&self, cli_journal_dir: Option<PathBuf>) -> Option<PathBuf> {
        cli_journal_dir.or_else(|| self.journal_dir.clone())
    }
}

/// The subset of CLI flags that can override `LempickaConfig` values;
/// `None` means "not passed", not "disabled".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub continue_on_error: Option<bool>,
    pub retry_count: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub small_file_threshold_mb: Option<u64>,
    pub max_parallel_small_files: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config at {path:?}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("parsing config at {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}
