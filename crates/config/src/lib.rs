//! Layered configuration for the tome CLI.
//!
//! Settings merge three layers, weakest first: built-in defaults (rooted in
//! the platform's project directories), an optional TOML file, and `TOME_`
//! prefixed environment variables. Nested fields use `__` in the
//! environment, e.g. `TOME_SCORER__COVER_WEIGHT=0.5`.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::OptionExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tome_batch::RetryPolicy;
use tome_ledger::RunMode;
use tome_match::ScorerConfig;

const ENV_PREFIX: &str = "TOME_";
const CONFIG_FILE: &str = "config.toml";

/// Everything the CLI needs to run, fully resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Ledger database file.
    pub ledger_path: PathBuf,
    /// Persisted catalog index (JSON).
    pub index_cache_path: PathBuf,
    /// Where run summaries are written.
    pub output_dir: PathBuf,
    /// Catalog index freshness window.
    pub index_ttl_hours: u32,
    /// Album cache freshness window.
    pub album_ttl_days: u32,
    /// Worker pool size when `--workers` is not given.
    pub num_workers: u32,
    /// Run mode when `--mode` is not given.
    pub mode: RunMode,
    pub scorer: ScorerConfig,
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        // Falls back to the current directory on platforms without a home;
        // `load` reports that case properly.
        let (data, cache) = match ProjectDirs::from("", "", "tome") {
            Some(dirs) => (dirs.data_dir().to_path_buf(), dirs.cache_dir().to_path_buf()),
            None => (PathBuf::from("."), PathBuf::from(".")),
        };
        Self {
            ledger_path: data.join("ledger.db"),
            index_cache_path: cache.join("catalog_index.json"),
            output_dir: data.join("reports"),
            index_ttl_hours: 24,
            album_ttl_days: 7,
            num_workers: 4,
            mode: RunMode::Batch,
            scorer: ScorerConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Settings {
    /// Load settings, merging defaults, `file` (or the platform config file
    /// when `None`) and the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        figment = match file {
            // An explicitly named file must exist.
            Some(path) => figment.merge(Toml::file_exact(path)),
            None => {
                let dirs = ProjectDirs::from("", "", "tome").ok_or_raise(|| ErrorKind::ProjectDirs)?;
                figment.merge(Toml::file(dirs.config_dir().join(CONFIG_FILE)))
            },
        };
        let settings: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|err| exn::Exn::from(ErrorKind::Invalid(err.to_string())))?;
        settings.validate()?;
        tracing::debug!(ledger = %settings.ledger_path.display(), "configuration loaded");
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            exn::bail!(ErrorKind::Invalid("num_workers must be at least 1".to_string()));
        }
        if self.index_ttl_hours == 0 || self.album_ttl_days == 0 {
            exn::bail!(ErrorKind::Invalid("cache TTLs must be non-zero".to_string()));
        }
        let weights = [
            self.scorer.cover_weight,
            self.scorer.volume_weight,
            self.scorer.publisher_weight,
            self.scorer.year_weight,
        ];
        if weights.iter().any(|w| *w < 0.0) {
            exn::bail!(ErrorKind::Invalid("scorer weights must be non-negative".to_string()));
        }
        if !(0.0..=1.0).contains(&self.scorer.accept_threshold) {
            exn::bail!(ErrorKind::Invalid("accept_threshold must be within [0, 1]".to_string()));
        }
        if !(0.0..=100.0).contains(&self.scorer.cover_floor) {
            exn::bail!(ErrorKind::Invalid("cover_floor must be within [0, 100]".to_string()));
        }
        if self.scorer.year_tolerance < 0 {
            exn::bail!(ErrorKind::Invalid("year_tolerance must be non-negative".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.num_workers, 4);
        assert_eq!(settings.mode, RunMode::Batch);
    }

    #[test]
    fn test_file_layer_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "tome.toml",
                r#"
                    num_workers = 8
                    mode = "strict"

                    [scorer]
                    accept_threshold = 0.8
                "#,
            )?;
            let settings = Settings::load(Some(Path::new("tome.toml"))).unwrap();
            assert_eq!(settings.num_workers, 8);
            assert_eq!(settings.mode, RunMode::Strict);
            assert_eq!(settings.scorer.accept_threshold, 0.8);
            // Untouched fields keep their defaults.
            assert_eq!(settings.album_ttl_days, 7);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("tome.toml", "num_workers = 8")?;
            jail.set_env("TOME_NUM_WORKERS", "2");
            jail.set_env("TOME_SCORER__COVER_WEIGHT", "0.5");
            let settings = Settings::load(Some(Path::new("tome.toml"))).unwrap();
            assert_eq!(settings.num_workers, 2);
            assert_eq!(settings.scorer.cover_weight, 0.5);
            Ok(())
        });
    }

    #[test]
    fn test_out_of_range_scorer_knobs_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("tome.toml", "[scorer]\ncover_floor = 101.0")?;
            assert!(Settings::load(Some(Path::new("tome.toml"))).is_err());
            Ok(())
        });
        figment::Jail::expect_with(|jail| {
            jail.create_file("tome.toml", "[scorer]\nyear_tolerance = -1")?;
            assert!(Settings::load(Some(Path::new("tome.toml"))).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_zero_workers_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("tome.toml", "num_workers = 0")?;
            assert!(Settings::load(Some(Path::new("tome.toml"))).is_err());
            Ok(())
        });
    }
}
