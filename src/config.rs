// Tool configuration.
//
// Defaults first, then an optional config file in the platform config
// directory, then OBLIVION_* environment variables. Command-line flags
// always win over all three; the CLI applies them on top of the loaded
// settings.

use crate::ProgressMode;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whether erase commands wait for completion or return after start.
    pub progress_mode: ConfiguredProgressMode,
    /// Colored terminal output.
    pub color: bool,
    /// Default pass count for overwrite-style methods.
    pub overwrite_passes: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            progress_mode: ConfiguredProgressMode::Blocking,
            color: true,
            overwrite_passes: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfiguredProgressMode {
    Blocking,
    Poll,
}

impl From<ConfiguredProgressMode> for ProgressMode {
    fn from(mode: ConfiguredProgressMode) -> Self {
        match mode {
            ConfiguredProgressMode::Blocking => ProgressMode::Blocking,
            ConfiguredProgressMode::Poll => ProgressMode::PollForProgress,
        }
    }
}

impl Settings {
    /// Load settings from the default file location plus the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("progress_mode", "blocking")?
            .set_default("color", true)?
            .set_default("overwrite_passes", 1i64)?;

        if let Some(path) = path {
            // Missing file is fine; a present-but-broken file is an error
            // the user should see rather than silently falling back.
            builder = builder.add_source(File::from(path).required(false));
        }

        builder
            .add_source(Environment::with_prefix("OBLIVION"))
            .build()
            .context("failed to load configuration")?
            .try_deserialize()
            .context("invalid configuration values")
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "oblivion").map(|dirs| dirs.config_dir().join("oblivion.toml"))
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_a_file() {
        let settings = Settings::load_from(None).unwrap();
        assert_eq!(settings.progress_mode, ConfiguredProgressMode::Blocking);
        assert!(settings.color);
        assert_eq!(settings.overwrite_passes, 1);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oblivion.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "progress_mode = \"poll\"").unwrap();
        writeln!(file, "overwrite_passes = 3").unwrap();

        let settings = Settings::load_from(Some(path)).unwrap();
        assert_eq!(settings.progress_mode, ConfiguredProgressMode::Poll);
        assert_eq!(settings.overwrite_passes, 3);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let settings =
            Settings::load_from(Some(PathBuf::from("/nonexistent/oblivion.toml"))).unwrap();
        assert!(settings.color);
    }

    #[test]
    fn progress_mode_converts() {
        assert_eq!(
            ProgressMode::from(ConfiguredProgressMode::Poll),
            ProgressMode::PollForProgress
        );
    }
}
