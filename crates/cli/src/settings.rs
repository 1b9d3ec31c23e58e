//! `settings.toml`: where the ledger lives and how reports are tuned.
//!
//! ```toml
//! ledger = "/srv/water/campus.aqua"
//!
//! [engine.dashboard]
//! normal_water_loading_point = "Muthu Nagar"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use aqualedger_engine::{EngineConfig, Ledger};
use aqualedger_io::store;
use serde::Deserialize;
use tracing::debug;

use crate::exit_codes::EXIT_CONFIG;
use crate::CliError;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub ledger: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aqualedger")
            .join("settings.toml")
    }

    pub fn default_ledger_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aqualedger")
            .join("ledger.aqua")
    }

    pub fn from_toml(input: &str) -> Result<Self, CliError> {
        let settings: Settings = toml::from_str(input).map_err(|e| CliError {
            code: EXIT_CONFIG,
            message: format!("settings: {e}"),
            hint: None,
        })?;
        settings.engine.validate()?;
        Ok(settings)
    }

    /// Load settings. A path named explicitly must exist; the default one may not.
    pub fn load(explicit: Option<&Path>) -> Result<Self, CliError> {
        let (path, required) = match explicit {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::config_path(), false),
        };
        if !path.exists() {
            if required {
                return Err(CliError {
                    code: EXIT_CONFIG,
                    message: format!("settings file not found: {}", path.display()),
                    hint: Some("drop --config to use the defaults".to_string()),
                });
            }
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path).map_err(|e| CliError {
            code: EXIT_CONFIG,
            message: format!("{}: {e}", path.display()),
            hint: None,
        })?;
        Self::from_toml(&text)
    }

    /// `--ledger` wins over the settings file, which wins over the data dir.
    pub fn into_context(self, ledger_flag: Option<PathBuf>) -> Context {
        let ledger_path = ledger_flag
            .or(self.ledger)
            .unwrap_or_else(Self::default_ledger_path);
        Context { ledger_path, config: self.engine }
    }
}

/// Resolved invocation state shared by every command.
pub struct Context {
    pub ledger_path: PathBuf,
    pub config: EngineConfig,
}

impl Context {
    pub fn load(&self) -> Result<Ledger, CliError> {
        Ok(store::load(&self.ledger_path)?)
    }

    pub fn save(&self, ledger: &Ledger) -> Result<(), CliError> {
        if let Some(parent) = self.ledger_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CliError::store(e.to_string()))?;
        }
        Ok(store::save(ledger, &self.ledger_path)?)
    }

    /// Load, apply one write, save. Nothing is saved when `f` fails.
    pub fn write<T>(&self, f: impl FnOnce(&mut Ledger) -> Result<T, CliError>) -> Result<T, CliError> {
        let mut ledger = self.load()?;
        let out = f(&mut ledger)?;
        self.save(&ledger)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_settings_use_defaults() {
        let s = Settings::from_toml("").unwrap();
        assert!(s.ledger.is_none());
        assert_eq!(s.engine, EngineConfig::default());
    }

    #[test]
    fn engine_table_is_read() {
        let s = Settings::from_toml(
            r#"
ledger = "/tmp/campus.aqua"

[engine.report]
trend_years = 3

[engine.dashboard]
normal_water_loading_point = "Bannari"
"#,
        )
        .unwrap();
        assert_eq!(s.ledger, Some(PathBuf::from("/tmp/campus.aqua")));
        assert_eq!(s.engine.report.trend_years, 3);
        assert_eq!(s.engine.dashboard.normal_water_loading_point, "Bannari");
        assert_eq!(s.engine.dashboard.large_load_min_liters, 10_000);
    }

    #[test]
    fn bad_thresholds_are_config_errors() {
        let err = Settings::from_toml(
            "[engine.dashboard]\nlarge_load_min_liters = 100\nsmall_load_min_liters = 200\n",
        )
        .unwrap_err();
        assert_eq!(err.code, EXIT_CONFIG);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = Settings::from_toml("ledgr = \"x\"\n").unwrap_err();
        assert_eq!(err.code, EXIT_CONFIG);
    }

    #[test]
    fn flag_overrides_settings_ledger() {
        let s = Settings { ledger: Some(PathBuf::from("a.aqua")), engine: EngineConfig::default() };
        let ctx = s.into_context(Some(PathBuf::from("b.aqua")));
        assert_eq!(ctx.ledger_path, PathBuf::from("b.aqua"));
    }

    #[test]
    fn explicit_missing_file_fails() {
        let dir = std::env::temp_dir().join("aqua-settings-missing-test");
        let err = Settings::load(Some(&dir.join("nope.toml"))).unwrap_err();
        assert_eq!(err.code, EXIT_CONFIG);
    }
}
