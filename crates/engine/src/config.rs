use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Report and dashboard tuning. Every table is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub headcount: HeadcountConfig,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Decimal places for kiloliter figures.
    #[serde(default = "default_volume_decimals")]
    pub volume_decimals: u32,
    /// Years shown by the yearly trend when no range is given.
    #[serde(default = "default_trend_years")]
    pub trend_years: u32,
}

fn default_volume_decimals() -> u32 {
    3
}

fn default_trend_years() -> u32 {
    5
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            volume_decimals: default_volume_decimals(),
            trend_years: default_trend_years(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Per-load liters at or above which a load counts as a 12 KL load.
    #[serde(default = "default_large_load")]
    pub large_load_min_liters: i64,
    /// Per-load liters at or above which a load counts as a 6 KL load.
    #[serde(default = "default_small_load")]
    pub small_load_min_liters: i64,
    /// Loading point that supplies campus normal water.
    #[serde(default = "default_normal_loading_point")]
    pub normal_water_loading_point: String,
    /// Loading points that get their own unloading breakdown.
    #[serde(default = "default_breakdown_points")]
    pub loading_point_breakdowns: Vec<String>,
}

fn default_large_load() -> i64 {
    10_000
}

fn default_small_load() -> i64 {
    4_000
}

fn default_normal_loading_point() -> String {
    "Muthu Nagar".to_string()
}

fn default_breakdown_points() -> Vec<String> {
    vec!["Bannari".to_string(), "Varahi".to_string()]
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            large_load_min_liters: default_large_load(),
            small_load_min_liters: default_small_load(),
            normal_water_loading_point: default_normal_loading_point(),
            loading_point_breakdowns: default_breakdown_points(),
        }
    }
}

// ---------------------------------------------------------------------------
// Headcount
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadcountConfig {
    /// Category name fragments that switch drinking-water metrics to the
    /// alternate headcount.
    #[serde(default = "default_alternate_keywords")]
    pub alternate_keywords: Vec<String>,
}

fn default_alternate_keywords() -> Vec<String> {
    vec!["SCHOOL".to_string(), "ACADEMY".to_string()]
}

impl Default for HeadcountConfig {
    fn default() -> Self {
        Self { alternate_keywords: default_alternate_keywords() }
    }
}

// ---------------------------------------------------------------------------
// Parsing + validation
// ---------------------------------------------------------------------------

impl EngineConfig {
    pub fn from_toml(input: &str) -> Result<Self, LedgerError> {
        let config: EngineConfig =
            toml::from_str(input).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        let d = &self.dashboard;
        if d.small_load_min_liters <= 0 {
            return Err(LedgerError::Config(format!(
                "dashboard.small_load_min_liters must be positive, got {}",
                d.small_load_min_liters
            )));
        }
        if d.large_load_min_liters <= d.small_load_min_liters {
            return Err(LedgerError::Config(format!(
                "dashboard.large_load_min_liters ({}) must exceed small_load_min_liters ({})",
                d.large_load_min_liters, d.small_load_min_liters
            )));
        }
        if self.report.volume_decimals > 6 {
            return Err(LedgerError::Config(format!(
                "report.volume_decimals must be at most 6, got {}",
                self.report.volume_decimals
            )));
        }
        if self.report.trend_years == 0 {
            return Err(LedgerError::Config("report.trend_years must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.report.volume_decimals, 3);
        assert_eq!(config.dashboard.large_load_min_liters, 10_000);
        assert_eq!(config.dashboard.small_load_min_liters, 4_000);
        assert_eq!(config.headcount.alternate_keywords, vec!["SCHOOL", "ACADEMY"]);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = EngineConfig::from_toml(
            r#"
[dashboard]
large_load_min_liters = 12000
loading_point_breakdowns = ["Bannari"]

[report]
volume_decimals = 2
"#,
        )
        .unwrap();
        assert_eq!(config.dashboard.large_load_min_liters, 12_000);
        assert_eq!(config.dashboard.small_load_min_liters, 4_000);
        assert_eq!(config.dashboard.normal_water_loading_point, "Muthu Nagar");
        assert_eq!(config.dashboard.loading_point_breakdowns, vec!["Bannari"]);
        assert_eq!(config.report.volume_decimals, 2);
        assert_eq!(config.report.trend_years, 5);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let err = EngineConfig::from_toml(
            "[dashboard]\nlarge_load_min_liters = 3000\nsmall_load_min_liters = 4000\n",
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Config(ref m) if m.contains("must exceed")));
    }

    #[test]
    fn rejects_non_positive_small_threshold() {
        let err =
            EngineConfig::from_toml("[dashboard]\nsmall_load_min_liters = 0\n").unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[test]
    fn rejects_bad_toml() {
        let err = EngineConfig::from_toml("[report\n").unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }
}
