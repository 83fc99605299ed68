use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::AnalyzerKind;
use crate::charts::ChartTheme;

/// Audit entries kept in the config file.
const AUDIT_LOG_LIMIT: usize = 1000;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub details: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: impl Into<String>, details: impl Into<String>) {
        self.entries.push(AuditEntry {
            timestamp: Utc::now(),
            action: action.into(),
            details: details.into(),
        });

        if self.entries.len() > AUDIT_LOG_LIMIT {
            self.entries.drain(0..self.entries.len() - AUDIT_LOG_LIMIT);
        }
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppSettings {
    /// SQLite file holding stored analyses and reports. Defaults to `{base}/gurney.db`.
    pub database_path: Option<PathBuf>,
    /// Where archives are unpacked for report extraction. Defaults to `{base}/scratch`.
    pub scratch_dir: Option<PathBuf>,
    /// Zero-based row holding the column labels in spreadsheet inputs
    pub spreadsheet_header_row: usize,
    /// Analyzers run by default, in archive order
    pub analyzers: Vec<AnalyzerKind>,
    pub chart_theme: ChartTheme,
    /// Prefix of the PDF report title; the analysis name is appended
    pub report_title: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            database_path: None,
            scratch_dir: None,
            spreadsheet_header_row: 0,
            analyzers: AnalyzerKind::ALL.to_vec(),
            chart_theme: ChartTheme::default(),
            report_title: "Informe del Análisis".to_owned(),
        }
    }
}

impl AppSettings {
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| crate::utils::standard_paths().database_path)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| crate::utils::standard_paths().scratch_dir)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub settings: AppSettings,
    pub audit_log: AuditLog,
}

impl AppConfig {
    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    pub fn log_event(&mut self, action: impl Into<String>, details: impl Into<String>) {
        self.audit_log.push(action, details);
    }
}

pub fn get_config_path() -> PathBuf {
    crate::utils::standard_paths().base_dir.join("config.json")
}

/// Loads the config at the standard location, falling back to defaults.
pub fn load_app_config() -> AppConfig {
    load_app_config_from(&get_config_path())
}

/// Loads a config file; a missing or unreadable file yields defaults.
pub fn load_app_config_from(path: &Path) -> AppConfig {
    if path.exists() {
        match std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|content| serde_json::from_str::<AppConfig>(&content).map_err(Into::into))
        {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("Ignoring unreadable config {}: {e}", path.display());
            }
        }
    }

    AppConfig::default()
}

pub fn save_app_config(config: &AppConfig) -> Result<()> {
    save_app_config_to(config, &get_config_path())
}

pub fn save_app_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config {}", path.display()))?;
    Ok(())
}

/// Appends an audit entry to the persisted config.
pub fn log_event(action: &str, details: &str) {
    let mut config = load_app_config();
    config.log_event(action, details);
    if let Err(e) = save_app_config(&config) {
        tracing::warn!("Failed to persist audit entry '{action}': {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_yields_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let config = load_app_config_from(&dir.path().join("absent.json"));
        assert_eq!(config.settings.spreadsheet_header_row, 0);
        assert_eq!(config.settings.analyzers, AnalyzerKind::ALL.to_vec());
    }

    #[test]
    fn test_config_roundtrip() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.settings.spreadsheet_header_row = 3;
        config.settings.analyzers = vec![AnalyzerKind::Clinical];
        config.log_event("Analysis", "stored #1");
        save_app_config_to(&config, &path)?;

        let loaded = load_app_config_from(&path);
        assert_eq!(loaded.settings().spreadsheet_header_row, 3);
        assert_eq!(loaded.settings().analyzers, vec![AnalyzerKind::Clinical]);
        assert_eq!(loaded.audit_log().len(), 1);
        Ok(())
    }

    #[test]
    fn test_partial_config_fills_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"settings": {"spreadsheet_header_row": 2}}"#)?;

        let loaded = load_app_config_from(&path);
        assert_eq!(loaded.settings.spreadsheet_header_row, 2);
        assert_eq!(loaded.settings.report_title, "Informe del Análisis");
        assert!(loaded.audit_log.is_empty());
        Ok(())
    }

    #[test]
    fn test_audit_log_is_bounded() {
        let mut log = AuditLog::new();
        for i in 0..(AUDIT_LOG_LIMIT + 5) {
            log.push("Run", format!("#{i}"));
        }
        assert_eq!(log.len(), AUDIT_LOG_LIMIT);
        assert_eq!(
            log.entries().first().map(|e| e.details.as_str()),
            Some("#5")
        );
    }
}
