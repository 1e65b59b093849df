use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::process::normalize::Admission;
use crate::process::utils::TruthySet;

/// Default report suffix every snapshot name must end with.
pub const DEFAULT_SUFFIX: &str = "_AO_GENERAL.txt";
/// Default sub-period used by the two-snapshot comparison.
pub const DEFAULT_PERIOD_TAG: &str = "Semana 01";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Snapshots are files in a local directory.
    #[default]
    Fs,
    /// Snapshots are links on a remote directory index page.
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Directory (fs) or index URL (http).
    pub root: String,
    /// Sub-directory or relative path under `root`; empty means `root` itself.
    pub collection: String,
    pub suffix: String,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    /// Snapshots fetched at once.
    pub max_concurrency: usize,
    /// How long fetched bytes stay fresh; 0 disables caching.
    pub cache_ttl_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Fs,
            root: "./snapshots".to_string(),
            collection: String::new(),
            suffix: DEFAULT_SUFFIX.to_string(),
            max_retries: 3,
            initial_backoff_ms: 500,
            max_concurrency: 4,
            cache_ttl_secs: 3600,
        }
    }
}

impl SourceConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Column names as they appear in the export header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub level: String,
    pub element: String,
    pub status: String,
    pub category: String,
    pub period: String,
    pub executed_on: String,
    pub concrete: String,
    pub formwork: String,
    pub rebar: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            level: "Nivel".into(),
            element: "Elementos".into(),
            status: "Hormigonado".into(),
            category: "FC_CON_ESTADO".into(),
            period: "FC_CON_TRISEMANAL".into(),
            executed_on: "FC_CON_FECHA EJECUCION".into(),
            concrete: "VolumenHA".into(),
            formwork: "AreaMoldaje".into(),
            rebar: "Cuantia".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Sub-period the two-snapshot comparison is restricted to.
    pub period_tag: Option<String>,
    /// Only the most recent N snapshots enter the series view.
    pub series_last: Option<usize>,
    pub admission: Admission,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            period_tag: Some(DEFAULT_PERIOD_TAG.to_string()),
            series_last: None,
            admission: Admission::Lenient,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub columns: ColumnNames,
    pub truthy: TruthySet,
    pub compare: CompareConfig,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            columns: ColumnNames::default(),
            truthy: TruthySet::default(),
            compare: CompareConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from an optional YAML file, then apply `AVANCE_*` environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let text = fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                Self::from_yaml_str(&text).with_context(|| format!("parsing config {}", p.display()))?
            }
            None => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kind) = lookup("AVANCE_SOURCE_KIND") {
            self.source.kind = match kind.trim().to_lowercase().as_str() {
                "fs" => SourceKind::Fs,
                "http" => SourceKind::Http,
                other => bail!("AVANCE_SOURCE_KIND must be `fs` or `http`, got `{}`", other),
            };
        }
        if let Some(root) = lookup("AVANCE_ROOT") {
            self.source.root = root;
        }
        if let Some(collection) = lookup("AVANCE_COLLECTION") {
            self.source.collection = collection;
        }
        if let Some(ttl) = lookup("AVANCE_CACHE_TTL_SECS") {
            self.source.cache_ttl_secs = ttl
                .trim()
                .parse()
                .with_context(|| format!("AVANCE_CACHE_TTL_SECS is not a number: `{}`", ttl))?;
        }
        if let Some(level) = lookup("AVANCE_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_the_export_layout() {
        let cfg = Config::default();
        assert_eq!(cfg.source.suffix, "_AO_GENERAL.txt");
        assert_eq!(cfg.source.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(cfg.columns.level, "Nivel");
        assert_eq!(cfg.compare.period_tag.as_deref(), Some("Semana 01"));
        assert!(cfg.truthy.classify(Some("Sí")));
    }

    #[test]
    fn partial_yaml_keeps_defaults() -> Result<()> {
        let cfg = Config::from_yaml_str(
            r#"
source:
  kind: http
  root: "https://example.org/reportes/"
  cache_ttl_secs: 60
columns:
  rebar: "CuantiaKg"
truthy: ["x", "Sí"]
compare:
  period_tag: "Semana 02"
  admission: strict
"#,
        )?;
        assert_eq!(cfg.source.kind, SourceKind::Http);
        assert_eq!(cfg.source.cache_ttl_secs, 60);
        assert_eq!(cfg.source.max_retries, 3);
        assert_eq!(cfg.columns.rebar, "CuantiaKg");
        assert_eq!(cfg.columns.concrete, "VolumenHA");
        assert!(cfg.truthy.classify(Some("X")));
        assert!(!cfg.truthy.classify(Some("si")));
        assert_eq!(cfg.compare.period_tag.as_deref(), Some("Semana 02"));
        assert_eq!(cfg.compare.admission, Admission::Strict);
        Ok(())
    }

    #[test]
    fn env_overrides_win() -> Result<()> {
        let env: HashMap<&str, &str> = [
            ("AVANCE_SOURCE_KIND", "HTTP"),
            ("AVANCE_ROOT", "https://example.org/"),
            ("AVANCE_CACHE_TTL_SECS", "0"),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()))?;
        assert_eq!(cfg.source.kind, SourceKind::Http);
        assert_eq!(cfg.source.root, "https://example.org/");
        assert_eq!(cfg.source.cache_ttl_secs, 0);

        let bad: HashMap<&str, &str> = [("AVANCE_SOURCE_KIND", "ftp")].into_iter().collect();
        assert!(cfg.apply_overrides(|k| bad.get(k).map(|v| v.to_string())).is_err());
        Ok(())
    }

    #[test]
    fn load_reads_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "log_level: debug\nsource:\n  collection: semanal")?;
        let cfg = Config::load(Some(file.path()))?;
        assert_eq!(cfg.source.collection, "semanal");
        // AVANCE_LOG_LEVEL may be set in the environment running the tests
        if std::env::var("AVANCE_LOG_LEVEL").is_err() {
            assert_eq!(cfg.log_level, "debug");
        }
        Ok(())
    }
}
