use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::{ReportError, Result};

/// Executive name used when the ledger has no (or an excluded) executive.
pub const UNASSIGNED_EXECUTIVE: &str = "N/A";

/// Maps every executive name containing `pattern` (case-insensitive) to `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveRule {
    pub pattern: String,
    pub name: String,
}

/// Report configuration, read from a JSON file. Every field has a default so
/// a partial file (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Ledger CSV to load.
    pub input: Option<PathBuf>,
    /// Directory receiving exported sheets and summaries.
    pub output_dir: PathBuf,
    /// Field delimiter; detected from the header line when unset.
    pub delimiter: Option<char>,
    pub executive_rules: Vec<ExecutiveRule>,
    /// Executives whose name contains one of these markers are unassigned.
    pub excluded_executive_markers: Vec<String>,
    /// Preferred issuer order when listing the issuers a client buys from.
    pub issuer_order: Vec<String>,
    pub top_shared_limit: usize,
    pub top_n: usize,
    /// Where the filter selection is persisted between runs.
    pub filter_state: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            input: None,
            output_dir: PathBuf::from("reports"),
            delimiter: None,
            executive_rules: Vec::new(),
            excluded_executive_markers: vec!["VENDA EXTERNA".to_string()],
            issuer_order: Vec::new(),
            top_shared_limit: 20,
            top_n: 10,
            filter_state: None,
        }
    }
}

impl ReportConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration from: {:?}", path);
        let file = File::open(path)?;
        let config: ReportConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(d) = self.delimiter {
            if !d.is_ascii() || d == '"' {
                return Err(ReportError::InvalidConfig(format!(
                    "delimiter {:?} must be a single ASCII character other than a quote",
                    d
                )));
            }
        }
        if self.top_n == 0 {
            return Err(ReportError::InvalidConfig("top_n must be at least 1".to_string()));
        }
        if self.top_shared_limit == 0 {
            return Err(ReportError::InvalidConfig(
                "top_shared_limit must be at least 1".to_string(),
            ));
        }
        if let Some(rule) = self.executive_rules.iter().find(|r| r.pattern.trim().is_empty()) {
            return Err(ReportError::InvalidConfig(format!(
                "executive rule for '{}' has an empty pattern",
                rule.name
            )));
        }
        Ok(())
    }

    pub fn delimiter_byte(&self) -> Option<u8> {
        self.delimiter.filter(char::is_ascii).map(|d| d as u8)
    }

    /// Apply exclusion markers and consolidation rules to a normalized
    /// executive name.
    pub fn consolidate_executive(&self, name: &str) -> String {
        let upper = name.to_uppercase();
        if name.trim().is_empty()
            || self
                .excluded_executive_markers
                .iter()
                .any(|m| upper.contains(&m.to_uppercase()))
        {
            return UNASSIGNED_EXECUTIVE.to_string();
        }
        self.executive_rules
            .iter()
            .find(|r| upper.contains(&r.pattern.to_uppercase()))
            .map(|r| r.name.clone())
            .unwrap_or_else(|| name.to_string())
    }
}
