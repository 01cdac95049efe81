//! Settings file loading
//!
//! Settings live in a TOML file. Every section and field is optional; missing
//! values take their defaults.
//!
//! ```toml
//! explain_timeout_seconds = 10
//! max_runs = 200
//!
//! [advisor]
//! large_scan_rows = 50000
//!
//! [benchmark]
//! benchmark_runs = 20
//!
//! [significance]
//! significant = 0.01
//! ```

use crate::comparison::SignificanceThresholds;
use crate::config::{BenchmarkConfig, DEFAULT_MAX_RUNS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqltrace_analyzer::AdvisorConfig;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSettings {
    /// Timeout for a single explain call
    pub explain_timeout_seconds: u64,
    /// Most warmup or benchmark runs any request may ask for
    pub max_runs: u32,
    pub advisor: AdvisorConfig,
    pub benchmark: BenchmarkConfig,
    pub significance: SignificanceThresholds,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            explain_timeout_seconds: 30,
            max_runs: DEFAULT_MAX_RUNS,
            advisor: AdvisorConfig::default(),
            benchmark: BenchmarkConfig::default(),
            significance: SignificanceThresholds::default(),
        }
    }
}

impl TraceSettings {
    /// Location of the user's settings file
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .context("Could not determine config directory")
            .map(|p| p.join("sqltrace").join("settings.toml"))
    }

    /// Loads and validates a settings file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid settings file: {:?}", path))
    }

    /// Loads the default settings file, or defaults when it does not exist
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            tracing::debug!(path = ?path, "no settings file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let settings: Self = toml::from_str(contents).context("Failed to parse settings TOML")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize settings")
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_runs == 0 {
            anyhow::bail!("max_runs must be at least 1");
        }
        self.benchmark.validate_with_limit(self.max_runs)?;
        if self.explain_timeout_seconds == 0 {
            anyhow::bail!("explain_timeout_seconds must be greater than 0");
        }
        let SignificanceThresholds {
            highly_significant,
            significant,
            marginally_significant,
        } = self.significance;
        if !(0.0 < highly_significant
            && highly_significant <= significant
            && significant <= marginally_significant
            && marginally_significant <= 1.0)
        {
            anyhow::bail!(
                "significance cutoffs must satisfy 0 < highly_significant <= significant <= marginally_significant <= 1"
            );
        }
        Ok(())
    }
}
