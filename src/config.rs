use crate::access_path::AccessPath;
use crate::error::{FlatJsonError, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SPARSITY_FACTOR: f64 = 0.9;
pub const DEFAULT_NULL_FACTOR: f64 = 0.3;
pub const DEFAULT_PAGE_ROWS: usize = 4096;

const SPARSITY_ENV: &str = "FLATJSON_SPARSITY_FACTOR";
const NULL_FACTOR_ENV: &str = "FLATJSON_NULL_FACTOR";

static PROCESS_DEFAULT: OnceCell<FlatJsonConfig> = OnceCell::new();

/// Thresholds driving flat JSON schema inference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatJsonConfig {
    /// Minimum fraction of non-null rows a field must appear in to get its own sub-column
    #[serde(default = "default_sparsity_factor")]
    pub sparsity_factor: f64,

    /// Minimum fraction of SQL-NULL rows before a nulls marker sub-column is written
    #[serde(default = "default_null_factor")]
    pub null_factor: f64,
}

fn default_sparsity_factor() -> f64 {
    DEFAULT_SPARSITY_FACTOR
}

fn default_null_factor() -> f64 {
    DEFAULT_NULL_FACTOR
}

impl Default for FlatJsonConfig {
    fn default() -> Self {
        FlatJsonConfig {
            sparsity_factor: DEFAULT_SPARSITY_FACTOR,
            null_factor: DEFAULT_NULL_FACTOR,
        }
    }
}

impl FlatJsonConfig {
    /// Create a validated config
    pub fn new(sparsity_factor: f64, null_factor: f64) -> Result<Self> {
        let config = FlatJsonConfig {
            sparsity_factor,
            null_factor,
        };
        config.validate()?;
        Ok(config)
    }

    /// Both factors must lie in `[0, 1]`
    pub fn validate(&self) -> Result<()> {
        check_factor("sparsity_factor", self.sparsity_factor)?;
        check_factor("null_factor", self.null_factor)
    }

    /// Defaults overridden by `FLATJSON_SPARSITY_FACTOR` / `FLATJSON_NULL_FACTOR`
    pub fn from_env() -> Result<Self> {
        let mut config = FlatJsonConfig::default();
        if let Some(v) = read_env_factor(SPARSITY_ENV)? {
            config.sparsity_factor = v;
        }
        if let Some(v) = read_env_factor(NULL_FACTOR_ENV)? {
            config.null_factor = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Install the process-wide fallback config. Can only happen once.
    pub fn install_process_default(config: FlatJsonConfig) -> Result<()> {
        config.validate()?;
        PROCESS_DEFAULT.set(config).map_err(|_| {
            FlatJsonError::invalid_argument("process default flat json config already installed")
        })
    }

    /// The process-wide fallback config.
    ///
    /// If nothing was installed, the environment (or the built-in defaults)
    /// is read once and frozen. Invalid environment settings are an error and
    /// nothing is frozen.
    pub fn process_default() -> Result<FlatJsonConfig> {
        PROCESS_DEFAULT
            .get_or_try_init(FlatJsonConfig::from_env)
            .copied()
    }
}

fn check_factor(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(FlatJsonError::invalid_argument(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

fn read_env_factor(key: &str) -> Result<Option<f64>> {
    match std::env::var(key) {
        Ok(raw) => parse_factor(key, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_factor(key: &str, raw: &str) -> Result<f64> {
    let value = raw.trim().parse::<f64>().map_err(|_| {
        FlatJsonError::invalid_argument(format!("{} is not a number: {:?}", key, raw))
    })?;
    check_factor(key, value)?;
    Ok(value)
}

/// Page compression applied by the column store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Lz4,
}

/// Options for a single column write
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Attempt flattening at all; `false` stores one plain JSON sub-column
    pub need_flat: bool,

    /// Explicit thresholds; replaces the process default as a whole
    pub flat_json_config: Option<FlatJsonConfig>,

    /// Paths that must be flattened regardless of sparsity
    pub access_path: Option<AccessPath>,

    /// Maximum rows per page
    pub page_rows: usize,

    pub compression: Compression,

    pub column_id: u32,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            need_flat: false,
            flat_json_config: None,
            access_path: None,
            page_rows: DEFAULT_PAGE_ROWS,
            compression: Compression::Lz4,
            column_id: 0,
        }
    }
}

impl WriterOptions {
    pub fn flat() -> Self {
        WriterOptions {
            need_flat: true,
            ..Default::default()
        }
    }

    pub fn with_config(mut self, config: FlatJsonConfig) -> Self {
        self.flat_json_config = Some(config);
        self
    }

    pub fn with_access_path(mut self, path: AccessPath) -> Self {
        self.access_path = Some(path);
        self
    }

    pub fn with_page_rows(mut self, page_rows: usize) -> Self {
        self.page_rows = page_rows;
        self
    }

    /// The config this write runs with, validated
    pub fn effective_config(&self) -> Result<FlatJsonConfig> {
        let config = match self.flat_json_config {
            Some(config) => config,
            None => FlatJsonConfig::process_default()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_rows == 0 {
            return Err(FlatJsonError::invalid_argument("page_rows must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FlatJsonConfig::default();
        assert_eq!(config.sparsity_factor, 0.9);
        assert_eq!(config.null_factor, 0.3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(FlatJsonConfig::new(1.5, 0.3).unwrap_err().is_invalid_argument());
        assert!(FlatJsonConfig::new(0.5, -0.1).is_err());
        assert!(FlatJsonConfig::new(f64::NAN, 0.3).is_err());
        assert!(FlatJsonConfig::new(0.0, 1.0).is_ok());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: FlatJsonConfig = serde_json::from_str(r#"{"sparsity_factor": 0.5}"#).unwrap();
        assert_eq!(config.sparsity_factor, 0.5);
        assert_eq!(config.null_factor, DEFAULT_NULL_FACTOR);
    }

    #[test]
    fn test_explicit_config_overrides_as_unit() {
        let explicit = FlatJsonConfig::new(0.2, 1.0).unwrap();
        let options = WriterOptions::flat().with_config(explicit);
        assert_eq!(options.effective_config().unwrap(), explicit);
    }

    #[test]
    fn test_parse_env_factor() {
        assert_eq!(parse_factor(SPARSITY_ENV, " 0.25 ").unwrap(), 0.25);
        assert!(parse_factor(SPARSITY_ENV, "2.5").unwrap_err().is_invalid_argument());
        assert!(parse_factor(NULL_FACTOR_ENV, "abc").unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_invalid_explicit_config_rejected() {
        let options = WriterOptions::flat().with_config(FlatJsonConfig {
            sparsity_factor: 2.0,
            null_factor: 0.3,
        });
        assert!(options.effective_config().is_err());
    }
}
