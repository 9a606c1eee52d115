use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, ColumnMapping, DatasetDescriptor};
use crate::domain::Slug;
use crate::error::OwidError;
use crate::grapher::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT, RetryPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "owid-cy.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub include_builtin: bool,
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatasetEntry {
    pub slug: String,
    pub columns: Vec<ColumnEntry>,
    #[serde(default)]
    pub cite: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ColumnEntry {
    Shorthand(String),
    Detailed(ColumnEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ColumnEntryObject {
    pub source: String,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub base_url: String,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub catalog: Catalog,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `owid-cy.json` when present. No file at all means defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, OwidError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| OwidError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| OwidError::ConfigParse(err.to_string()))?;
        tracing::debug!(path = %config_path.display(), "loaded config");

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, OwidError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let mut retry = RetryPolicy::default();
        if let Some(max_retries) = config.max_retries {
            retry.max_retries = max_retries;
        }
        let timeout = config
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        let datasets = config
            .datasets
            .into_iter()
            .map(|entry| {
                let slug: Slug = entry.slug.parse()?;
                let columns = entry
                    .columns
                    .into_iter()
                    .map(|column| match column {
                        ColumnEntry::Shorthand(name) => ColumnMapping::new(name.clone(), name),
                        ColumnEntry::Detailed(obj) => {
                            let target = obj.target.unwrap_or_else(|| obj.source.clone());
                            ColumnMapping::new(obj.source, target)
                        }
                    })
                    .collect();
                let descriptor = DatasetDescriptor::new(slug, columns);
                Ok(match entry.cite {
                    Some(cite) => descriptor.with_citation(cite),
                    None => descriptor,
                })
            })
            .collect::<Result<Vec<_>, OwidError>>()?;

        let catalog = if datasets.is_empty() {
            Catalog::builtin()
        } else if config.include_builtin {
            Catalog::builtin().extend(datasets)?
        } else {
            Catalog::new(datasets)?
        };

        Ok(ResolvedConfig {
            schema_version,
            base_url: config
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            retry,
            timeout,
            catalog,
        })
    }
}
