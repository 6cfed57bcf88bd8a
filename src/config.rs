use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::annotate::DEFAULT_GENOMIC_REFERENCE;
use crate::domain::SynapseId;
use crate::error::AnnotatorError;
use crate::manifest::KindErrorPolicy;
use crate::samplesheet::{DEFAULT_SAMPLE_KEY_PATTERN, SampleKeyTransform};
use crate::synapse::DEFAULT_ENDPOINT;

pub const DEFAULT_CONFIG_FILE: &str = "nf-annotate.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub fileview: Option<String>,
    #[serde(default)]
    pub genomic_reference: Option<String>,
    #[serde(default)]
    pub sample_key_pattern: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub on_kind_error: Option<KindErrorPolicy>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub schema: Option<String>,
    pub fileview: Option<SynapseId>,
    pub genomic_reference: String,
    pub sample_key: SampleKeyTransform,
    pub endpoint: String,
    pub on_kind_error: KindErrorPolicy,
}

impl ResolvedConfig {
    pub fn require_fileview(&self) -> Result<&SynapseId, AnnotatorError> {
        self.fileview
            .as_ref()
            .ok_or_else(|| AnnotatorError::ConfigParse("`fileview` is not set".to_string()))
    }

    pub fn require_schema(&self) -> Result<&str, AnnotatorError> {
        self.schema
            .as_deref()
            .ok_or_else(|| AnnotatorError::ConfigParse("`schema` is not set".to_string()))
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            schema: None,
            fileview: None,
            genomic_reference: DEFAULT_GENOMIC_REFERENCE.to_string(),
            sample_key: SampleKeyTransform::default(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            on_kind_error: KindErrorPolicy::default(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `nf-annotate.json` in the current directory when no path
    /// is given. A missing default file is `MissingConfig`.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, AnnotatorError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(AnnotatorError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| AnnotatorError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| AnnotatorError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    /// Like `resolve` but falls back to defaults when the default file is absent.
    pub fn resolve_or_default(path: Option<&str>) -> Result<ResolvedConfig, AnnotatorError> {
        match Self::resolve(path) {
            Err(AnnotatorError::MissingConfig) => Ok(ResolvedConfig::default()),
            other => other,
        }
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, AnnotatorError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(AnnotatorError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let fileview = config
            .fileview
            .as_deref()
            .map(str::parse::<SynapseId>)
            .transpose()?;
        let sample_key = SampleKeyTransform::new(
            config
                .sample_key_pattern
                .as_deref()
                .unwrap_or(DEFAULT_SAMPLE_KEY_PATTERN),
        )?;

        Ok(ResolvedConfig {
            schema_version,
            schema: config.schema,
            fileview,
            genomic_reference: config
                .genomic_reference
                .unwrap_or_else(|| DEFAULT_GENOMIC_REFERENCE.to_string()),
            sample_key,
            endpoint: config
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            on_kind_error: config.on_kind_error.unwrap_or_default(),
        })
    }
}
