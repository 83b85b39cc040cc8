use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use isaac_rag::{EmbeddingConfig, EngineSettings, LlmConfig, LlmProvider, DEFAULT_TOP_K};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

pub const CONFIG_ENV: &str = "ISAAC_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "isaac.toml";
pub const DEFAULT_MODEL: &str = "writer/palmyra-med-70b";
pub const DEFAULT_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// Vector store location and collection name one workflow step queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionTarget {
    pub path: PathBuf,
    pub collection: String,
}

impl CollectionTarget {
    pub fn new(path: impl Into<PathBuf>, collection: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            collection: collection.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowCollections {
    #[serde(default = "default_management")]
    pub management: CollectionTarget,
    #[serde(default = "default_antibiotics")]
    pub antibiotics: CollectionTarget,
    #[serde(default = "default_guidelines")]
    pub guidelines: CollectionTarget,
}

impl Default for WorkflowCollections {
    fn default() -> Self {
        Self {
            management: default_management(),
            antibiotics: default_antibiotics(),
            guidelines: default_guidelines(),
        }
    }
}

impl WorkflowCollections {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &CollectionTarget)> {
        [
            ("management", &self.management),
            ("antibiotics", &self.antibiotics),
            ("guidelines", &self.guidelines),
        ]
        .into_iter()
    }
}

fn default_management() -> CollectionTarget {
    CollectionTarget::new("data/sepsis_management_chroma_db", "sepsis_management")
}

fn default_antibiotics() -> CollectionTarget {
    CollectionTarget::new(
        "data/sepsis_antibiotics_chroma_db",
        "sepsis_antibiotic_recommendations",
    )
}

fn default_guidelines() -> CollectionTarget {
    CollectionTarget::new(
        "data/sepsis_guidelines_chroma_db",
        "sepsis_management_guidelines",
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_query_timeout() -> u64 {
    DEFAULT_QUERY_TIMEOUT_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_llm")]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub collections: WorkflowCollections,
    #[serde(default)]
    pub service: ServiceConfig,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            llm: default_llm(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            collections: WorkflowCollections::default(),
            service: ServiceConfig::default(),
        }
    }
}

fn default_llm() -> LlmConfig {
    LlmConfig {
        provider: LlmProvider::OpenAi,
        model: DEFAULT_MODEL.to_string(),
        base_url: DEFAULT_BASE_URL.to_string(),
        ..Default::default()
    }
}

impl AssistantConfig {
    /// `--config`, then `ISAAC_CONFIG`, then `isaac.toml` when it exists.
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = env::var(CONFIG_ENV) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
        fallback.is_file().then_some(fallback)
    }

    pub fn load(path: &Path) -> Result<Self, WorkflowError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            WorkflowError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw).map_err(|e| match e {
            WorkflowError::Config(msg) => {
                WorkflowError::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, WorkflowError> {
        let mut config: Self =
            toml::from_str(raw).map_err(|e| WorkflowError::Config(e.to_string()))?;
        if config.llm.provider == LlmProvider::OpenAi {
            if config.llm.model.trim().is_empty() {
                config.llm.model = DEFAULT_MODEL.to_string();
            }
            if config.llm.base_url.trim().is_empty() {
                config.llm.base_url = DEFAULT_BASE_URL.to_string();
            }
        }
        Ok(config)
    }

    /// Loads the resolved file (or defaults), applies process environment
    /// overrides and validates.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, WorkflowError> {
        let mut config = match Self::resolve_path(explicit) {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty("NVIDIA_API_KEY") {
            self.llm.api_key = Some(key.clone());
            if self.embedding.api_key.is_none() {
                self.embedding.api_key = Some(key);
            }
        }
        if let Some(model) = non_empty("NVIDIA_MODEL_NAME") {
            self.llm.model = model;
        }
        if let Some(url) = non_empty("NVIDIA_BASE_URL") {
            self.llm.base_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.retrieval.top_k == 0 {
            return Err(WorkflowError::Config("retrieval.top_k must be at least 1".to_string()));
        }
        if self.retrieval.query_timeout_secs == 0 {
            return Err(WorkflowError::Config(
                "retrieval.query_timeout_secs must be at least 1".to_string(),
            ));
        }
        for (step, target) in self.collections.iter() {
            if target.collection.trim().is_empty() {
                return Err(WorkflowError::Config(format!(
                    "collections.{step}.collection is empty"
                )));
            }
            if target.path.as_os_str().is_empty() {
                return Err(WorkflowError::Config(format!("collections.{step}.path is empty")));
            }
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            llm: self.llm.clone(),
            embedding: self.embedding.clone(),
            top_k: self.retrieval.top_k,
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval.query_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_yields_nvidia_defaults() {
        let config = AssistantConfig::from_toml("").unwrap();
        assert_eq!(config.llm.model, DEFAULT_MODEL);
        assert_eq!(config.llm.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.collections.antibiotics.collection, "sepsis_antibiotic_recommendations");
        assert_eq!(config.retrieval.query_timeout_secs, DEFAULT_QUERY_TIMEOUT_SECS);
        assert_eq!(config.service.bind_addr, DEFAULT_BIND_ADDR);
        config.validate().unwrap();
    }

    #[test]
    fn partial_llm_section_keeps_default_endpoint() {
        let config = AssistantConfig::from_toml("[llm]\napi_key = \"nvapi-abc\"\n").unwrap();
        assert_eq!(config.llm.model, DEFAULT_MODEL);
        assert_eq!(config.llm.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.llm.api_key.as_deref(), Some("nvapi-abc"));
    }

    #[test]
    fn sections_override_defaults() {
        let raw = r#"
[llm]
provider = "local"

[embedding]
provider = "hash"
dimensions = 128

[retrieval]
top_k = 3
query_timeout_secs = 15

[collections.guidelines]
path = "/srv/isaac/guidelines"
collection = "ssc_2021"
"#;
        let config = AssistantConfig::from_toml(raw).unwrap();
        assert_eq!(config.llm.provider, LlmProvider::Local);
        assert_eq!(config.embedding.dimensions, 128);
        assert_eq!(config.query_timeout(), Duration::from_secs(15));
        assert_eq!(config.collections.guidelines.collection, "ssc_2021");
        assert_eq!(config.collections.management.collection, "sepsis_management");
        assert_eq!(config.engine_settings().top_k, 3);
    }

    #[test]
    fn environment_overrides_apply_after_file() {
        let vars: HashMap<&str, &str> = [
            ("NVIDIA_API_KEY", "nvapi-test"),
            ("NVIDIA_MODEL_NAME", "meta/llama3-70b-instruct"),
            ("NVIDIA_BASE_URL", ""),
        ]
        .into_iter()
        .collect();
        let mut config = AssistantConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.llm.api_key.as_deref(), Some("nvapi-test"));
        assert_eq!(config.llm.model, "meta/llama3-70b-instruct");
        assert_eq!(config.llm.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = AssistantConfig::default();
        config.retrieval.top_k = 0;
        assert!(matches!(config.validate(), Err(WorkflowError::Config(_))));
        let mut config = AssistantConfig::default();
        config.collections.management.collection = " ".to_string();
        assert!(matches!(config.validate(), Err(WorkflowError::Config(_))));
        assert!(matches!(
            AssistantConfig::from_toml("[retrieval]\ntop_k = \"many\""),
            Err(WorkflowError::Config(_))
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("isaac.toml");
        assert!(AssistantConfig::load(&path).is_err());
        fs::write(&path, "[service]\nbind_addr = \"0.0.0.0:9000\"\n").unwrap();
        let config = AssistantConfig::load(&path).unwrap();
        assert_eq!(config.service.bind_addr, "0.0.0.0:9000");
        assert_eq!(
            AssistantConfig::resolve_path(Some(&path)).as_deref(),
            Some(path.as_path())
        );
    }
}
