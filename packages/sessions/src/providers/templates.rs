// ABOUTME: Template registry describing how each session template is provisioned
// ABOUTME: Loads embedded JSON definitions, optionally overridden from a file on disk

use super::{ProviderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_WORKING_DIR: &str = "/home/user";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub id: String,
    pub image: String,
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    /// Container entrypoint override. `None` keeps the image default.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    /// Argv prefix used to run a code string, e.g. `["python3", "-c"]`.
    #[serde(default)]
    pub code_runner: Option<Vec<String>>,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default = "default_cpu_cores")]
    pub cpu_cores: f32,
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,
}

fn default_working_dir() -> String {
    DEFAULT_WORKING_DIR.to_string()
}

fn default_cpu_cores() -> f32 {
    1.0
}

fn default_memory_mb() -> u64 {
    1024
}

impl TemplateConfig {
    /// Absolute path for `path` inside the session, resolving relative paths
    /// against the template working dir.
    pub fn resolve_path(&self, path: &str) -> String {
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.working_dir.trim_end_matches('/'),
                path.trim_start_matches("./")
            )
        }
    }

    /// The service port used when a fragment doesn't name one.
    pub fn default_port(&self) -> Option<u16> {
        self.ports.first().copied()
    }
}

#[derive(Debug, Deserialize)]
struct TemplatesConfig {
    templates: Vec<TemplateConfig>,
}

#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<String, TemplateConfig>,
}

impl TemplateRegistry {
    /// Load the built-in template definitions
    pub fn new() -> Result<Self> {
        Self::from_json(include_str!("../../config/templates.json"))
    }

    /// Load template definitions from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::ConfigError(format!(
                "Failed to read templates from {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: TemplatesConfig = serde_json::from_str(json)
            .map_err(|e| ProviderError::ConfigError(format!("Invalid templates config: {}", e)))?;

        let templates = config
            .templates
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        Ok(Self { templates })
    }

    pub fn get(&self, id: &str) -> Result<&TemplateConfig> {
        self.templates
            .get(id)
            .ok_or_else(|| ProviderError::TemplateNotFound(id.to_string()))
    }

    pub fn list(&self) -> Vec<&TemplateConfig> {
        self.templates.values().collect()
    }
}
