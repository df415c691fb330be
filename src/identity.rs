//! Display-name lookup. The directory itself is external; this module only
//! bounds how long a join may wait on it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_NAME: &str = "Stranger";

#[async_trait]
pub trait Directory: Send + Sync {
    async fn resolve_name(&self, token: &str) -> Result<Option<String>>;
}

/// Directory loaded once from a JSON object mapping identity tokens to names.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    names: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn new(names: HashMap<String, String>) -> Self {
        Self { names }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading directory file {}", path.display()))?;
        let names: HashMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing directory file {}", path.display()))?;
        Ok(Self { names })
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn resolve_name(&self, token: &str) -> Result<Option<String>> {
        Ok(self.names.get(token).cloned())
    }
}

#[derive(Clone)]
pub struct NameResolver {
    directory: Arc<dyn Directory>,
    timeout: Duration,
    default_name: String,
}

impl NameResolver {
    pub fn new(directory: Arc<dyn Directory>, timeout: Duration, default_name: String) -> Self {
        Self {
            directory,
            timeout,
            default_name,
        }
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Never fails: lookup errors and timeouts fall back to the default name.
    pub async fn resolve(&self, token: Option<&str>) -> String {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return self.default_name.clone();
        };

        match tokio::time::timeout(self.timeout, self.directory.resolve_name(token)).await {
            Ok(Ok(Some(name))) => name,
            Ok(Ok(None)) => self.default_name.clone(),
            Ok(Err(err)) => {
                tracing::warn!("name lookup failed: {:#}", err);
                self.default_name.clone()
            }
            Err(_) => {
                tracing::warn!("name lookup timed out after {:?}", self.timeout);
                self.default_name.clone()
            }
        }
    }
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new(
            Arc::new(StaticDirectory::default()),
            Duration::from_millis(500),
            DEFAULT_NAME.to_string(),
        )
    }
}
