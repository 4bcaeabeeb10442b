use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::domain::models::{ToolName, ToolsConfig};
use crate::domain::ports::{Tool, ToolError};

use super::{CalcTool, HttpGetTool};

/// Lookup table from tool name to executor.
///
/// A plan that references a tool missing from the registry fails at
/// execution time with an unknown-tool error.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<ToolName, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry used in production: `calc`, plus `http_get` unless disabled.
    pub fn from_config(config: &ToolsConfig) -> Result<Self, ToolError> {
        let mut registry = Self::new().with(Arc::new(CalcTool::new()));
        if !config.disable_http_get {
            let timeout = std::time::Duration::from_secs_f64(config.http_timeout_seconds);
            registry.register(Arc::new(HttpGetTool::new(timeout)?));
        }
        info!(tools = ?registry.names(), "Tool registry ready");
        Ok(registry)
    }

    /// Register `tool` under its own name, replacing any previous entry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: ToolName) -> Option<Arc<dyn Tool>> {
        self.tools.get(&name).cloned()
    }

    pub fn names(&self) -> Vec<ToolName> {
        self.tools.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_holds_both_tools() {
        let registry = ToolRegistry::from_config(&ToolsConfig::default()).unwrap();
        assert_eq!(registry.names(), vec![ToolName::HttpGet, ToolName::Calc]);
        assert_eq!(registry.get(ToolName::Calc).unwrap().name(), ToolName::Calc);
    }

    #[test]
    fn test_http_get_can_be_disabled() {
        let config = ToolsConfig {
            disable_http_get: true,
            ..ToolsConfig::default()
        };
        let registry = ToolRegistry::from_config(&config).unwrap();
        assert!(registry.get(ToolName::HttpGet).is_none());
        assert!(registry.get(ToolName::Calc).is_some());
    }

    #[test]
    fn test_register_replaces_existing_entry() {
        let registry = ToolRegistry::new().with(Arc::new(CalcTool::new()));
        let replacement: Arc<dyn Tool> = Arc::new(CalcTool::new());
        let registry = registry.with(Arc::clone(&replacement));
        assert!(Arc::ptr_eq(&registry.get(ToolName::Calc).unwrap(), &replacement));
        assert_eq!(registry.names().len(), 1);
    }
}
