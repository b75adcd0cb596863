//! Tool registry: name→tool mapping with uniform, errors-as-data execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::providers::ToolDef;

use super::{Tool, ToolContext};

/// A registry that holds and executes tools.
///
/// Execution never raises: failures are formatted as text so the model sees
/// them as conversational input and can recover on the next iteration. That
/// contract is the system's retry mechanism; do not tighten it.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        debug!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Execute a tool by name, always returning a string.
    ///
    /// - Unknown tool: `"Unknown tool: <name>. Available tools: …"`
    /// - Failure: `"Error executing <name>: <msg>"` plus a recovery hint
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> String {
        let tool = match self.tools.get(name) {
            Some(t) => t,
            None => {
                let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
                names.sort_unstable();
                return format!(
                    "Unknown tool: {}. Available tools: {}",
                    name,
                    names.join(", ")
                );
            }
        };

        let start = Instant::now();
        match tool.execute(args, ctx).await {
            Ok(result) => {
                info!(
                    tool = name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool executed"
                );
                result
            }
            Err(e) => {
                warn!(
                    tool = name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    error = %e,
                    "Tool execution failed"
                );
                format!(
                    "Error executing {}: {}\n\n[Analyze the error above and try a different approach.]",
                    name, e
                )
            }
        }
    }

    /// Tool definitions for provider tool declarations.
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.tools
            .values()
            .map(|t| ToolDef::new(t.name(), t.description(), t.parameters()))
            .collect()
    }

    /// Names of all registered tools, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Whether a tool is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Snapshot the current mapping into a new registry. Mutating either
    /// registry afterwards does not affect the other; this is how
    /// sub-agents get isolated tool sets.
    pub fn clone_registry(&self) -> Self {
        Self {
            tools: self.tools.clone(),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
