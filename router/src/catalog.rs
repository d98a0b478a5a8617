//! Capability catalog
//!
//! Aggregates the tools of every live connection into one list for the
//! model, and remembers which connection owns each name. When two servers
//! advertise the same name, the server that comes first keeps it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EmptyCatalog, UnresolvedToolError};
use crate::mcp::{Connection, McpTool};

/// Function definition in the shape the model expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A catalog entry
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub schema: FunctionSchema,
    /// Name of the owning server
    pub server: String,
    /// Lookup only; the connection manager owns the connection
    connection: Weak<Connection>,
}

impl ToolDescriptor {
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// The owning connection, if it is still alive
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.upgrade()
    }
}

/// Convert an MCP tool into a function schema. Fields are copied as-is.
pub fn to_function_schema(tool: &McpTool) -> FunctionSchema {
    FunctionSchema {
        name: tool.name.clone(),
        description: tool.description.clone().unwrap_or_default(),
        parameters: tool.input_schema.clone(),
    }
}

/// De-duplicated tool list plus name lookup
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tools: Vec<ToolDescriptor>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    /// Query every connection, in order, and register its tools.
    ///
    /// A connection that fails to list its tools contributes nothing; the
    /// rest of the catalog is still built.
    pub async fn build(connections: &[Arc<Connection>]) -> Self {
        let mut catalog = Self::default();

        for connection in connections {
            match connection.list_tools().await {
                Ok(tools) => {
                    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
                    tracing::info!("Connected to {}. Tools: {:?}", connection.name(), names);
                    for tool in &tools {
                        catalog.register(connection, tool);
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping tools of '{}': {}", connection.name(), e);
                }
            }
        }

        if catalog.is_empty() {
            tracing::warn!("Catalog is empty: no tools available");
        } else {
            tracing::info!("Catalog ready with {} tools", catalog.len());
        }
        catalog
    }

    /// Add one tool. Returns false when the name was already taken.
    pub fn register(&mut self, connection: &Arc<Connection>, tool: &McpTool) -> bool {
        if let Some(&existing) = self.by_name.get(&tool.name) {
            tracing::warn!(
                "Tool '{}' from '{}' ignored: already provided by '{}'",
                tool.name,
                connection.name(),
                self.tools[existing].server
            );
            return false;
        }

        self.by_name.insert(tool.name.clone(), self.tools.len());
        self.tools.push(ToolDescriptor {
            schema: to_function_schema(tool),
            server: connection.name().to_string(),
            connection: Arc::downgrade(connection),
        });
        true
    }

    /// Descriptors in registration order
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Schemas to offer the model
    pub fn function_schemas(&self) -> Vec<FunctionSchema> {
        self.tools.iter().map(|t| t.schema.clone()).collect()
    }

    pub fn resolve(&self, name: &str) -> Result<&ToolDescriptor, UnresolvedToolError> {
        self.by_name
            .get(name)
            .map(|&idx| &self.tools[idx])
            .ok_or_else(|| UnresolvedToolError {
                tool: name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Turn an empty catalog into an error for callers that need tools
    pub fn ensure_not_empty(&self) -> Result<(), EmptyCatalog> {
        if self.is_empty() {
            Err(EmptyCatalog)
        } else {
            Ok(())
        }
    }
}
