//! Tool contract and the registry that dispatches calls by name.

use super::context::SourceCitation;
use crate::error::{LektorError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// JSON-schema type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        }
    }
}

/// A single declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

impl ToolParameter {
    /// A parameter the model must always supply.
    pub fn required(name: &str, kind: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: true,
        }
    }

    /// A parameter the model may omit.
    pub fn optional(name: &str, kind: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// Name, description and parameter schema of a tool, as offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolDefinition {
    /// Create a definition with no parameters.
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: Vec::new(),
        }
    }

    /// Add a parameter.
    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Render the parameters as a JSON-schema object.
    pub fn input_schema(&self) -> serde_json::Value {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    serde_json::json!({
                        "type": p.kind.as_str(),
                        "description": p.description,
                    }),
                )
            })
            .collect();

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// What a tool hands back after a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Text returned to the model as the tool result.
    pub text: String,
    /// Replacement citation list; `None` leaves the current citations alone.
    pub citations: Option<Vec<SourceCitation>>,
}

impl ToolOutput {
    /// Plain text output that does not touch citations.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citations: None,
        }
    }

    /// Attach the citations this execution produced.
    pub fn with_citations(mut self, citations: Vec<SourceCitation>) -> Self {
        self.citations = Some(citations);
        self
    }
}

/// A named capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Definition offered to the model. Read once, at registration.
    fn definition(&self) -> ToolDefinition;

    /// Run the tool with the model-supplied JSON arguments.
    async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput>;
}

/// Deserialize model-supplied arguments into a tool's typed parameters.
pub fn parse_arguments<T: DeserializeOwned>(tool: &str, input: serde_json::Value) -> Result<T> {
    serde_json::from_value(input)
        .map_err(|e| LektorError::InvalidInput(format!("Invalid arguments for '{}': {}", tool, e)))
}

struct RegisteredTool {
    definition: ToolDefinition,
    tool: Arc<dyn Tool>,
}

/// Catalogue of callable tools.
///
/// Read-only once built, so a single registry can be shared across concurrent
/// queries. Citations are collected per query in the conversation context.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its declared name.
    ///
    /// A duplicate name replaces the earlier tool in place and returns its
    /// definition, so callers can treat the collision as an error.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<ToolDefinition> {
        let definition = tool.definition();
        let name = definition.name.clone();
        let entry = RegisteredTool { definition, tool };

        match self.by_name.get(&name) {
            Some(&index) => {
                warn!("Tool '{}' registered twice, replacing previous entry", name);
                let previous = std::mem::replace(&mut self.tools[index], entry);
                Some(previous.definition)
            }
            None => {
                debug!("Registered tool '{}'", name);
                self.by_name.insert(name, self.tools.len());
                self.tools.push(entry);
                None
            }
        }
    }

    /// All tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name.
    ///
    /// Unknown names fail with [`LektorError::UnknownTool`]; any failure raised by
    /// the tool is reported as [`LektorError::ToolFailed`].
    pub async fn execute(&self, name: &str, input: serde_json::Value) -> Result<ToolOutput> {
        let index = *self
            .by_name
            .get(name)
            .ok_or_else(|| LektorError::UnknownTool(name.to_string()))?;

        info!("Executing tool '{}' with args: {}", name, input);

        self.tools[index]
            .tool
            .execute(input)
            .await
            .map_err(|e| match e {
                failed @ LektorError::ToolFailed { .. } => failed,
                other => LektorError::ToolFailed {
                    name: name.to_string(),
                    reason: other.to_string(),
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool {
        name: &'static str,
        description: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.name, self.description).with_parameter(
                ToolParameter::required("message", ParamType::String, "Text to echo"),
            )
        }

        async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput> {
            #[derive(Deserialize)]
            struct Args {
                message: String,
            }
            let args: Args = parse_arguments(self.name, input)?;
            Ok(ToolOutput::text(format!("{}: {}", self.description, args.message)))
        }
    }

    fn echo(name: &'static str, description: &'static str) -> Arc<dyn Tool> {
        Arc::new(EchoTool { name, description })
    }

    #[test]
    fn test_definitions_keep_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(echo("b_tool", "second letter"));
        registry.register(echo("a_tool", "first letter"));

        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["b_tool", "a_tool"]);
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_flagged_and_last_wins() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register(echo("echo", "old")).is_none());

        let replaced = registry.register(echo("echo", "new"));
        assert_eq!(replaced.map(|d| d.description), Some("old".to_string()));
        assert_eq!(registry.len(), 1);

        let output = registry
            .execute("echo", json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(output.text, "new: hi");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, LektorError::UnknownTool(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_bad_arguments_become_tool_failure() {
        let mut registry = ToolRegistry::new();
        registry.register(echo("echo", "e"));

        let err = registry.execute("echo", json!({"msg": 1})).await.unwrap_err();
        match err {
            LektorError::ToolFailed { name, reason } => {
                assert_eq!(name, "echo");
                assert!(reason.contains("message"));
            }
            other => panic!("Expected ToolFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_input_schema() {
        let def = ToolDefinition::new("search", "Search")
            .with_parameter(ToolParameter::required("query", ParamType::String, "What"))
            .with_parameter(ToolParameter::optional("lesson_number", ParamType::Integer, "Which"));

        let schema = def.input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["lesson_number"]["type"], "integer");
        assert_eq!(schema["required"], json!(["query"]));
    }
}
