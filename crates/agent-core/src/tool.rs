//! Tool System
//!
//! Tools are declared explicitly with a [`ToolDeclaration`] and registered once
//! at startup. The reasoning loop dispatches model-issued [`ToolCall`]s through
//! the [`ToolRegistry`], which validates arguments against the declaration and
//! turns handler failures into [`ToolResult`] data instead of errors.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::error::{AgentError, InvalidArgument, Result};

/// Arguments supplied with a tool call
pub type Arguments = Map<String, Value>;

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, used to correlate the result
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Arguments as a JSON object
    #[serde(default)]
    pub arguments: Arguments,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Result from tool execution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Call ID of the originating request
    pub id: String,

    /// Tool that was called
    pub name: String,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (tool text or failure description)
    pub output: String,
}

impl ToolResult {
    pub fn success(call: &ToolCall, output: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(call: &ToolCall, error: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            success: false,
            output: error.into(),
        }
    }

    /// Text placed in the conversation for the model to read
    pub fn to_turn_content(&self) -> String {
        if self.success {
            self.output.clone()
        } else {
            format!("Tool '{}' failed: {}", self.name, self.output)
        }
    }
}

/// JSON type of a declared parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Number,
    Integer,
    String,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Integer => "integer",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Check whether a JSON value has this type
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::String => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type
    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,
}

impl ParameterSchema {
    pub fn required(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }
}

/// Tool declaration shown to the model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (used by the model to decide applicability)
    pub description: String,

    /// Ordered parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn param(mut self, parameter: ParameterSchema) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// JSON Schema object describing the arguments
    pub fn json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    json!({ "type": p.param_type.as_str(), "description": p.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check supplied arguments for presence and type
    pub fn validate(&self, arguments: &Arguments) -> Result<()> {
        let mut issues = Vec::new();

        for param in &self.parameters {
            match arguments.get(&param.name) {
                None | Some(Value::Null) => {
                    if param.required {
                        issues.push(InvalidArgument {
                            parameter: param.name.clone(),
                            reason: "is required".into(),
                        });
                    }
                }
                Some(value) if !param.param_type.matches(value) => {
                    issues.push(InvalidArgument {
                        parameter: param.name.clone(),
                        reason: format!(
                            "expected {}, got {}",
                            param.param_type,
                            json_type_name(value)
                        ),
                    });
                }
                Some(_) => {}
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(AgentError::InvalidArguments {
                tool: self.name.clone(),
                issues,
            })
        }
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Declaration used for registration and shown to the model
    fn declaration(&self) -> ToolDeclaration;

    /// Execute the tool with already-validated arguments
    async fn execute(&self, arguments: &Arguments) -> Result<String>;
}

/// Adapter turning a plain function into a [`Tool`]
struct FnTool<F> {
    declaration: ToolDeclaration,
    handler: F,
}

#[async_trait]
impl<F> Tool for FnTool<F>
where
    F: Fn(&Arguments) -> Result<String> + Send + Sync,
{
    fn declaration(&self) -> ToolDeclaration {
        self.declaration.clone()
    }

    async fn execute(&self, arguments: &Arguments) -> Result<String> {
        (self.handler)(arguments)
    }
}

struct RegisteredTool {
    declaration: ToolDeclaration,
    tool: Arc<dyn Tool>,
}

/// Registry for available tools
///
/// Registration order is preserved and is the order declarations are shown to
/// the model. Share it behind an `Arc` once populated.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let declaration = tool.declaration();
        if self.index.contains_key(&declaration.name) {
            return Err(AgentError::DuplicateTool(declaration.name));
        }

        tracing::debug!(tool = %declaration.name, "Registered tool");
        self.index.insert(declaration.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool { declaration, tool });
        Ok(())
    }

    /// Register a declaration together with a plain handler function
    pub fn register_handler<F>(&mut self, declaration: ToolDeclaration, handler: F) -> Result<()>
    where
        F: Fn(&Arguments) -> Result<String> + Send + Sync + 'static,
    {
        self.register(FnTool {
            declaration,
            handler,
        })
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| self.tools[i].tool.clone())
    }

    /// All declarations, in registration order
    pub fn describe_all(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(|t| t.declaration.clone()).collect()
    }

    /// Execute a tool call
    ///
    /// Lookup and validation failures are returned as errors. Anything the
    /// handler itself does wrong, including panicking, comes back as a failed
    /// [`ToolResult`].
    pub async fn invoke(&self, call: &ToolCall) -> Result<ToolResult> {
        let entry = self
            .index
            .get(&call.name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| AgentError::UnknownTool(call.name.clone()))?;

        entry.declaration.validate(&call.arguments)?;

        let outcome = AssertUnwindSafe(entry.tool.execute(&call.arguments))
            .catch_unwind()
            .await;

        Ok(match outcome {
            Ok(Ok(output)) => ToolResult::success(call, output),
            Ok(Err(e)) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool returned an error");
                ToolResult::failure(call, e.to_string())
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                tracing::error!(tool = %call.name, %message, "Tool panicked");
                ToolResult::failure(call, format!("tool panicked: {message}"))
            }
        })
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.declaration.name.as_str()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// Calculator tool - adds two numbers
pub struct CalculatorTool;

impl CalculatorTool {
    pub const NAME: &'static str = "calculator";
}

#[async_trait]
impl Tool for CalculatorTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            Self::NAME,
            "Useful for performing basic arithmetic calculations with numbers.",
        )
        .param(ParameterSchema::required(
            "a",
            ParamType::Number,
            "First number",
        ))
        .param(ParameterSchema::required(
            "b",
            ParamType::Number,
            "Second number",
        ))
    }

    async fn execute(&self, arguments: &Arguments) -> Result<String> {
        let operand = |name: &str| {
            arguments
                .get(name)
                .and_then(Value::as_f64)
                .ok_or_else(|| AgentError::ToolExecution(format!("`{name}` is not a number")))
        };
        let a = operand("a")?;
        let b = operand("b")?;

        tracing::info!("Adding ...");
        Ok(format!("The sum of {a} and {b} is {}", a + b))
    }
}
