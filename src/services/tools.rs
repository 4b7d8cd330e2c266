//! Tools offered to the model.
//!
//! Display tools (`generateForm`, `generateChart`, `generateCode`,
//! `generateCard`) do no work: their output is the arguments tagged with a
//! display kind, which the UI renders. Agent tools return structured
//! placeholder data until their backing services exist.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::services::provider::ToolDefinition;

pub const TOOL_GENERATE_FORM: &str = "generateForm";
pub const TOOL_GENERATE_CHART: &str = "generateChart";
pub const TOOL_GENERATE_CODE: &str = "generateCode";
pub const TOOL_GENERATE_CARD: &str = "generateCard";

pub const DISPLAY_TOOLS: &[&str] = &[
    TOOL_GENERATE_FORM,
    TOOL_GENERATE_CHART,
    TOOL_GENERATE_CODE,
    TOOL_GENERATE_CARD,
];

#[derive(Debug, Error, PartialEq)]
pub enum ToolError {
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON Schema of the arguments object.
    fn parameters(&self) -> Value;
    async fn call(&self, args: Value) -> Result<Value, ToolError>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(self.name(), self.description(), self.parameters())
    }
}

fn required_str<'a>(tool: &str, args: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool.to_string(),
            reason: format!("missing string field '{}'", field),
        })
}

// ============================================================================
// Display tools
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    Form,
    Chart,
    Code,
    Card,
}

impl DisplayKind {
    pub fn from_tool_name(name: &str) -> Option<Self> {
        match name {
            TOOL_GENERATE_FORM => Some(Self::Form),
            TOOL_GENERATE_CHART => Some(Self::Chart),
            TOOL_GENERATE_CODE => Some(Self::Code),
            TOOL_GENERATE_CARD => Some(Self::Card),
            _ => None,
        }
    }

    pub const fn tag(self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::Chart => "chart",
            Self::Code => "code",
            Self::Card => "card",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DisplayTool {
    kind: DisplayKind,
}

impl DisplayTool {
    pub fn new(kind: DisplayKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Tool for DisplayTool {
    fn name(&self) -> &'static str {
        match self.kind {
            DisplayKind::Form => TOOL_GENERATE_FORM,
            DisplayKind::Chart => TOOL_GENERATE_CHART,
            DisplayKind::Code => TOOL_GENERATE_CODE,
            DisplayKind::Card => TOOL_GENERATE_CARD,
        }
    }

    fn description(&self) -> &'static str {
        match self.kind {
            DisplayKind::Form => {
                "Generate an interactive form with various field types including text, textarea, \
                 select, checkbox, radio, date, slider, file, number, and email fields."
            }
            DisplayKind::Chart => {
                "Generate a data visualization chart. Supports line, bar, pie, and area chart types."
            }
            DisplayKind::Code => {
                "Generate a code block with syntax highlighting. Supports optional filename, \
                 editability, and line numbers."
            }
            DisplayKind::Card => {
                "Generate a card component with title, description, content, media (image or \
                 video), and action buttons."
            }
        }
    }

    fn parameters(&self) -> Value {
        match self.kind {
            DisplayKind::Form => form_schema(),
            DisplayKind::Chart => chart_schema(),
            DisplayKind::Code => code_schema(),
            DisplayKind::Card => card_schema(),
        }
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let Value::Object(mut fields) = args else {
            return Err(ToolError::InvalidArguments {
                tool: self.name().to_string(),
                reason: "arguments must be an object".to_string(),
            });
        };
        fields.insert("type".to_string(), json!(self.kind.tag()));
        Ok(Value::Object(fields))
    }
}

fn form_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "title": {"type": "string"},
            "description": {"type": "string"},
            "submitLabel": {"type": "string"},
            "fields": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "type": {
                            "type": "string",
                            "enum": ["text", "textarea", "select", "checkbox", "radio",
                                     "date", "slider", "file", "number", "email"]
                        },
                        "label": {"type": "string"},
                        "placeholder": {"type": "string"},
                        "required": {"type": "boolean"},
                        "defaultValue": {"type": ["string", "integer", "boolean"]},
                        "options": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "label": {"type": "string"},
                                    "value": {"type": "string"}
                                },
                                "required": ["label", "value"]
                            }
                        },
                        "min": {"type": "integer"},
                        "max": {"type": "integer"},
                        "step": {"type": "integer"}
                    },
                    "required": ["id", "type", "label"]
                }
            }
        },
        "required": ["title", "fields"]
    })
}

fn chart_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "chartType": {"type": "string", "enum": ["line", "bar", "pie", "area"]},
            "title": {"type": "string"},
            "description": {"type": "string"},
            "data": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "label": {"type": "string"},
                        "value": {"type": "number"}
                    },
                    "required": ["label", "value"]
                }
            }
        },
        "required": ["chartType", "title", "data"]
    })
}

fn code_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "language": {"type": "string"},
            "filename": {"type": "string"},
            "code": {"type": "string"},
            "editable": {"type": "boolean"},
            "showLineNumbers": {"type": "boolean"}
        },
        "required": ["language", "code"]
    })
}

fn card_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "title": {"type": "string"},
            "description": {"type": "string"},
            "content": {"type": "string"},
            "media": {
                "type": "object",
                "properties": {
                    "type": {"type": "string", "enum": ["image", "video"]},
                    "url": {"type": "string"},
                    "alt": {"type": "string"}
                },
                "required": ["type", "url"]
            },
            "actions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "label": {"type": "string"},
                        "action": {"type": "string"},
                        "variant": {
                            "type": "string",
                            "enum": ["default", "secondary", "destructive", "outline"]
                        }
                    },
                    "required": ["label", "action"]
                }
            }
        },
        "required": ["title"]
    })
}

// ============================================================================
// Agent tools
// ============================================================================

pub struct SearchNotes;

#[async_trait]
impl Tool for SearchNotes {
    fn name(&self) -> &'static str {
        "search_notes"
    }

    fn description(&self) -> &'static str {
        "Search through notes and documents."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"query": {"type": "string", "description": "Search query string."}},
            "required": ["query"]
        })
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let query = required_str(self.name(), &args, "query")?;
        Ok(json!({
            "query": query,
            "results": [],
            "message": "Search functionality not yet connected",
        }))
    }
}

pub struct AnalyzeComplexity;

#[async_trait]
impl Tool for AnalyzeComplexity {
    fn name(&self) -> &'static str {
        "analyze_complexity"
    }

    fn description(&self) -> &'static str {
        "Analyze code complexity metrics."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "description": "Source code to analyze."},
                "language": {"type": "string", "description": "Programming language."}
            },
            "required": ["code", "language"]
        })
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let code = required_str(self.name(), &args, "code")?;
        let language = required_str(self.name(), &args, "language")?;
        Ok(json!({
            "language": language,
            "lines": code.lines().count(),
            "analysis": "Complexity analysis not yet connected",
        }))
    }
}

pub struct CurrentContext;

#[async_trait]
impl Tool for CurrentContext {
    fn name(&self) -> &'static str {
        "get_current_context"
    }

    fn description(&self) -> &'static str {
        "Get additional context about a topic."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"topic": {"type": "string", "description": "Topic to get context for."}},
            "required": ["topic"]
        })
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let topic = required_str(self.name(), &args, "topic")?;
        Ok(json!({
            "topic": topic,
            "context": [],
            "message": "Context service not yet connected",
        }))
    }
}

// ============================================================================
// Tool set
// ============================================================================

/// Ordered, name-unique collection of tools.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// All four display tools.
    pub fn display() -> Self {
        DISPLAY_TOOLS
            .iter()
            .filter_map(|name| DisplayKind::from_tool_name(name))
            .fold(Self::new(), |set, kind| set.with(DisplayTool::new(kind)))
    }

    /// Display tools named in `names`, in catalog order. Absent or empty
    /// selects none; unknown names are ignored.
    pub fn display_filtered(names: Option<&[String]>) -> Self {
        let names = names.unwrap_or_default();
        let mut set = Self::display();
        set.tools.retain(|t| names.iter().any(|n| n == t.name()));
        set
    }

    /// Add a tool, replacing any tool of the same name.
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Run a tool by name. Failures become an `{"error": ...}` result the
    /// model can read, rather than aborting the run.
    pub async fn execute(&self, name: &str, arguments: &str) -> Value {
        let Some(tool) = self.get(name) else {
            tracing::warn!(tool_name = %name, "Model called unknown tool");
            return json!({ "error": format!("Unknown tool: {}", name) });
        };

        let args = match serde_json::from_str::<Value>(arguments) {
            Ok(Value::Null) => Value::Object(Map::new()),
            Ok(args) => args,
            Err(e) => {
                return json!({ "error": format!("Invalid JSON arguments for {}: {}", name, e) });
            }
        };

        match tool.call(args).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tool_name = %name, error = %e, "Tool call failed");
                json!({ "error": e.to_string() })
            }
        }
    }
}
