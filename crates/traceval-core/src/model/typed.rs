//! Typed views over filtered spans.
//!
//! Decoding is total: a missing or oddly shaped field decodes to its empty
//! value instead of failing, since trace exporters disagree on almost every
//! attribute.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::usage::TokenUsage;
use crate::normalize::{FilteredSpan, SemanticKind};

pub(crate) mod keys {
    pub const MODEL: &str = "llm.model_name";
    pub const PROVIDER: &str = "llm.provider";
    pub const TEMPERATURE: &str = "llm.temperature";
    pub const TOOL_NAME: &str = "tool.name";
    pub const TOP_K: &str = "retrieval.top_k";
    pub const AGENT_NAME: &str = "agent.name";
    pub const AGENT_FRAMEWORK: &str = "agent.framework";
    pub const AGENT_SYSTEM_PROMPT: &str = "agent.system_prompt";
    pub const AGENT_TOOLS: &str = "agent.tools";
    pub const AGENT_MAX_ITERATIONS: &str = "agent.max_iterations";
}

/// One chat message sent to a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// A model invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSpan {
    pub span_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub messages: Vec<Message>,
    pub output: String,
    pub model: String,
    pub vendor: String,
    pub temperature: Option<f64>,
    pub usage: TokenUsage,
    pub duration_ms: f64,
    pub error: bool,
}

/// A tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpan {
    pub span_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub arguments: Value,
    pub result: Value,
    pub duration_ms: f64,
    pub error: bool,
}

/// A document returned by a retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub content: String,
    pub score: f64,
}

/// A retrieval step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverSpan {
    pub span_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub query: String,
    pub top_k: u64,
    pub documents: Vec<RetrievedDocument>,
    pub duration_ms: f64,
    pub error: bool,
}

/// An agent invocation, the root of an agent-scoped subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpan {
    pub span_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub framework: String,
    pub system_prompt: String,
    pub tools: Vec<String>,
    pub max_iterations: u64,
    pub input: String,
    pub output: String,
    pub duration_ms: f64,
    pub error: bool,
}

/// Any decoded semantic span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypedSpan {
    Llm(LlmSpan),
    Tool(ToolSpan),
    Retriever(RetrieverSpan),
    Agent(AgentSpan),
}

impl TypedSpan {
    /// Decode a filtered span. Returns `None` for the synthetic root.
    pub fn decode(span: &FilteredSpan) -> Option<Self> {
        let typed = match span.kind? {
            SemanticKind::Llm => Self::Llm(decode_llm(span)),
            SemanticKind::Tool => Self::Tool(decode_tool(span)),
            SemanticKind::Retriever => Self::Retriever(decode_retriever(span)),
            SemanticKind::Agent => Self::Agent(decode_agent(span)),
        };
        Some(typed)
    }

    pub fn kind(&self) -> SemanticKind {
        match self {
            Self::Llm(_) => SemanticKind::Llm,
            Self::Tool(_) => SemanticKind::Tool,
            Self::Retriever(_) => SemanticKind::Retriever,
            Self::Agent(_) => SemanticKind::Agent,
        }
    }

    pub fn span_id(&self) -> &str {
        match self {
            Self::Llm(s) => &s.span_id,
            Self::Tool(s) => &s.span_id,
            Self::Retriever(s) => &s.span_id,
            Self::Agent(s) => &s.span_id,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Self::Llm(s) => s.parent_id.as_deref(),
            Self::Tool(s) => s.parent_id.as_deref(),
            Self::Retriever(s) => s.parent_id.as_deref(),
            Self::Agent(s) => s.parent_id.as_deref(),
        }
    }

    pub fn duration_ms(&self) -> f64 {
        match self {
            Self::Llm(s) => s.duration_ms,
            Self::Tool(s) => s.duration_ms,
            Self::Retriever(s) => s.duration_ms,
            Self::Agent(s) => s.duration_ms,
        }
    }

    pub fn error(&self) -> bool {
        match self {
            Self::Llm(s) => s.error,
            Self::Tool(s) => s.error,
            Self::Retriever(s) => s.error,
            Self::Agent(s) => s.error,
        }
    }
}

fn decode_llm(span: &FilteredSpan) -> LlmSpan {
    let payload = &span.payload;
    LlmSpan {
        span_id: span.span_id.clone(),
        parent_id: span.parent_id.clone(),
        name: span.name.clone(),
        messages: decode_messages(&payload.input),
        output: value_to_text(&payload.output),
        model: payload
            .attr_str(keys::MODEL)
            .unwrap_or_default()
            .to_string(),
        vendor: payload
            .attr_str(keys::PROVIDER)
            .unwrap_or_default()
            .to_string(),
        temperature: payload.attr_f64(keys::TEMPERATURE),
        usage: TokenUsage::from_payload(payload),
        duration_ms: span.duration_ms,
        error: span.error,
    }
}

fn decode_tool(span: &FilteredSpan) -> ToolSpan {
    let payload = &span.payload;
    ToolSpan {
        span_id: span.span_id.clone(),
        parent_id: span.parent_id.clone(),
        name: payload
            .attr_str(keys::TOOL_NAME)
            .map(str::to_string)
            .unwrap_or_else(|| span.name.clone()),
        arguments: payload.input.clone(),
        result: payload.output.clone(),
        duration_ms: span.duration_ms,
        error: span.error,
    }
}

fn decode_retriever(span: &FilteredSpan) -> RetrieverSpan {
    let payload = &span.payload;
    let query = match &payload.input {
        Value::Object(obj) => obj
            .get("query")
            .map(value_to_text)
            .unwrap_or_else(|| value_to_text(&payload.input)),
        other => value_to_text(other),
    };
    RetrieverSpan {
        span_id: span.span_id.clone(),
        parent_id: span.parent_id.clone(),
        name: span.name.clone(),
        query,
        top_k: payload.attr_u64(keys::TOP_K).unwrap_or(0),
        documents: decode_documents(&payload.output),
        duration_ms: span.duration_ms,
        error: span.error,
    }
}

fn decode_agent(span: &FilteredSpan) -> AgentSpan {
    let payload = &span.payload;
    AgentSpan {
        span_id: span.span_id.clone(),
        parent_id: span.parent_id.clone(),
        name: payload
            .attr_str(keys::AGENT_NAME)
            .map(str::to_string)
            .unwrap_or_else(|| span.name.clone()),
        framework: payload
            .attr_str(keys::AGENT_FRAMEWORK)
            .unwrap_or_default()
            .to_string(),
        system_prompt: payload
            .attr_str(keys::AGENT_SYSTEM_PROMPT)
            .unwrap_or_default()
            .to_string(),
        tools: payload.attr_str_list(keys::AGENT_TOOLS),
        max_iterations: payload.attr_u64(keys::AGENT_MAX_ITERATIONS).unwrap_or(0),
        input: value_to_text(&payload.input),
        output: value_to_text(&payload.output),
        duration_ms: span.duration_ms,
        error: span.error,
    }
}

/// Flatten a payload value to text.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(obj) => match obj.get("content").or_else(|| obj.get("text")) {
            Some(Value::String(s)) => s.clone(),
            _ => value.to_string(),
        },
        Value::Array(items) => match items.last() {
            Some(last @ Value::Object(_)) => value_to_text(last),
            _ => value.to_string(),
        },
        other => other.to_string(),
    }
}

fn decode_messages(value: &Value) -> Vec<Message> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![Message {
            role: "user".to_string(),
            content: s.clone(),
        }],
        Value::Array(items) => items.iter().filter_map(decode_message).collect(),
        Value::Object(obj) => match obj.get("messages") {
            Some(messages) => decode_messages(messages),
            None => decode_message(value).into_iter().collect(),
        },
        other => vec![Message {
            role: "user".to_string(),
            content: other.to_string(),
        }],
    }
}

fn decode_message(value: &Value) -> Option<Message> {
    match value {
        Value::String(s) => Some(Message {
            role: "user".to_string(),
            content: s.clone(),
        }),
        Value::Object(obj) => Some(Message {
            role: obj
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or("user")
                .to_string(),
            content: obj.get("content").map(value_to_text).unwrap_or_default(),
        }),
        _ => None,
    }
}

fn decode_documents(value: &Value) -> Vec<RetrievedDocument> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => match obj.get("documents") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(obj) => RetrievedDocument {
                id: obj
                    .get("id")
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| i.to_string()),
                content: obj.get("content").map(value_to_text).unwrap_or_default(),
                score: obj.get("score").and_then(Value::as_f64).unwrap_or(0.0),
            },
            other => RetrievedDocument {
                id: i.to_string(),
                content: value_to_text(other),
                score: 0.0,
            },
        })
        .collect()
}
