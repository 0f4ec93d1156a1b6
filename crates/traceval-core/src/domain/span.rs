//! Raw spans as delivered by a trace source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque span content: input, output and a flat attribute bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanPayload {
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl SpanPayload {
    pub fn is_empty(&self) -> bool {
        self.input.is_null() && self.output.is_null() && self.attributes.is_empty()
    }

    /// String attribute, `None` when absent or not a string.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Numeric attribute. Numeric strings are accepted since several
    /// exporters stringify every attribute.
    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        match self.attributes.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Non-negative integer attribute (negative or fractional values are
    /// truncated toward zero).
    pub fn attr_u64(&self, key: &str) -> Option<u64> {
        match self.attributes.get(key)? {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// List-of-strings attribute. Accepts a JSON array or a JSON-encoded
    /// array inside a string.
    pub fn attr_str_list(&self, key: &str) -> Vec<String> {
        let value = match self.attributes.get(key) {
            Some(Value::String(s)) => serde_json::from_str(s).unwrap_or(Value::Null),
            Some(v) => v.clone(),
            None => Value::Null,
        };
        value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        Value::Object(obj) => obj
                            .get("name")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One span of a raw trace, exactly as received.
///
/// `parent_id` may reference a span that is not part of the trace; such
/// spans are treated as roots by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSpan {
    pub span_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Explicit duration; takes precedence over `end_time - start_time`.
    #[serde(default)]
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub payload: SpanPayload,
    #[serde(default)]
    pub error: bool,
}

impl RawSpan {
    /// Minimal span with the given identity and kind.
    pub fn new(
        span_id: impl Into<String>,
        parent_id: Option<&str>,
        kind: impl Into<String>,
    ) -> Self {
        let span_id = span_id.into();
        Self {
            name: span_id.clone(),
            span_id,
            parent_id: parent_id.map(str::to_string),
            kind: kind.into(),
            start_time: None,
            end_time: None,
            duration_ms: None,
            payload: SpanPayload::default(),
            error: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.payload.input = input;
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.payload.output = output;
        self
    }

    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.payload.attributes.insert(key.to_string(), value);
        self
    }

    pub fn with_error(mut self, error: bool) -> Self {
        self.error = error;
        self
    }

    /// Duration in milliseconds; zero when neither an explicit duration nor
    /// a well-ordered start/end pair is available.
    pub fn duration_ms(&self) -> f64 {
        if let Some(ms) = self.duration_ms {
            return ms.max(0.0);
        }
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if end >= start => {
                (end - start).num_microseconds().unwrap_or(0) as f64 / 1000.0
            }
            _ => 0.0,
        }
    }
}
