//! Ground truth attached to a trace.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Expected behaviour for one trace, used by evaluators that need ground
/// truth. Evaluators skip when the fields they need are missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub expected_tools: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Task {
    pub fn new(task_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            input: input.into(),
            ..Self::default()
        }
    }

    pub fn with_expected_output(mut self, output: impl Into<String>) -> Self {
        self.expected_output = Some(output.into());
        self
    }

    pub fn with_expected_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_tools = tools.into_iter().map(Into::into).collect();
        self
    }
}
