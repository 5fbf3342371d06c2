use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool the model may call. Only function tools are registered by the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tool {
    Function {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        /// Draft-07 JSON schema of the arguments object.
        parameters: Value,
    },
}

impl Tool {
    #[must_use]
    pub fn name(&self) -> &str {
        let Self::Function { name, .. } = self;
        name
    }
}

/// How the model picks among registered tools.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
}
