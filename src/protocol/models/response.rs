use serde::{Deserialize, Serialize};

use super::{Item, ItemStatus, Tool, ToolChoice};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ResponseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    InProgress,
    Completed,
    Cancelled,
    Failed,
    Incomplete,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
    #[serde(default)]
    pub output: Vec<Item>,
}

impl Response {
    /// First finished function call in the output with the given name.
    ///
    /// Items without a status count as finished.
    #[must_use]
    pub fn function_call(&self, tool: &str) -> Option<(&str, &str)> {
        self.output.iter().find_map(|item| match item {
            Item::FunctionCall { name, call_id, arguments, status, .. }
                if name == tool && matches!(status, None | Some(ItemStatus::Completed)) =>
            {
                Some((call_id.as_str(), arguments.as_str()))
            }
            _ => None,
        })
    }
}
