use crate::places::{Place, PlacesResponse};
use crate::protocol::models::{Item, SessionUpdate, Tool, ToolChoice};
use crate::{Error, Result};
use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use schemars::schema::RootSchema;
use serde::Deserialize;

pub const SEARCH_PLACES: &str = "search_places";
const SEARCH_PLACES_DESCRIPTION: &str =
    "Search for pet-friendly places such as parks, cafes, hotels and restaurants near a location.";

/// Arguments of the `search_places` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchPlacesArgs {
    /// What to look for, e.g. "dog-friendly cafe".
    pub query: String,
    /// Where to look, as "lat,lon".
    pub location: String,
}

#[derive(Clone, Debug)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub schema: RootSchema,
}

impl ToolDefinition {
    /// Describe a tool whose arguments deserialize into `T`.
    #[must_use]
    pub fn of<T: JsonSchema>(name: &str, description: Option<&str>) -> Self {
        let generator = SchemaSettings::draft07()
            .with(|s| {
                s.meta_schema = None;
                s.option_add_null_type = false;
                s.inline_subschemas = true;
            })
            .into_generator();
        let mut schema = generator.into_root_schema_for::<T>();
        schema.schema.metadata().title = None;
        Self { name: name.to_string(), description: description.map(str::to_string), schema }
    }

    /// Protocol-level tool definition.
    ///
    /// # Errors
    /// Returns an error if schema serialization fails.
    #[allow(clippy::result_large_err)]
    pub fn try_as_tool(&self) -> Result<Tool> {
        Ok(Tool::Function {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: serde_json::to_value(&self.schema)?,
        })
    }
}

#[must_use]
pub fn search_places_definition() -> ToolDefinition {
    ToolDefinition::of::<SearchPlacesArgs>(SEARCH_PLACES, Some(SEARCH_PLACES_DESCRIPTION))
}

/// The `session.update` payload that makes `search_places` callable.
///
/// # Errors
/// Returns an error if schema serialization fails.
#[allow(clippy::result_large_err)]
pub fn tool_registration() -> Result<SessionUpdate> {
    Ok(SessionUpdate {
        tools: Some(vec![search_places_definition().try_as_tool()?]),
        tool_choice: Some(ToolChoice::Auto),
        ..Default::default()
    })
}

/// A validated `search_places` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub query: String,
    pub location: String,
}

impl ToolCallRequest {
    /// Parse the raw `arguments` string of a function call.
    ///
    /// # Errors
    /// [`Error::Validation`] for non-JSON arguments or a missing or blank field.
    #[allow(clippy::result_large_err)]
    pub fn parse(call_id: &str, arguments: &str) -> Result<Self> {
        let args: SearchPlacesArgs = serde_json::from_str(arguments)
            .map_err(|e| Error::Validation(format!("{SEARCH_PLACES} arguments: {e}")))?;
        if args.query.trim().is_empty() || args.location.trim().is_empty() {
            return Err(Error::Validation(format!("{SEARCH_PLACES} needs a query and a location")));
        }
        Ok(Self { call_id: call_id.to_string(), query: args.query, location: args.location })
    }

    /// The `function_call_output` item answering this call.
    ///
    /// # Errors
    /// Returns an error if the result cannot be serialized.
    #[allow(clippy::result_large_err)]
    pub fn output(&self, places: &[Place]) -> Result<Item> {
        let body = PlacesResponse { query: self.query.clone(), places: places.to_vec() };
        Ok(Item::FunctionCallOutput {
            id: None,
            call_id: self.call_id.clone(),
            output: serde_json::to_string(&body)?,
        })
    }
}
