// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use schemars::JsonSchema;
use serde_json::Value;
use std::error::Error;

/// Trait for tools that graph nodes invoke and chat models can be bound to.
///
/// `name()`, `description()` and `schema()` return borrowed values; implementors
/// keep them in fields or statics.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool name (unique within a registry)
    fn name(&self) -> &str;

    /// Returns a human-readable description, shown to chat models
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's input parameters
    fn schema(&self) -> &Value;

    /// Execute the tool with the given input and return the result
    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>>;
}

/// Derive a tool input schema from an argument struct.
pub fn args_schema<T: JsonSchema>() -> Value {
    let root = schemars::schema_for!(T);
    let mut schema = serde_json::to_value(root).unwrap_or_else(|_| serde_json::json!({}));
    // Function-calling APIs reject the draft marker and title at the top level.
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    schema
}
