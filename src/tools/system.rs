//! System tools: clock and tool catalog.

use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};

use super::{Tool, ToolArgs, ToolCategory, ToolInfo};

/// Report the current local date and/or time.
pub struct CurrentTime;

#[async_trait]
impl Tool for CurrentTime {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current local date and time."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "enum": ["datetime", "date", "time"],
                    "description": "What to return (default: datetime)"
                }
            }
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::System
    }

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String> {
        let format = args.get("format").and_then(Value::as_str).unwrap_or("datetime");
        let pattern = match format {
            "datetime" => "%Y-%m-%d %H:%M:%S",
            "date" => "%Y-%m-%d",
            "time" => "%H:%M:%S",
            other => anyhow::bail!("Unsupported format '{}': use datetime, date or time", other),
        };
        Ok(Local::now().format(pattern).to_string())
    }
}

/// Describe the tools available to the agent.
pub struct ListTools {
    catalog: Vec<ToolInfo>,
}

impl ListTools {
    pub fn new(catalog: Vec<ToolInfo>) -> Self {
        Self { catalog }
    }

    /// Catalog entry for this tool itself.
    pub fn info() -> ToolInfo {
        ToolInfo {
            name: "list_tools".to_string(),
            description: LIST_TOOLS_DESCRIPTION.to_string(),
            category: ToolCategory::System,
        }
    }
}

const LIST_TOOLS_DESCRIPTION: &str = "List every available tool with a short description.";

#[async_trait]
impl Tool for ListTools {
    fn name(&self) -> &str {
        "list_tools"
    }

    fn description(&self) -> &str {
        LIST_TOOLS_DESCRIPTION
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::System
    }

    async fn execute(&self, _args: &ToolArgs) -> anyhow::Result<String> {
        if self.catalog.is_empty() {
            return Ok("No tools available.".to_string());
        }
        Ok(self
            .catalog
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
