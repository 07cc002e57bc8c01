//! System prompt template for the agent.

use crate::tools::ToolRegistry;

/// Build the system prompt listing the registered tools.
pub fn build_system_prompt(tools: &ToolRegistry, language: &str) -> String {
    let tool_descriptions = if tools.is_empty() {
        "(no tools are available; answer from your own knowledge)".to_string()
    } else {
        tools
            .list_tools()
            .iter()
            .map(|t| format!("- **{}**: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are a helpful assistant that answers questions step by step, calling tools when they help you reach an accurate answer.

## Available Tools
{tool_descriptions}

## Rules
1. Use a tool when the answer depends on facts, computation or current information you do not have.
2. Read each tool result carefully. Results starting with [tool_error] mean the call failed: fix the arguments, try another tool, or explain the limitation.
3. Do not invent tool results.
4. When you have enough information, reply with the final answer and no tool call.

Write every answer in {language}."#,
        tool_descriptions = tool_descriptions,
        language = language
    )
}
