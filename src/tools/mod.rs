//! Tools the agent can offer to the model, and the registry that holds them.
//!
//! Every capability, whether a struct or a plain function, is adapted to the
//! [`Tool`] trait at registration time. The registry keeps registration order
//! so the tool list advertised to the model is identical from run to run.

mod data;
mod math;
mod system;
mod web;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::llm::ToolSchema;

pub use data::{JsonParser, StringManipulator, TextSummarizer};
pub use math::Calculator;
pub use system::{CurrentTime, ListTools};
pub use web::WebSearch;

/// Arguments passed to a tool: parameter name to value.
pub type ToolArgs = Map<String, Value>;

/// A capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used by the model to call this tool.
    fn name(&self) -> &str;

    /// Model-readable summary of what the tool does.
    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Custom
    }

    /// Run the tool. Errors are reported back to the model as observations.
    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String>;
}

type ToolFn = dyn Fn(&ToolArgs) -> anyhow::Result<String> + Send + Sync;

/// Adapts a plain function into a [`Tool`].
pub struct FnTool {
    name: String,
    description: String,
    parameters: Value,
    category: ToolCategory,
    func: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(&ToolArgs) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({ "type": "object", "properties": {} }),
            category: ToolCategory::Custom,
            func: Box::new(func),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = category;
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    fn category(&self) -> ToolCategory {
        self.category
    }

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String> {
        (self.func)(args)
    }
}

/// Group a tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Search,
    Data,
    System,
    Math,
    /// Anything registered by the embedding application
    Custom,
}

impl ToolCategory {
    pub const ALL: [ToolCategory; 5] = [
        ToolCategory::Search,
        ToolCategory::Data,
        ToolCategory::System,
        ToolCategory::Math,
        ToolCategory::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Search => "search",
            ToolCategory::Data => "data",
            ToolCategory::System => "system",
            ToolCategory::Math => "math",
            ToolCategory::Custom => "custom",
        }
    }
}

impl FromStr for ToolCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ToolCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = ToolCategory::ALL.iter().map(|c| c.as_str()).collect();
                format!("unknown category '{}', expected one of: {}", wanted, known.join(", "))
            })
    }
}

/// What to do when a tool name is registered twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Fail registration with [`RegistryError::DuplicateTool`].
    #[default]
    Reject,
    /// Replace the earlier tool in place and log a warning.
    Replace,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(DuplicatePolicy::Reject),
            "replace" => Ok(DuplicatePolicy::Replace),
            other => Err(format!("expected 'reject' or 'replace', got: {}", other)),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("invalid tool '{name}': {reason}")]
    InvalidTool { name: String, reason: String },
}

/// Name, description and category of a registered tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
}

impl ToolInfo {
    fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            category: tool.category(),
        }
    }
}

/// Registry of available tools, in registration order.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
    policy: DuplicatePolicy,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("policy", &self.policy)
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry that rejects duplicate names.
    pub fn new() -> Self {
        Self::with_policy(DuplicatePolicy::default())
    }

    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            policy,
        }
    }

    /// Create a registry holding every built-in tool.
    pub fn with_builtin_tools(policy: DuplicatePolicy) -> Result<Self, RegistryError> {
        let mut registry = Self::with_policy(policy);
        registry.register(Calculator)?;
        registry.register(CurrentTime)?;
        registry.register(StringManipulator)?;
        registry.register(JsonParser)?;
        registry.register(TextSummarizer)?;
        registry.register(WebSearch)?;

        let mut catalog = registry.list_tools();
        catalog.push(ListTools::info());
        registry.register(ListTools::new(catalog))?;

        tracing::info!("Tool registry initialized with {} tools", registry.len());
        Ok(registry)
    }

    /// Register a tool.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        self.register_shared(Arc::new(tool))
    }

    /// Register a shared tool.
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        validate(tool.as_ref())?;
        let name = tool.name().to_string();

        match self.index.get(&name) {
            Some(&position) => match self.policy {
                DuplicatePolicy::Reject => Err(RegistryError::DuplicateTool(name)),
                DuplicatePolicy::Replace => {
                    tracing::warn!(tool = %name, "Replacing previously registered tool");
                    self.tools[position] = tool;
                    Ok(())
                }
            },
            None => {
                tracing::debug!(tool = %name, "Registered tool");
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
                Ok(())
            }
        }
    }

    /// Exact-name lookup.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All tools in registration order.
    pub fn all(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools.iter().map(|t| ToolInfo::of(t.as_ref())).collect()
    }

    /// Tools of one category, in registration order.
    pub fn by_category(&self, category: ToolCategory) -> Vec<Arc<dyn Tool>> {
        self.tools
            .iter()
            .filter(|t| t.category() == category)
            .cloned()
            .collect()
    }

    /// Schemas advertised to the model, in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }
}

fn validate(tool: &dyn Tool) -> Result<(), RegistryError> {
    let name = tool.name();
    let invalid = |reason: &str| RegistryError::InvalidTool {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(invalid("name contains whitespace"));
    }
    if tool.description().trim().is_empty() {
        return Err(invalid("description is empty"));
    }
    Ok(())
}

/// Read a required string argument.
pub(crate) fn required_str<'a>(args: &'a ToolArgs, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> FnTool {
        FnTool::new("echo", "Echo the text argument", |args| {
            Ok(required_str(args, "text")?.to_string())
        })
    }

    #[test]
    fn resolve_is_exact_and_stable() {
        let mut registry = ToolRegistry::new();
        registry.register(echo()).unwrap();

        let first = registry.resolve("echo").unwrap();
        let second = registry.resolve("echo").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.resolve("Echo").is_none());
        assert!(registry.resolve("ech").is_none());
    }

    #[test]
    fn all_preserves_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register(FnTool::new(name, "test tool", |_| Ok(String::new())))
                .unwrap();
        }
        let names: Vec<&str> = registry.all().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);

        let schema_names: Vec<String> = registry.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(schema_names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn duplicate_is_rejected_by_default() {
        let mut registry = ToolRegistry::new();
        registry.register(echo()).unwrap();
        assert_eq!(
            registry.register(echo()),
            Err(RegistryError::DuplicateTool("echo".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn replace_policy_keeps_position_and_uses_last_registration() {
        let mut registry = ToolRegistry::with_policy(DuplicatePolicy::Replace);
        registry.register(echo()).unwrap();
        registry
            .register(FnTool::new("other", "other tool", |_| Ok("other".into())))
            .unwrap();
        registry
            .register(FnTool::new("echo", "Echo v2", |_| Ok("v2".into())))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.all()[0].description(), "Echo v2");
        let out = registry.resolve("echo").unwrap().execute(&ToolArgs::new()).await.unwrap();
        assert_eq!(out, "v2");
    }

    #[test]
    fn invalid_tools_are_refused() {
        let mut registry = ToolRegistry::new();
        assert!(matches!(
            registry.register(FnTool::new("", "desc", |_| Ok(String::new()))),
            Err(RegistryError::InvalidTool { .. })
        ));
        assert!(matches!(
            registry.register(FnTool::new("two words", "desc", |_| Ok(String::new()))),
            Err(RegistryError::InvalidTool { .. })
        ));
        assert!(matches!(
            registry.register(FnTool::new("quiet", "  ", |_| Ok(String::new()))),
            Err(RegistryError::InvalidTool { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn builtin_registry_lists_itself() {
        let registry = ToolRegistry::with_builtin_tools(DuplicatePolicy::Reject).unwrap();
        let names: Vec<String> = registry.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "calculator",
                "current_time",
                "string_manipulator",
                "json_parser",
                "text_summarizer",
                "web_search",
                "list_tools"
            ]
        );
    }

    #[test]
    fn tools_are_grouped_by_category() {
        let mut registry = ToolRegistry::with_builtin_tools(DuplicatePolicy::Reject).unwrap();
        registry.register(echo()).unwrap();

        let names = |category: ToolCategory| -> Vec<String> {
            registry
                .by_category(category)
                .iter()
                .map(|t| t.name().to_string())
                .collect()
        };
        assert_eq!(names(ToolCategory::Data), vec!["string_manipulator", "json_parser", "text_summarizer"]);
        assert_eq!(names(ToolCategory::System), vec!["current_time", "list_tools"]);
        assert_eq!(names(ToolCategory::Math), vec!["calculator"]);
        assert_eq!(names(ToolCategory::Search), vec!["web_search"]);
        assert_eq!(names(ToolCategory::Custom), vec!["echo"]);

        let listed = registry.list_tools();
        assert_eq!(listed.last().map(|t| t.category), Some(ToolCategory::Custom));
    }

    #[test]
    fn category_parses() {
        assert_eq!("Data".parse::<ToolCategory>(), Ok(ToolCategory::Data));
        assert_eq!(" search ".parse::<ToolCategory>(), Ok(ToolCategory::Search));
        assert!("network".parse::<ToolCategory>().unwrap_err().contains("search, data"));
    }

    #[test]
    fn duplicate_policy_parses() {
        assert_eq!("Reject".parse::<DuplicatePolicy>(), Ok(DuplicatePolicy::Reject));
        assert_eq!(" replace ".parse::<DuplicatePolicy>(), Ok(DuplicatePolicy::Replace));
        assert!("overwrite".parse::<DuplicatePolicy>().is_err());
    }
}
