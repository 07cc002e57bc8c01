//! # Tool Agent
//!
//! A tool-augmented conversational agent.
//!
//! This library provides:
//! - A tool registry and a dispatcher that turns every tool failure into an observation
//! - Session-scoped conversation memory, in memory or in SQLite
//! - The agent loop alternating model calls and tool dispatches
//! - Optional translation of answers into the caller's language
//! - An HTTP API for running turns
//!
//! ## Example
//!
//! ```rust,ignore
//! use tool_agent::{agent::{Agent, RunOptions}, config::Config};
//!
//! let config = Config::from_env()?;
//! let agent = Agent::from_config(&config)?;
//! let result = agent.run("What is 17 * 23?", "session-1", RunOptions::default()).await;
//! println!("{}", result.answer);
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod llm;
pub mod tools;

pub use config::Config;
