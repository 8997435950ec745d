//! MAS Evolution - skill usage metrics and self-improvement
//!
//! Records every skill invocation, finds skills that are slow, failing or
//! missing, and turns those findings into improvement suggestions,
//! optimizations and A/B comparisons. Everything is exposed as MCP tools.
//!
//! # Example
//!
//! ```ignore
//! use mas_evolution::metrics::{Invocation, JsonFileStorage, MetricsStore, PatternAnalyzer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MetricsStore::new(Arc::new(JsonFileStorage::new("_bmad/_cache".into())));
//!     store.record_invocation(&Invocation::success("summarize", 1.2, 340.0)).await?;
//!     let patterns = PatternAnalyzer::new(store).analyze_usage_patterns().await?;
//!     println!("{:?}", patterns);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod config;
pub mod metrics;
pub mod tools;
pub mod server;
pub mod cli;

pub use config::Config;
pub use error::{EvolutionError, Result};
pub use server::McpServer;
pub use tools::{builtin_tools, execute_tool, ToolCall, ToolContext, ToolResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Served under this name; the package name uses an underscore
pub const NAME: &str = "mas-evolution";
