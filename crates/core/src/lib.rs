//! # Chatloom Core
//!
//! Domain types, traits, and error definitions for the Chatloom
//! conversational agent. This crate defines the domain model that all
//! other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod checkpoint;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use checkpoint::CheckpointStore;
pub use error::{CheckpointError, Error, ProviderError, Result, ToolError};
pub use message::{Message, MessageToolCall, Role, ThreadId};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
