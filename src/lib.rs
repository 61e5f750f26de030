//! Agent Orchestration Service library crate.
//!
//! Wires a typed in-process bus, a catalog-driven guard and tool
//! executor, and a pipeline of long-lived agents (inspector, planner,
//! verifier, analyst) behind an axum HTTP surface.

pub mod agents;
pub mod api;
pub mod bus;
pub mod catalog;
pub mod config;
pub mod error;
pub mod guard;
pub mod health;
pub mod llm;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod server;
pub mod template;
pub mod tool_executor;
