//! # Arena MCP
//!
//! An MCP bridge exposing the Are.na content graph (channels, blocks,
//! connections, users) to AI tools.
//!
//! The interesting part lives in the client core: a resilient HTTP client
//! that normalizes both upstream API generations into one entity model,
//! retries transient failures with jittered exponential backoff, honors
//! `Retry-After`, bounds concurrency with a FIFO limiter, degrades search
//! from the current API to the legacy endpoint on permission failures, and
//! resolves free-form channel references (URLs, slugs, owner/slug pairs,
//! titles) into canonical identifiers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌───────────────┐   ┌────────────┐
//! │ MCP / HTTP  │──▶│ ToolRegistry  │──▶│ ArenaClient │──▶ api.are.na (v3)
//! │ CLI         │   │ (13 tools)    │   │ + resolver  │──▶ api.are.na (v2, search fallback)
//! └─────────────┘   └───────────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export ARENA_API_TOKEN=...
//! arena-mcp serve stdio                # for MCP clients
//! arena-mcp serve http                 # HTTP wrapper + /mcp endpoint
//! arena-mcp search "urban gardens"
//! arena-mcp get morgan/reading-list
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Normalized entity model |
//! | [`normalize`] | Raw JSON → entity normalization (both API generations) |
//! | [`error`] | Typed upstream/local errors and message mapping |
//! | [`retry`] | Pure retry/backoff policy |
//! | [`client`] | Request engine and typed operations |
//! | [`resolver`] | Free-form channel reference resolution |
//! | [`render`] | Markdown rendering of results |
//! | [`tools`] | Tool trait and registry |
//! | [`mcp`] | MCP JSON-RPC bridge |
//! | [`server`] | HTTP server wrapper |

pub mod client;
pub mod config;
pub mod error;
pub mod mcp;
pub mod models;
pub mod normalize;
pub mod render;
pub mod resolver;
pub mod retry;
pub mod server;
pub mod tools;
