//! # Project Memory
//!
//! A persistent, file-backed memory for a game codebase and the tooling
//! that feeds and queries it.
//!
//! Source files are scanned with regex heuristics into class and file
//! records, naming patterns, and summary insights. Sessions, insights,
//! patterns, problems, context windows and development events live in one
//! JSON document that is rewritten on every change. A knowledge query
//! service exposes the store to assistant tooling over a small
//! request/response protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌───────────────┐
//! │ Source tree │──▶│   Indexer   │──▶│ Memory Store  │
//! │  .h / .cpp  │   │ Scanner+Lint│   │ (JSON doc)    │
//! └─────────────┘   └─────────────┘   └──────┬────────┘
//!                                            │
//!                      ┌─────────────────────┤
//!                      ▼                     ▼
//!                 ┌──────────┐       ┌───────────────┐
//!                 │   CLI    │       │ Query service │
//!                 │  (pmem)  │       │ (HTTP, POST /)│
//!                 └──────────┘       └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pmem init                         # starter config + first session
//! pmem index ./Source               # scan the source tree
//! pmem search inventory --categories patterns
//! pmem analyze class AHeroCharacter
//! pmem serve                        # start the query service
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed store and protocol errors |
//! | [`models`] | Persisted record types |
//! | [`scanner`] | Heuristic structural extraction |
//! | [`lint`] | Magic-number and long-function checks |
//! | [`relevance`] | Keyword relevance, similarity, context tags |
//! | [`store`] | The memory store |
//! | [`indexer`] | Source tree traversal |
//! | [`progress`] | Indexing progress reporters |
//! | [`export`] | Snapshots and the source-index artifact |
//! | [`knowledge`] | Cache, graph, overviews, dependency analysis |
//! | [`code_search`] | Live queries over the source tree |
//! | [`traits`] | `Tool` trait and registry |
//! | [`tools`] | Built-in tools |
//! | [`resources`] | `memory://` resources |
//! | [`prompts`] | Prompt templates |
//! | [`protocol`] | Request envelope and dispatch |
//! | [`server`] | HTTP transport |
//! | [`stats`] | `pmem stats` output |

pub mod code_search;
pub mod config;
pub mod error;
pub mod export;
pub mod indexer;
pub mod knowledge;
pub mod lint;
pub mod models;
pub mod progress;
pub mod prompts;
pub mod protocol;
pub mod relevance;
pub mod resources;
pub mod scanner;
pub mod server;
pub mod stats;
pub mod store;
pub mod tools;
pub mod traits;
