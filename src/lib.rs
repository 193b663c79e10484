//! # docquery
//!
//! A retrieval-augmented question answering engine over local documents.
//!
//! docquery ingests documents (text, Markdown, PDF, DOCX) from a directory,
//! chunks and embeds them into a SQLite-backed vector index, and answers
//! questions by retrieving the most relevant passages and handing them to a
//! chat model together with the user's recent conversation history.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌───────────┐
//! │ Documents │──▶│   Ingestion   │──▶│  SQLite   │
//! │ txt/md/   │   │ Chunk+Embed  │   │  vectors  │
//! │ pdf/docx  │   └──────────────┘   └─────┬─────┘
//! └───────────┘                            │
//!                 ┌──────────────┐         │
//!    question ──▶ │    Query     │◀────────┘
//!                 │ Retrieve+Gen │◀──▶ conversation memory
//!                 └──────┬───────┘
//!                        ▼
//!                      answer
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dq init                         # create the database
//! dq ingest ./docs                # load, chunk, embed, index
//! dq ask "How do I deploy?"       # retrieval-augmented answer
//! dq history alice                # show a user's conversation
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Crate-wide error taxonomy |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction per file format |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`db`] | Database connection |
//! | [`store`] | SQLite vector index |
//! | [`memory`] | Per-user conversation memory |
//! | [`generation`] | Chat completion providers |
//! | [`ingest`] | Ingestion pipeline |
//! | [`query`] | Query pipeline |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod memory;
pub mod models;
pub mod query;
pub mod store;
