//! # Briefly
//!
//! A document ingestion and adaptive retrieval-routing pipeline.
//!
//! Briefly turns uploaded text into searchable vector representations,
//! and at query time decides what kind of request it is handling,
//! whether retrieved context is trustworthy enough to answer from, and
//! which generation backend is safe and affordable for the caller's
//! tier — while recording an auditable provenance trail for every
//! answer.
//!
//! ## Architecture
//!
//! ```text
//! ingestion:  text ──▶ chunk ──▶ embed ──▶ vector store
//!                                             │
//! query:  classify ──▶ retrieve+evaluate ──▶ route ──▶ validate
//!                                             │
//!                              generate ──▶ provenance ──▶ persist
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Overlapping-window text chunking |
//! | [`embedding`] | Embedding gateway abstraction |
//! | [`store`] | Vector store trait, memory and SQLite backends |
//! | [`registry`] | Document status registry and usage sink |
//! | [`processor`] | Ingestion orchestration |
//! | [`classify`] | Query task classification |
//! | [`confidence`] | Retrieval confidence evaluation |
//! | [`router`] | Tier-aware model routing and safety validation |
//! | [`provenance`] | Per-answer audit trail builder |
//! | [`generation`] | Generation backend abstraction |
//! | [`conversation`] | Conversation turn persistence |
//! | [`chat`] | The query-time pipeline |
//! | [`db`] | Database connection and schema |

pub mod chat;
pub mod chunk;
pub mod classify;
pub mod config;
pub mod confidence;
pub mod conversation;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod processor;
pub mod provenance;
pub mod registry;
pub mod router;
pub mod store;
