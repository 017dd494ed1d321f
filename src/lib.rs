//! # Info Fusion
//!
//! Multi-source article aggregation into a deduplicated, incrementally
//! updated and LLM-enriched knowledge base.
//!
//! Each run fetches every configured source, drops near-duplicates with
//! 128-bit SimHash fingerprints, matches what is left against the stored
//! knowledge base by a stable article key, and sends only new or changed
//! articles to the enricher. The knowledge base never shrinks because a
//! source was unreachable.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐   ┌──────────┐
//! │ Connectors   │──▶│ Normalize +  │──▶│ Reconcile     │──▶│ Enrich   │
//! │ feed/yuque/fs│   │ Dedup filter │   │ split/combine │   │ (bounded)│
//! └──────────────┘   └──────┬───────┘   └───────┬───────┘   └────┬─────┘
//!                           ▼                   ▼                ▼
//!                    filtered audit       knowledge base ◄───────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fusion sources                # check connector configuration
//! fusion run --dry-run          # what would change
//! fusion run                    # fetch, filter, enrich, store
//! fusion search "大模型"
//! fusion stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Articles, records and audit entries |
//! | [`fingerprint`] | Tokenization and 128-bit SimHash |
//! | [`dedup`] | Within-batch near-duplicate filter |
//! | [`key`] | Stable article keys |
//! | [`change`] | Change detection against stored records |
//! | [`reconcile`] | Split and combine against the knowledge base |
//! | [`enrich`] | Bounded-concurrency enrichment coordinator |
//! | [`llm`] | OpenAI-compatible enricher |
//! | [`traits`] | Connector trait and registry |
//! | [`ingest`] | Pipeline driver |
//! | [`store`] | JSON persistence |

pub mod account_cache;
pub mod change;
pub mod config;
pub mod connector_feed;
pub mod connector_fs;
pub mod connector_yuque;
pub mod cursor;
pub mod dedup;
pub mod enrich;
pub mod error;
pub mod fingerprint;
pub mod get;
pub mod ingest;
pub mod key;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod reconcile;
pub mod search;
pub mod sources;
pub mod stats;
pub mod store;
pub mod traits;
