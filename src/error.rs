//! Error taxonomy for the pipeline stages.
//!
//! Each stage has its own error type so the driver can decide how far a
//! failure is allowed to travel:
//!
//! | Error | Raised by | Contained at |
//! |-------|-----------|--------------|
//! | [`FetchError`] | connectors | the source (contributes zero documents) |
//! | [`FingerprintError`] | fingerprint engine | the document (routed to the filtered audit) |
//! | [`EnrichmentError`] | enrichers | the document (stored with an error marker) |
//! | [`PersistenceError`] | the JSON store | the run (fatal on write) |

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A source could not be listed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("connector misconfigured: {0}")]
    Config(String),
}

/// Content could not be fingerprinted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    /// The content carries NUL bytes, i.e. binary data decoded as text.
    #[error("content is not text ({nul_bytes} NUL bytes)")]
    NotText { nul_bytes: usize },
}

/// A single enrichment attempt failed.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("enricher panicked: {0}")]
    Panicked(String),

    #[error("enricher is not configured: {0}")]
    NotConfigured(String),
}

/// The knowledge base, audit file or fetch state could not be read or written.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
