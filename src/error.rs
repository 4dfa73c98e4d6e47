//! Typed errors for the Are.na client core.
//!
//! HTTP failures keep the status, parsed body, `Retry-After` hint, and the
//! request URL so callers can decide whether to retry, fix credentials, or
//! give up. Resolution failures (ambiguity, owner mismatch) are synthesized
//! locally and never correspond to an upstream status.

use serde::Serialize;
use thiserror::Error;

/// A channel candidate surfaced in an ambiguity error.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelCandidate {
    pub title: String,
    pub slug: String,
    pub id: String,
}

#[derive(Debug, Error)]
pub enum ArenaError {
    /// Upstream returned a non-success HTTP status.
    #[error("upstream returned HTTP {status} for {url}")]
    Http {
        status: u16,
        body: Option<serde_json::Value>,
        /// Seconds suggested by a `Retry-After` header, when present.
        retry_after: Option<f64>,
        url: String,
    },

    /// Transport-level failure (connection refused, timeout, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// More than one plausible channel matched a free-form reference.
    #[error("ambiguous channel reference \"{input}\" ({} candidates)", candidates.len())]
    AmbiguousChannel {
        input: String,
        candidates: Vec<ChannelCandidate>,
    },

    /// The resolved channel exists but belongs to someone else.
    #[error("channel \"{slug}\" is owned by {}, expected \"{expected}\"",
            found.as_deref().map(|f| format!("\"{f}\"")).unwrap_or_else(|| "an unknown user".into()))]
    OwnerMismatch {
        slug: String,
        expected: String,
        found: Option<String>,
    },
}

impl ArenaError {
    /// HTTP status code, if this error came from an upstream response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ArenaError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Retryable statuses are 429 and anything 5xx; transport failures are
    /// always retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ArenaError::Http { status, .. } => *status == 429 || *status >= 500,
            ArenaError::Network(_) => true,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn retry_after(&self) -> Option<f64> {
        match self {
            ArenaError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Best-effort diagnostic text from the upstream body: `details`, then
    /// `message`, then `error`, then the raw body when it is a bare string.
    pub fn diagnostic(&self) -> Option<String> {
        let body = match self {
            ArenaError::Http { body: Some(b), .. } => b,
            _ => return None,
        };
        for key in ["details", "message", "error"] {
            if let Some(text) = body.get(key).and_then(|v| v.as_str()) {
                if !text.is_empty() {
                    return Some(text.to_string());
                }
            }
        }
        body.as_str().map(|s| s.to_string())
    }
}

/// What the caller was doing when the error occurred, for message rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorContext<'a> {
    pub operation: &'a str,
    pub target: Option<&'a str>,
}

/// Maps a typed error plus operation context to a stable human-readable
/// message. Pure function of its inputs; no side effects.
pub fn user_message(err: &ArenaError, ctx: ErrorContext<'_>) -> String {
    let target = ctx.target.map(|t| format!(" \"{t}\"")).unwrap_or_default();
    match err {
        ArenaError::Http { status, .. } => match status {
            400 | 422 => {
                let detail = err
                    .diagnostic()
                    .unwrap_or_else(|| "the request was rejected".to_string());
                format!("{} failed{target}: {detail}", ctx.operation)
            }
            401 => format!(
                "{} failed: the Are.na access token was rejected. Check ARENA_API_TOKEN or api.access_token.",
                ctx.operation
            ),
            403 => format!(
                "{} failed{target}: you don't have permission for this resource.",
                ctx.operation
            ),
            404 => format!("{} failed: nothing found for{target}.", ctx.operation),
            429 => {
                let hint = err
                    .retry_after()
                    .map(|s| format!(" (retry after {s:.0}s)"))
                    .unwrap_or_default();
                format!("{} was rate-limited by Are.na{hint}.", ctx.operation)
            }
            s if *s >= 500 => format!(
                "{} failed: Are.na returned a server error ({s}). Try again shortly.",
                ctx.operation
            ),
            s => format!("{} failed{target}: HTTP {s}.", ctx.operation),
        },
        ArenaError::Network(detail) => {
            format!("{} failed: could not reach Are.na ({detail}).", ctx.operation)
        }
        ArenaError::AmbiguousChannel { input, candidates } => {
            let mut msg = format!(
                "{} found multiple channels matching \"{input}\":\n",
                ctx.operation
            );
            for c in candidates.iter().take(5) {
                msg.push_str(&format!("  - {} (slug: {}, id: {})\n", c.title, c.slug, c.id));
            }
            msg.push_str("Use an exact slug or URL to disambiguate.");
            msg
        }
        ArenaError::OwnerMismatch { .. } => format!("{} failed: {err}", ctx.operation),
    }
}
