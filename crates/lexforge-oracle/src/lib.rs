//! External oracle interfaces for the amendment pipeline
//!
//! Two black-box services sit behind traits here:
//! - [`TransformOracle`] rewrites a unit's text according to one amendment
//!   instruction
//! - [`AddressOracle`] picks which candidate unit an ambiguous address
//!   string refers to
//!
//! Both may be slow or fail. A transform reply may also "succeed" while
//! carrying the reserved [`FAILURE_MARKER`] prefix, which signals that the
//! oracle could not locate the text the instruction asks to change; callers
//! must treat such replies as per-target failures, not as new content.
//!
//! Deterministic in-process implementations live in [`mock`]; the real
//! HTTP-backed client is behind the `openai` feature.

use async_trait::async_trait;
use thiserror::Error;

pub mod mock;

#[cfg(feature = "openai")]
pub mod remote;

/// Reserved prefix a transform oracle puts on replies that report failure
/// instead of rewritten text.
pub const FAILURE_MARKER: &str = "[ОШИБКА:";

/// Whether a transform reply is a failure report rather than content.
pub fn is_failure_reply(reply: &str) -> bool {
    reply.trim_start().starts_with(FAILURE_MARKER)
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("network error: {0}")]
    Network(String),

    #[error("oracle api error: {0}")]
    Api(String),

    #[error("invalid oracle response: {0}")]
    InvalidResponse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("no oracle configured: {0}")]
    NotConfigured(String),
}

/// Rewrites unit text per one amendment instruction.
#[async_trait]
pub trait TransformOracle: Send + Sync {
    /// Returns the full revised text of the unit, or a reply starting with
    /// [`FAILURE_MARKER`] when the instruction's text cannot be located.
    async fn transform(&self, before: &str, instruction: &str) -> Result<String, OracleError>;
}

/// Matches an address string against candidate unit labels.
#[async_trait]
pub trait AddressOracle: Send + Sync {
    /// Returns one of `candidates` or None. Callers must validate that a
    /// returned value really is a member of `candidates` before trusting it.
    async fn match_address(
        &self,
        address: &str,
        candidates: &[String],
    ) -> Result<Option<String>, OracleError>;
}
