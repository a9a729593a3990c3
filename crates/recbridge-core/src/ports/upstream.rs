//! Upstream client port (driven/secondary port)
//!
//! The single interface the core uses to talk to an upstream instance. The
//! primary implementation speaks the JSON-RPC dialect of the reference
//! upstream, but the trait is deliberately narrow - `authenticate` plus one
//! generic `call` - so other record backends can sit behind it.
//!
//! ## Design Notes
//!
//! - Returns [`UpstreamError`], not `anyhow::Error`: the gateway branches on
//!   the classified kinds (session expiry retry, 404 mapping, and so on).
//! - Implementations own the session lifecycle. `call` on an unauthenticated
//!   client authenticates first; a session-expired response is retried once
//!   transparently before surfacing.
//! - Authentication must be single-flight per instance: concurrent callers
//!   await one in-flight authentication instead of racing their own.

use serde_json::{Map, Value};

use crate::domain::errors::UpstreamError;
use crate::domain::session::SessionInfo;

/// Port trait for upstream RPC access
#[async_trait::async_trait]
pub trait IUpstreamClient: Send + Sync {
    /// Authenticate with the upstream and establish a session
    ///
    /// Idempotent: if a live session exists it is returned without a round
    /// trip. Exactly one authentication is in flight at any moment.
    async fn authenticate(&self) -> Result<SessionInfo, UpstreamError>;

    /// Execute a named method on a model
    ///
    /// Implementations inject the base context (language, timezone, user id)
    /// into `kwargs.context` without overwriting caller-supplied keys.
    ///
    /// # Arguments
    /// * `model` - Target model name (opaque)
    /// * `method` - Upstream method (e.g. `search_read`, `create`)
    /// * `args` - Positional arguments
    /// * `kwargs` - Keyword arguments
    async fn call(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, UpstreamError>;
}
