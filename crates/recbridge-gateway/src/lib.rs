//! Recbridge Gateway - tenant-scoped RPC pipeline
//!
//! Orchestrates the core ports for each tenant-scoped operation:
//! tenant resolution with warm per-tenant upstream clients, rate limiting,
//! cache lookup, query optimization, execution, cache store, and
//! write-through invalidation with change fan-out.

pub mod limiter;
pub mod resolver;
pub mod service;

pub use limiter::{RateLimiter, WindowClass};
pub use resolver::{ClientFactory, TenantResolver, UpstreamSettings};
pub use service::{BatchItem, BatchItemResult, Gateway, GatewayResponse};
