//! Recbridge Upstream - JSON-RPC adapter for the record backend
//!
//! Implements the core's upstream-facing ports:
//! - [`client::RpcClient`] - session-authenticated JSON-RPC transport
//!   (`IUpstreamClient`) with single-flight authentication, transparent
//!   session-expiry retry, and transient-error backoff
//! - [`changelog::ChangeLogReader`] - reads the append-only change log
//!   (`IChangeLogReader`)
//! - [`syncstate::RpcSyncStateStore`] - per-device watermark rows exposed
//!   by the upstream via ordinary RPC (`ISyncStateStore`)

pub mod changelog;
pub mod client;
pub mod syncstate;

pub use changelog::ChangeLogReader;
pub use client::{RpcClient, UpstreamClientConfig};
pub use syncstate::RpcSyncStateStore;
