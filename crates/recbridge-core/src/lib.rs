//! Recbridge Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Tenant`, `ChangeEvent`, `SyncStateRow`, `LocalChange`, `ConflictRecord`
//! - **Query optimizer** - field expansion, predicate reordering, limit clamping, cache keys
//! - **Use cases** - `PullDeltaUseCase`, `PushChangesUseCase`, `ResolveConflictsUseCase`
//! - **Port definitions** - Traits for adapters: `IUpstreamClient`, `ICacheStore`,
//!   `IChangeLogReader`, `ISyncStateStore`, `ITenantDirectory`, `IEventBroadcaster`
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no I/O dependencies.
//! Ports define trait interfaces that adapter crates implement.
//! Use cases orchestrate domain entities through port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
