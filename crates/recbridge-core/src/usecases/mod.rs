//! Use cases orchestrating domain entities through port interfaces

pub mod pull_delta;
pub mod push_changes;
pub mod resolve_conflicts;

pub use pull_delta::{PullDeltaUseCase, PullOutcome, PullRequest};
pub use push_changes::{PushChangesUseCase, PushOutcome, PushRequest};
pub use resolve_conflicts::{ConflictResolution, ResolveConflictsUseCase, ResolveOutcome};
