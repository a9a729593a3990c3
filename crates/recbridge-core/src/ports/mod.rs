//! Port definitions (trait interfaces for adapters)

pub mod broadcast;
pub mod cache_store;
pub mod change_log;
pub mod record_writer;
pub mod sync_state;
pub mod tenant_directory;
pub mod upstream;

pub use broadcast::{IEventBroadcaster, NullBroadcaster};
pub use cache_store::ICacheStore;
pub use change_log::{ChangeLogOrder, ChangeLogQuery, IChangeLogReader};
pub use record_writer::IRecordWriter;
pub use sync_state::ISyncStateStore;
pub use tenant_directory::ITenantDirectory;
pub use upstream::IUpstreamClient;
