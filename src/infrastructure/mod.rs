// Infrastructure modules
pub mod store;          // Persistence contract
pub mod sqlite_store;   // SQLite implementation of the store
pub mod messaging;      // Outbound delivery channel
pub mod logging;        // Tracing subscriber setup

pub use logging::initialize_logging;
pub use messaging::{ChannelMessenger, LogMessenger, Messenger, Outbound};
pub use sqlite_store::SqliteStore;
pub use store::EngagementStore;
