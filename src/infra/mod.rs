pub mod in_memory;
pub mod sqlite_store;
pub mod webhook_notifier;

pub use in_memory::{
    InMemoryDirectory, InMemoryFeedbackStore, InMemoryOperatorDirectory, InMemoryPendingEntryStore,
};
pub use sqlite_store::SqliteStore;
pub use webhook_notifier::{LogNotifier, WebhookNotifier};
