pub use super::sync_kv::Entity as SyncKv;
pub use super::sync_operation::Entity as SyncOperation;
