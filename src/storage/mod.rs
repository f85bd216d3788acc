//! Stores the gateway keeps next to the adapters: event subscriptions and uploaded
//! package content.

pub mod content;
pub mod subscription;

pub use content::{MemoryPackageContentStore, PackageContentStore, DEFAULT_MAX_PACKAGE_SIZE};
pub use subscription::{MemorySubscriptionStore, Subscription, SubscriptionFilter, SubscriptionStore};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },
    #[error("content too large: {size} bytes exceeds limit of {max} bytes")]
    ContentTooLarge { size: usize, max: usize },
    #[error("store is closed")]
    Closed,
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for crate::adapters::AdapterError {
    fn from(err: StoreError) -> Self {
        use crate::adapters::AdapterError;
        match err {
            StoreError::NotFound { kind, id } => AdapterError::NotFound { kind, id },
            StoreError::AlreadyExists { kind, id } => AdapterError::AlreadyExists { kind, id },
            StoreError::ContentTooLarge { size, max } => AdapterError::ContentTooLarge { size, max },
            StoreError::Closed => AdapterError::ConnectionFailed("store is closed".to_string()),
        }
    }
}
