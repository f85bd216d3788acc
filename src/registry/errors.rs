use crate::adapters::AdapterError;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("adapter already registered: {0}")]
    AlreadyRegistered(String),
    #[error("adapter not found: {0}")]
    NotFound(String),
    #[error("failed to close adapter {name}: {source}")]
    Close {
        name: String,
        #[source]
        source: AdapterError,
    },
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
