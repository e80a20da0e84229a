/// Errors returned by the memory facade.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// A required field was missing or blank.
    #[error("{0}")]
    Validation(String),
    /// The key-value backend failed; carries the backend message.
    #[error("store error: {0}")]
    Store(String),
}

impl MemoryError {
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
