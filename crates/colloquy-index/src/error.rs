//! Error types for the document index.

/// Errors from the document index and its embedding boundary.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = IndexError::Embedding("empty text".to_string());
        assert_eq!(err.to_string(), "embedding failed: empty text");

        let err = IndexError::LockPoisoned("documents".to_string());
        assert_eq!(err.to_string(), "lock poisoned: documents");
    }
}
