//! Error types for the memory store.

/// Errors from the memory store.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = MemoryError::LockPoisoned("sessions".to_string());
        assert_eq!(err.to_string(), "lock poisoned: sessions");
    }
}
