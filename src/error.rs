//! Error types for pelago
//!
//! A single error enum covers the whole runtime. User code participates in
//! error reporting through the [`Error::User`] variant, whose message is
//! carried verbatim.

use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error type for the evolution runtime
#[derive(Debug, Error)]
pub enum Error {
    /// An argument violated a contract (sizes, thread-safety levels, missing features)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Arithmetic overflow while sizing an output buffer
    #[error("overflow: {0}")]
    Overflow(String),

    /// Failure raised by user-supplied code, carried verbatim
    #[error("{0}")]
    User(String),

    /// Failure of a locking or threading primitive
    #[error("synchronization failure: {0}")]
    Synchronization(String),

    /// Serialization or deserialization failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error while persisting or restoring state
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lock a mutex, mapping poisoning to [`Error::Synchronization`].
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| {
        Error::Synchronization(format!(
            "the {what} lock was poisoned by a panicked thread"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_error_message_is_verbatim() {
        let err = Error::User("boom".to_string());
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_invalid_argument_display() {
        let err = Error::InvalidArgument("batch size 4 is not a multiple of 3".to_string());
        assert_eq!(
            err.to_string(),
            "invalid argument: batch size 4 is not a multiple of 3"
        );
    }

    #[test]
    fn test_lock_maps_poison_to_synchronization() {
        let mutex = std::sync::Arc::new(Mutex::new(0_u32));
        let poisoner = std::sync::Arc::clone(&mutex);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        let err = lock(&*mutex, "counter").unwrap_err();
        assert!(matches!(err, Error::Synchronization(_)));
        assert!(err.to_string().contains("counter"));
    }
}
