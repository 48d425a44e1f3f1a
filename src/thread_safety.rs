//! Thread-safety classification
//!
//! User-supplied objects declare how they tolerate concurrent use. The
//! runtime consults the declared level to pick between parallelization
//! strategies; it never verifies the declaration at runtime.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered thread-safety levels declared by user objects.
///
/// The ordering is total: `None < Basic < Constant`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ThreadSafety {
    /// No concurrent operation on the object is safe, not even copying it
    /// while another thread operates on the original.
    None,
    /// The object may be copied while another thread operates on the
    /// original, and distinct instances may be used concurrently.
    Basic,
    /// Operations on the same instance may run concurrently.
    Constant,
}

impl ThreadSafety {
    /// Whether this level provides at least the guarantees of `other`.
    pub fn is_at_least(self, other: ThreadSafety) -> bool {
        self >= other
    }
}

impl Default for ThreadSafety {
    fn default() -> Self {
        Self::Basic
    }
}

impl fmt::Display for ThreadSafety {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Constant => "constant",
        };
        write!(f, "{label}")
    }
}
