use crate::object::ObjectId;
use crate::value::Key;
use crate::variable::VariableId;

/// All errors that can occur within tendril.
///
/// The first four variants are the save-blocking and construction failures
/// a caller is expected to handle; the rest are operational errors raised by
/// the arena (stale handles, bad indices, mismatched buffers, I/O).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A wrapper's contents no longer match its snapshot, or a tracked entry
    /// was removed in a way that cannot be restored.
    #[error("Unable to save the object {object}: {reason}")]
    StructuralMutation { object: String, reason: String },

    /// A dictionary wrapper holds a trackable value under a non-string key.
    #[error(
        "Unable to save the object {object}: the wrapped dictionary contains a non-string key \
         ({key}) which maps to a trackable object or mutable data structure. If you don't need \
         this dictionary checkpointed, wrap the value in a no-dependency marker"
    )]
    UnsupportedKey { object: String, key: Key },

    /// A tracked list element was overwritten, inserted, or removed.
    #[error(
        "Unable to save the object {object}: A list element was replaced, inserted, or deleted. \
         Tracking is exclusively for append-only lists; if you don't need this list \
         checkpointed, wrap it in a no-dependency marker"
    )]
    IncompatibleReplacement { object: String },

    /// An operation needs a state the object has not reached (e.g. an unbuilt layer).
    #[error("construction error: {0}")]
    Construction(String),

    /// Handle does not belong to this arena.
    #[error("unknown object {0:?}")]
    UnknownObject(ObjectId),

    #[error("unknown variable {0:?}")]
    UnknownVariable(VariableId),

    /// Container operation on an object of another kind.
    #[error("object {object} is not a {expected}")]
    NotAContainer {
        object: String,
        expected: &'static str,
    },

    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("key {0} not found")]
    KeyNotFound(Key),

    /// Stored and incoming shapes differ (e.g. restoring into a resized layer).
    #[error("shape mismatch for '{name}': expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("element count mismatch for '{name}': shape requires {expected} elements, got {got}")]
    ElementCountMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// Whether this error blocks a save (as opposed to a usage or I/O error).
    pub fn is_save_blocking(&self) -> bool {
        matches!(
            self,
            Error::StructuralMutation { .. }
                | Error::UnsupportedKey { .. }
                | Error::IncompatibleReplacement { .. }
        )
    }
}

/// Convenience Result type used throughout tendril.
pub type Result<T> = std::result::Result<T, Error>;

/// Early return with a formatted error message.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
