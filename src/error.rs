//! Error types for the tracking engine.
//!
//! Three failure classes exist, and they are handled differently:
//!
//! - Configuration mistakes (declaring a default that cannot be serialized)
//!   are programmer errors and panic at configuration time.
//! - Per-property failures during apply/persist ([`PropertyError`]) are
//!   recovered locally: the property is skipped with a warning and the
//!   remaining properties are still processed.
//! - Store failures ([`StoreError`]) surface to the caller of the apply or
//!   persist operation as [`Error::Store`].

use thiserror::Error;

/// Top-level error returned by [`Tracker`](crate::Tracker) operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The target object was never tracked (or tracking was stopped).
    #[error("target object is not tracked by this tracker")]
    NotTracked,

    /// The store failed while reading or writing the bundle for `id`.
    #[error("store operation failed for id '{id}'")]
    Store {
        id: String,
        #[source]
        source: StoreError,
    },
}

/// Failure inside a [`Store`](crate::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error")]
    Io(#[from] std::io::Error),

    #[error("bundle serialization failed")]
    Serialize(#[from] serde_json::Error),
}

/// Failure reading or writing a single tracked property.
///
/// Never escapes an apply/persist call; logged and the property is skipped.
#[derive(Debug, Error)]
pub enum PropertyError {
    /// The current value could not be serialized for storage.
    #[error("reading property '{name}' failed")]
    Read {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The stored value could not be coerced into the property's type.
    #[error("coercing stored value for property '{name}' failed")]
    Coerce {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}
