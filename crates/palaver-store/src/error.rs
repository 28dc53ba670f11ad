use thiserror::Error;

/// Errors produced by the store boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store refused a write (simulated or real persistence failure).
    #[error("write rejected by the store")]
    WriteRejected,

    /// An upserted document carried no string `id` field.
    #[error("document has no id field")]
    MissingDocumentId,

    /// The store connection is gone; every operation fast-exits on this.
    #[error("store connection is closed")]
    Closed,

    /// Document (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
