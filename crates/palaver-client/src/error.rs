use thiserror::Error;

use palaver_shared::MessageId;
use palaver_store::StoreError;

/// Errors surfaced to callers of the client engine.
///
/// Permission denials and fire-and-forget persistence failures are logged
/// rather than returned; the variants here are the cases a caller must
/// actually guard against.
#[derive(Error, Debug)]
pub enum ClientError {
    /// A user identity required for the operation is missing or empty.
    #[error("user identity is missing or empty")]
    MissingUserId,

    /// The message is not present in the room's projection.
    #[error("message {0} not found in the room projection")]
    MessageNotFound(MessageId),

    /// Store boundary failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
