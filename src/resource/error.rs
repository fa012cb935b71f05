//! Error types for resource handle operations.

use thiserror::Error;

use super::Handle;

/// Errors that can occur while managing resource handles.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Unknown handle {handle}")]
    UnknownHandle { handle: Handle },

    #[error("Resource {handle} is in use: {borrows} outstanding borrow(s)")]
    ResourceInUse { handle: Handle, borrows: u32 },

    #[error("Handle {handle} does not reference a host-owned representation")]
    NotHostOwned { handle: Handle },

    #[error("Stale borrow token for handle {handle}")]
    StaleBorrow { handle: Handle },
}
