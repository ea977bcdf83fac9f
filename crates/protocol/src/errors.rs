//! Error types surfaced by the search client.
//!
//! Only connectivity faults are errors. A query that times out or is
//! cancelled yields an empty result list, and a truncated reply buffer yields
//! a shorter one; neither appears here.

use thiserror::Error;

/// Native error code meaning "access denied" (e.g. a lower-privilege sender
/// blocked by user-interface privilege isolation).
const ACCESS_DENIED: u32 = 5;

// ---------------------------------------------------------------------------
// Native failures
// ---------------------------------------------------------------------------

/// A native IPC call failed and reported an error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("native IPC call failed (error #{code})")]
pub struct NativeError {
    /// Error code reported by the operating system.
    pub code: u32,
}

impl NativeError {
    pub fn new(code: u32) -> Self {
        Self { code }
    }

    /// Returns `true` if the code is the access-denied code.
    pub fn is_access_denied(self) -> bool {
        self.code == ACCESS_DENIED
    }
}

/// Outcome of a failed query send, as reported by a transport.
///
/// `code` is `None` when the send was refused without the operating system
/// reporting any error, which is how a service without query support answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendFailure {
    pub code: Option<u32>,
}

// ---------------------------------------------------------------------------
// Client errors
// ---------------------------------------------------------------------------

/// Why a query request could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IpcError {
    /// The service rejected the query without an error code.
    #[error("IPC query to the search service is not supported")]
    Unsupported,

    /// Delivering the query failed with a native error code.
    #[error("IPC query to the search service failed (error #{code})")]
    Failed {
        /// Error code reported by the operating system.
        code: u32,
    },
}

impl From<SendFailure> for IpcError {
    fn from(failure: SendFailure) -> Self {
        match failure.code {
            None | Some(0) => IpcError::Unsupported,
            Some(code) => IpcError::Failed { code },
        }
    }
}

/// Errors returned by client operations.
///
/// None of these are retried by the client. Callers are expected to treat
/// [`ClientError::NotFound`] specially, typically by telling the user that the
/// search service is not running.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The search service's receiving endpoint could not be located.
    #[error("search service not found (is it running?)")]
    NotFound,

    /// A query could not be delivered to the service.
    #[error(transparent)]
    Ipc(#[from] IpcError),

    /// The service runs at a higher privilege level and refused the message.
    #[error("the search service refused the request (it runs with higher privileges)")]
    PermissionDenied,

    /// A synchronous status or command exchange failed.
    #[error("request to the search service failed: {0}")]
    Native(#[from] NativeError),

    /// The per-query reply endpoint could not be created.
    #[error("could not create a reply endpoint: {0}")]
    Endpoint(#[source] NativeError),
}

impl ClientError {
    /// Returns `true` if the error means the service is not running.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound)
    }
}
