//! Core protocol domain for evq.
//!
//! This crate contains every byte-level structure exchanged with the desktop
//! search service, the decoder for the service's result buffers, the message
//! codes the service understands, and the port traits that a native IPC
//! transport must implement. The `client` crate drives these ports; the
//! `win32` crate supplies them.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* goes over the wire and *what* a transport must provide;
//! infrastructure crates define *how* the bytes actually move.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`QueryId`, `EndpointId`) |
//! | [`types`] | Value types (`SearchFlags`, `ItemFlags`, `ServiceVersion`, `QueryOptions`) |
//! | [`errors`] | Client-facing error taxonomy |
//! | [`wire`] | Fixed, unpadded wire structures and the bounds-checked reader |
//! | [`decoder`] | Lazy result list decoder |
//! | [`messages`] | Status and command message codes |
//! | [`transport`] | Port traits and the reply sink shared with native endpoints |

pub mod decoder;
pub mod errors;
pub mod identifiers;
pub mod messages;
pub mod transport;
pub mod types;
pub mod wire;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use decoder::{Entries, ResultEntry, ResultList, PATH_SEPARATOR};
pub use errors::{ClientError, IpcError, NativeError, SendFailure};
pub use identifiers::{EndpointId, QueryId};
pub use messages::{MessageKind, ServiceRequest, QUERY_COPYDATA_TAG, SERVICE_WINDOW_CLASS};
pub use transport::{PendingReplies, PumpStatus, ReplyEndpoint, ReplySink, Transport, WaitStatus};
pub use types::{ItemFlags, QueryOptions, SearchFlags, ServiceVersion, ALL_RESULTS};
pub use wire::{QueryHeader, QueryRequest, ResultItem, ResultListHeader};
