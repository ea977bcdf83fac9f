//! evq query client.
//!
//! This crate provides [`Client`], which drives the [`protocol::Transport`]
//! port through the life of every request: locating the service, allocating
//! a query id, opening the per-query reply endpoint, sending, waiting for the
//! correlated reply while honouring cancellation and the hard timeout, and
//! decoding the result.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The client sequences calls between the protocol
//! rules in the [`protocol`] crate and whichever transport it is given. It
//! contains no native code; the `win32` crate supplies the real transport and
//! [`testing::FakeService`] an in-memory one.
//!
//! ## Concurrency
//!
//! A query blocks its calling thread and services that thread's own message
//! queue; no threads are spawned. The id allocator and the pending-reply map
//! are owned by the [`Client`] and safe to share, so one client may serve
//! queries from several threads at once, each with its own reply endpoint.

pub mod cancel;
pub mod client;
pub mod clock;
pub mod config;
pub mod ids;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cancel::{CancelFlag, ShouldTerminate};
pub use client::{Client, WaitOutcome};
pub use clock::{Clock, SystemClock};
pub use config::{ClientConfig, ConfigError};
pub use ids::QueryIdAllocator;
