//! Newtype protocol identifiers.
//!
//! Both identifiers travel over the wire as 32-bit words, so both wrap a `u32`.
//! Keeping them distinct prevents accidentally writing a query id into the
//! reply-endpoint slot of a [`crate::QueryHeader`] (or vice versa) even though
//! the two fields sit next to each other.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Macro for u32-wrapped newtypes (values that travel as a DWORD on the wire).
// Generates: struct (Copy), new(), as_u32(), Display.
// ---------------------------------------------------------------------------
macro_rules! u32_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates a new identifier from a raw integer.
            pub fn new(value: u32) -> Self {
                Self(value)
            }

            /// Returns the underlying integer value.
            pub fn as_u32(self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

u32_id! {
    /// Correlates one outgoing query with its asynchronous reply.
    ///
    /// Written into the `reply-message-id` field of the query header; the
    /// service echoes it back as the tag of the reply delivery. Allocated by
    /// the client, unique and increasing for the client's lifetime.
    QueryId
}

impl QueryId {
    /// Returns `true` if a delivery tag carried by a native notification
    /// designates this query.
    ///
    /// Tags are pointer-sized on the native side, so a tag wider than 32 bits
    /// never matches.
    pub fn matches_tag(self, tag: u64) -> bool {
        tag == u64::from(self.0)
    }
}

u32_id! {
    /// Identifies the native reply endpoint a query's answer is addressed to.
    ///
    /// On Win32 this is the reply window handle truncated to 32 bits, which is
    /// what the service expects in the `reply-endpoint-id` header field.
    EndpointId
}
