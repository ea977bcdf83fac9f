//! Message codes understood by the search service.
//!
//! Status requests and commands are single synchronous messages: a message
//! kind plus one integer argument. Queries travel separately as a copy-data
//! payload tagged with [`QUERY_COPYDATA_TAG`].

/// Well-known window class under which the service's receiving endpoint is
/// registered.
pub const SERVICE_WINDOW_CLASS: &str = "EVERYTHING_TASKBAR_NOTIFICATION";

/// Copy-data tag announcing a wide-character (UTF-16) query payload.
pub const QUERY_COPYDATA_TAG: u32 = 2;

/// Which native message carries a [`ServiceRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// The service's private IPC message (the first user-defined message).
    Ipc,
    /// A menu command, as if picked from the service's own user interface.
    Command,
}

/// A synchronous request or command sent to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRequest {
    MajorVersion,
    MinorVersion,
    Revision,
    BuildNumber,
    /// Brings the service's search window to the foreground.
    ShowWindow,
    /// Asks the service to rebuild its index (service 1.4+).
    RebuildDatabase,
}

impl ServiceRequest {
    /// The message the request travels in.
    pub fn kind(self) -> MessageKind {
        match self {
            ServiceRequest::ShowWindow => MessageKind::Command,
            _ => MessageKind::Ipc,
        }
    }

    /// The integer argument identifying the request.
    pub fn code(self) -> u32 {
        match self {
            ServiceRequest::MajorVersion => 0,
            ServiceRequest::MinorVersion => 1,
            ServiceRequest::Revision => 2,
            ServiceRequest::BuildNumber => 3,
            ServiceRequest::ShowWindow => 40007,
            ServiceRequest::RebuildDatabase => 405,
        }
    }

    /// Human-readable name used in log events.
    pub fn name(self) -> &'static str {
        match self {
            ServiceRequest::MajorVersion => "major_version",
            ServiceRequest::MinorVersion => "minor_version",
            ServiceRequest::Revision => "revision",
            ServiceRequest::BuildNumber => "build_number",
            ServiceRequest::ShowWindow => "show_window",
            ServiceRequest::RebuildDatabase => "rebuild_database",
        }
    }
}
