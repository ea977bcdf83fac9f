//! evq native transport adapter.
//!
//! Implements the [`protocol::Transport`] port over Win32 window messages:
//! the service is located by its window class, status and command requests
//! are synchronous `SendMessageW` calls, and each query gets a message-only
//! reply window that receives the answer as a `WM_COPYDATA` delivery.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Handle management, window-class registration, the
//! window procedure and the thread message pump all live here. The
//! [`protocol`] and `client` crates see only [`protocol::Transport`] and
//! [`protocol::ReplyEndpoint`].
//!
//! ## Platform
//!
//! [`Win32Transport`] exists only on Windows. The small encoding helpers
//! below compile everywhere so they can be tested on any host.

use protocol::{EndpointId, SendFailure};

#[cfg(windows)]
mod window;

#[cfg(windows)]
pub use window::{ReplyWindow, ServiceWindow, Win32Transport, REPLY_WINDOW_CLASS};

/// Encodes `s` as a NUL-terminated UTF-16 string for the wide-character APIs.
pub fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// The reply-endpoint id for a window handle: the handle truncated to the
/// 32 bits the query header has room for. Window handles are 32-bit
/// significant, so no information is lost.
pub fn endpoint_id_for(handle: isize) -> EndpointId {
    EndpointId::new(handle as u32)
}

/// Classifies a refused `WM_COPYDATA` send by the thread's last error code.
pub fn send_failure_from(last_error: u32) -> SendFailure {
    SendFailure {
        code: (last_error != 0).then_some(last_error),
    }
}

/// Bookkeeping for the `WM_QUIT` messages a reply window's pump retrieves.
///
/// A reply window ends its query's wait by posting a quit once its sink
/// stores the reply. The thread may also see a quit its host posted; that one
/// is not ours to consume and is posted again when the window closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuitTracker {
    reply_quit_seen: bool,
    host_exit_code: Option<i32>,
}

impl QuitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a retrieved quit carrying `exit_code`. Returns `true` if it is
    /// the signal for a stored reply, `false` if it belongs to the host.
    pub fn on_quit(&mut self, exit_code: i32, reply_stored: bool) -> bool {
        if reply_stored && !self.reply_quit_seen {
            self.reply_quit_seen = true;
            return true;
        }
        self.host_exit_code = Some(exit_code);
        false
    }

    /// Whether the window's own quit is still queued when it closes.
    pub fn own_quit_pending(&self, reply_stored: bool) -> bool {
        reply_stored && !self.reply_quit_seen
    }

    /// Exit code of the last host quit retrieved, to be posted again.
    pub fn host_exit_code(&self) -> Option<i32> {
        self.host_exit_code
    }
}

#[cfg(test)]
mod tests {
    use protocol::IpcError;

    use super::*;

    #[test]
    fn wide_strings_are_nul_terminated() {
        assert_eq!(to_wide("ab"), vec![0x61, 0x62, 0]);
        assert_eq!(to_wide(""), vec![0]);
    }

    #[test]
    fn endpoint_ids_keep_the_low_word() {
        assert_eq!(endpoint_id_for(0x0004_02A6), EndpointId::new(0x0004_02A6));
        assert_eq!(endpoint_id_for(-3), EndpointId::new(0xFFFF_FFFD));
    }

    #[test]
    fn host_quit_before_the_reply_is_kept_for_the_host() {
        let mut quits = QuitTracker::new();
        assert!(!quits.on_quit(3, false));
        assert_eq!(quits.host_exit_code(), Some(3));

        assert!(quits.on_quit(0, true));
        assert!(!quits.own_quit_pending(true));
        assert_eq!(quits.host_exit_code(), Some(3));
    }

    #[test]
    fn only_one_quit_signals_the_reply() {
        let mut quits = QuitTracker::new();
        assert!(quits.on_quit(0, true));
        assert!(!quits.on_quit(7, true));
        assert_eq!(quits.host_exit_code(), Some(7));
    }

    #[test]
    fn unconsumed_reply_quit_is_removed_on_close() {
        let quits = QuitTracker::new();
        assert!(quits.own_quit_pending(true));
        assert!(!quits.own_quit_pending(false));
        assert_eq!(quits.host_exit_code(), None);
    }

    #[test]
    fn refused_sends_map_to_ipc_sub_reasons() {
        assert_eq!(IpcError::from(send_failure_from(0)), IpcError::Unsupported);
        assert_eq!(
            IpcError::from(send_failure_from(1400)),
            IpcError::Failed { code: 1400 }
        );
    }
}
