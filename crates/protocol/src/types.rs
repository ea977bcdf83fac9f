//! Shared value types for the search protocol.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaning the client and the decoder compute with: flag sets that map onto
//! wire bits, the service version, and the caller-facing query options.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// `max-results` value asking the service for every match.
pub const ALL_RESULTS: u32 = 0xFFFF_FFFF;

// ---------------------------------------------------------------------------
// Flag sets
// ---------------------------------------------------------------------------

bitflags! {
    /// Match options carried in the `search-flags` word of the query header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SearchFlags: u32 {
        /// Case-sensitive matching.
        const MATCH_CASE = 0x0000_0001;
        /// Match whole words only.
        const MATCH_WHOLE_WORD = 0x0000_0002;
        /// Match against the full path rather than the file name.
        const MATCH_PATH = 0x0000_0004;
        /// Interpret the search string as a regular expression.
        const REGEX = 0x0000_0008;
        /// Diacritic marks are significant.
        const MATCH_DIACRITICS = 0x0000_0010;
    }
}

bitflags! {
    /// Per-item flags carried in each result item record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ItemFlags: u32 {
        /// The item is a folder; it is a file when unset.
        const FOLDER = 0x0000_0001;
        /// The item is a drive root. Drive items carry no path string.
        const DRIVE = 0x0000_0002;
    }
}

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Version of the running search service, as reported by its four status
/// requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Revision number.
    pub revision: u32,
    /// Build number.
    pub build: u32,
}

impl ServiceVersion {
    /// Creates a new [`ServiceVersion`].
    pub fn new(major: u32, minor: u32, revision: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            revision,
            build,
        }
    }

    /// Returns the version as a `(major, minor, revision, build)` tuple.
    pub fn as_tuple(self) -> (u32, u32, u32, u32) {
        (self.major, self.minor, self.revision, self.build)
    }

    /// Returns `true` if the service is recent enough (1.4+) to honour the
    /// database rebuild command.
    ///
    /// Older services silently ignore the command; the client does not
    /// enforce this.
    pub fn supports_rebuild_db(self) -> bool {
        (self.major, self.minor) >= (1, 4)
    }
}

impl std::fmt::Display for ServiceVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.revision, self.build
        )
    }
}

// ---------------------------------------------------------------------------
// Query options
// ---------------------------------------------------------------------------

/// Caller-facing options for one query.
///
/// Defaults ask for every result from the first one, with no match flags set.
///
/// ```
/// use protocol::{QueryOptions, SearchFlags};
///
/// let options = QueryOptions::new().max_results(100).regex(true);
/// assert_eq!(options.flags(), SearchFlags::REGEX);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    result_offset: u32,
    max_results: u32,
    flags: SearchFlags,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            result_offset: 0,
            max_results: ALL_RESULTS,
            flags: SearchFlags::empty(),
        }
    }
}

impl QueryOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the first result the service should return.
    #[must_use]
    pub fn result_offset(mut self, offset: u32) -> Self {
        self.result_offset = offset;
        self
    }

    /// Maximum number of results; [`ALL_RESULTS`] for no cap.
    #[must_use]
    pub fn max_results(mut self, max: u32) -> Self {
        self.max_results = max;
        self
    }

    #[must_use]
    pub fn regex(self, on: bool) -> Self {
        self.with_flag(SearchFlags::REGEX, on)
    }

    #[must_use]
    pub fn match_path(self, on: bool) -> Self {
        self.with_flag(SearchFlags::MATCH_PATH, on)
    }

    #[must_use]
    pub fn match_case(self, on: bool) -> Self {
        self.with_flag(SearchFlags::MATCH_CASE, on)
    }

    #[must_use]
    pub fn match_whole_word(self, on: bool) -> Self {
        self.with_flag(SearchFlags::MATCH_WHOLE_WORD, on)
    }

    /// Makes diacritic marks significant when matching.
    #[must_use]
    pub fn match_accents(self, on: bool) -> Self {
        self.with_flag(SearchFlags::MATCH_DIACRITICS, on)
    }

    fn with_flag(mut self, flag: SearchFlags, on: bool) -> Self {
        self.flags.set(flag, on);
        self
    }

    pub fn offset(&self) -> u32 {
        self.result_offset
    }

    pub fn limit(&self) -> u32 {
        self.max_results
    }

    pub fn flags(&self) -> SearchFlags {
        self.flags
    }
}
